//! Deterministic, zero-dependency binary encoding for the plain table format.
//!
//! This module provides the [`Encode`] and [`Decode`] traits together with
//! the varint and length-prefix primitives used by every region of a
//! table file. The builder and the reader share these helpers, so the
//! on-disk representation is defined in exactly one place.
//!
//! # Wire format
//!
//! | Field                         | Encoding                                   |
//! |-------------------------------|--------------------------------------------|
//! | `u8`                          | 1 byte                                     |
//! | `u64` (offsets, footer)       | 8 bytes, little-endian                     |
//! | varint32 (lengths, counts)    | LEB128, 1–5 bytes                          |
//! | varint64                      | LEB128, 1–10 bytes                         |
//! | length-prefixed bytes         | `[varint32 len][bytes]`                    |
//!
//! Fixed-width integers are used wherever the reader needs O(1) random
//! access (entry offsets inside the index, every footer field). Varints
//! are used for lengths and counts to keep the data region compact.
//!
//! # Zero-panic guarantee
//!
//! No function in this module uses `unwrap()`, `expect()`, or any other
//! panicking path. All errors are propagated via [`EncodingError`].
//!
//! # Convenience helpers
//!
//! ```rust,ignore
//! use plaintable::encoding::{encode_to_vec, decode_from_slice};
//!
//! let bytes = encode_to_vec(&footer)?;
//! let (decoded, consumed) = decode_from_slice::<TableFooter>(&bytes)?;
//! ```


use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Limits
// ------------------------------------------------------------------------------------------------

/// Maximum number of bytes a varint32 may occupy.
pub const MAX_VARINT32_LEN: usize = 5;

/// Maximum number of bytes a varint64 may occupy.
pub const MAX_VARINT64_LEN: usize = 10;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced during encoding or decoding.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The buffer ran out of bytes before decoding completed.
    #[error("unexpected end of buffer (need {needed} bytes, have {available})")]
    UnexpectedEof {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },

    /// A varint ran past its maximum width or past the target integer size.
    #[error("malformed varint: {0}")]
    MalformedVarint(&'static str),

    /// A length or count does not fit the wire format.
    #[error("length overflow: {0}")]
    LengthOverflow(String),

    /// Application-level decode error.
    #[error("{0}")]
    Custom(String),
}

// ------------------------------------------------------------------------------------------------
// Core traits
// ------------------------------------------------------------------------------------------------

/// Serialize `self` into a byte buffer.
///
/// Implementations **must** produce deterministic output: the same
/// logical value always yields the exact same byte sequence.
pub trait Encode {
    /// Append the encoded representation of `self` to `buf`.
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError>;
}

/// Deserialize a value from a byte slice.
///
/// Returns `(value, bytes_consumed)` on success so that callers can
/// advance a cursor through a buffer containing multiple encoded items.
pub trait Decode: Sized {
    /// Decode one value starting at `buf[0]`.
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError>;
}

// ------------------------------------------------------------------------------------------------
// Convenience functions
// ------------------------------------------------------------------------------------------------

/// Encode a value into a freshly-allocated `Vec<u8>`.
pub fn encode_to_vec<T: Encode>(value: &T) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    value.encode_to(&mut buf)?;
    Ok(buf)
}

/// Decode a value from the beginning of `buf`.
///
/// Returns `(value, bytes_consumed)`.
pub fn decode_from_slice<T: Decode>(buf: &[u8]) -> Result<(T, usize), EncodingError> {
    T::decode_from(buf)
}

// ------------------------------------------------------------------------------------------------
// Internal helpers
// ------------------------------------------------------------------------------------------------

/// Verify that `buf` has at least `needed` bytes, returning
/// [`EncodingError::UnexpectedEof`] if not.
#[inline]
pub(crate) fn require(buf: &[u8], needed: usize) -> Result<(), EncodingError> {
    if buf.len() < needed {
        Err(EncodingError::UnexpectedEof {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

/// Convert a `usize` length to `u32`, returning [`EncodingError::LengthOverflow`]
/// if the value exceeds `u32::MAX`.
#[inline]
pub(crate) fn len_to_u32(len: usize) -> Result<u32, EncodingError> {
    u32::try_from(len)
        .map_err(|_| EncodingError::LengthOverflow(format!("length {len} exceeds u32::MAX")))
}

// ------------------------------------------------------------------------------------------------
// Fixed-width integers
// ------------------------------------------------------------------------------------------------

impl Encode for u8 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.push(*self);
        Ok(())
    }
}

impl Decode for u8 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        require(buf, 1)?;
        Ok((buf[0], 1))
    }
}

impl Encode for u64 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.extend_from_slice(&self.to_le_bytes());
        Ok(())
    }
}

impl Decode for u64 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        Ok((read_u64_le(buf)?, 8))
    }
}

/// Read a little-endian `u64` from the first eight bytes of `buf`.
#[inline]
pub fn read_u64_le(buf: &[u8]) -> Result<u64, EncodingError> {
    require(buf, 8)?;
    let bytes: [u8; 8] = match buf[..8].try_into() {
        Ok(b) => b,
        Err(_) => {
            return Err(EncodingError::Custom(
                "internal: slice-to-array conversion failed for u64".into(),
            ));
        }
    };
    Ok(u64::from_le_bytes(bytes))
}

// ------------------------------------------------------------------------------------------------
// Varints (LEB128)
// ------------------------------------------------------------------------------------------------

/// Append `value` to `buf` as a varint.
#[inline]
pub fn put_varint64(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Append `value` to `buf` as a varint.
#[inline]
pub fn put_varint32(buf: &mut Vec<u8>, value: u32) {
    put_varint64(buf, u64::from(value));
}

/// Decode a varint64 from the start of `buf`.
///
/// Returns `(value, bytes_consumed)`.
pub fn get_varint64(buf: &[u8]) -> Result<(u64, usize), EncodingError> {
    let mut result: u64 = 0;
    for (i, &byte) in buf.iter().take(MAX_VARINT64_LEN).enumerate() {
        let shift = 7 * i as u32;
        let bits = u64::from(byte & 0x7F);
        // The tenth byte may only carry the single remaining high bit.
        if i == MAX_VARINT64_LEN - 1 && bits > 1 {
            return Err(EncodingError::MalformedVarint("varint64 overflows u64"));
        }
        result |= bits << shift;
        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }
    if buf.len() >= MAX_VARINT64_LEN {
        Err(EncodingError::MalformedVarint("varint64 longer than 10 bytes"))
    } else {
        Err(EncodingError::UnexpectedEof {
            needed: buf.len() + 1,
            available: buf.len(),
        })
    }
}

/// Decode a varint32 from the start of `buf`.
///
/// Returns `(value, bytes_consumed)`. Values wider than 32 bits and
/// encodings longer than five bytes are rejected.
pub fn get_varint32(buf: &[u8]) -> Result<(u32, usize), EncodingError> {
    let window = &buf[..buf.len().min(MAX_VARINT32_LEN)];
    match get_varint64(window) {
        Ok((value, n)) => {
            let value = u32::try_from(value)
                .map_err(|_| EncodingError::MalformedVarint("varint32 overflows u32"))?;
            Ok((value, n))
        }
        Err(EncodingError::UnexpectedEof { .. }) if buf.len() >= MAX_VARINT32_LEN => Err(
            EncodingError::MalformedVarint("varint32 longer than 5 bytes"),
        ),
        Err(e) => Err(e),
    }
}

// ------------------------------------------------------------------------------------------------
// Length-prefixed byte strings: [varint32 len][bytes]
// ------------------------------------------------------------------------------------------------

/// Append `data` to `buf` as `[varint32 len][bytes]`.
#[inline]
pub fn put_length_prefixed(buf: &mut Vec<u8>, data: &[u8]) -> Result<(), EncodingError> {
    put_varint32(buf, len_to_u32(data.len())?);
    buf.extend_from_slice(data);
    Ok(())
}

/// Borrow a `[varint32 len][bytes]` string from the start of `buf`.
///
/// Returns `(bytes, total_consumed)`; `bytes` borrows from `buf`.
#[inline]
pub fn get_length_prefixed(buf: &[u8]) -> Result<(&[u8], usize), EncodingError> {
    let (len, n) = get_varint32(buf)?;
    let len = len as usize;
    require(&buf[n..], len)?;
    Ok((&buf[n..n + len], n + len))
}
