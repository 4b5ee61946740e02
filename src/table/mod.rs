//! Plain Table Module
//!
//! This module implements an **immutable**, **memory-mapped** sorted key-value
//! table optimized for direct random access. Instead of block-structured
//! data with a binary-searched block index, entries are laid out back to back
//! and located through a **hash index over key prefixes**, with an optional
//! **bloom filter** to short-circuit negative lookups.
//!
//! # On-disk layout
//!
//! ```text
//! [HEADER]        version: u8, user_key_length: varint32
//! [DATA REGION]   ([key_len: varint32] if variable) key, value_len: varint32, value
//!                 ... one entry per key, ascending key order ...
//! [INDEX REGION]  bucket_count: varint32,
//!                 bucket_count × (chain_length: varint32, chain_length × offset: u64 LE)
//! [FILTER REGION] bits_per_key: varint32, bloom bytes          (only if enabled)
//! [FOOTER 40B]    index_offset: u64, index_size: u64,
//!                 filter_offset: u64, filter_size: u64, magic: u64   (all LE)
//! ```
//!
//! - **Header** — [`TableHeader`]; `user_key_length == 0` means variable-length keys.
//! - **Data region** — entries addressed by their absolute file offset.
//! - **Index region** — [`HashIndex`](crate::index::HashIndex) buckets of entry offsets.
//! - **Filter region** — [`PrefixFilter`](crate::filter::PrefixFilter) over full keys.
//! - **Footer** — [`TableFooter`]; always the last [`FOOTER_SIZE`] bytes.
//!
//! The regions tile the file exactly: the data region ends where the index
//! region begins, the filter region (if any) immediately follows the index,
//! and the footer follows the last of them.
//!
//! # Sub-modules
//!
//! - [`builder`] — [`PlainTableBuilder`] writes tables from a sorted stream.
//! - [`reader`] — [`PlainTableReader`] opens tables and serves point lookups.
//! - [`iterator`] — [`TableIterator`] and [`Entry`] for ordered scans.
//!
//! # Concurrency model
//!
//! - A builder is owned by exactly one writer thread.
//! - A finished table is immutable; a reader holds no interior mutability,
//!   so one reader can be shared across threads and queried concurrently.

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod builder;
pub mod iterator;
pub mod reader;

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Re-exports
// ------------------------------------------------------------------------------------------------

pub use builder::PlainTableBuilder;
pub use iterator::{Entry, TableIterator};
pub use reader::PlainTableReader;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::io;

use thiserror::Error;

use crate::encoding::{self, Decode, Encode, EncodingError};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Current on-disk format version, stored in the header.
pub const TABLE_FORMAT_VERSION: u8 = 1;

/// Magic number closing every table file.
pub const TABLE_MAGIC: u64 = u64::from_le_bytes(*b"PLAINTBL");

/// Size of the fixed footer in bytes.
pub const FOOTER_SIZE: usize = 40;

/// `user_key_len` value selecting variable-length keys.
pub const VARIABLE_LENGTH: u32 = 0;

/// Smallest possible table: a two-byte header, a two-byte index and the footer.
pub(crate) const MIN_TABLE_SIZE: usize = 4 + FOOTER_SIZE;

/// Chains at least this long are binary searched instead of scanned.
pub(crate) const BINARY_SEARCH_MIN_CHAIN: usize = 16;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by table operations (build, open, lookup, iteration).
///
/// A missing key is not an error: lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum TableError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed bytes encountered while decoding an entry, the index or the filter.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// A key was added that does not sort strictly after the previous one.
    #[error("key {key:?} added out of order after {previous:?}")]
    OutOfOrder {
        /// The previously added key.
        previous: Vec<u8>,
        /// The rejected key.
        key: Vec<u8>,
    },

    /// `add` or `finish` was called on a finished builder.
    #[error("table builder already finished")]
    AlreadyFinished,

    /// The builder hit a fatal error earlier; its output must be discarded.
    #[error("table builder aborted by an earlier error")]
    Aborted,

    /// Footer, magic, version or region layout is invalid.
    #[error("invalid table format: {0}")]
    InvalidFormat(String),

    /// A key's length differs from the table's fixed key length.
    #[error("invalid key length {actual}, table requires {expected}")]
    InvalidKeyLength {
        /// Fixed key length of the table.
        expected: u32,
        /// Length of the offending key.
        actual: usize,
    },

    /// Invalid configuration parameter.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<EncodingError> for TableError {
    fn from(e: EncodingError) -> Self {
        TableError::CorruptData(e.to_string())
    }
}

// ------------------------------------------------------------------------------------------------
// On-disk format structures
// ------------------------------------------------------------------------------------------------

/// Table header, written first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableHeader {
    /// Format version ([`TABLE_FORMAT_VERSION`]).
    pub version: u8,

    /// Fixed key length, or [`VARIABLE_LENGTH`].
    pub user_key_len: u32,
}

/// Position and size of a region in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionHandle {
    /// Absolute byte offset of the region.
    pub offset: u64,

    /// Size of the region in bytes.
    pub size: u64,
}

impl RegionHandle {
    /// Offset one past the region's last byte, if it does not overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }
}

/// Table footer, stored in the last [`FOOTER_SIZE`] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableFooter {
    /// Handle of the hash index region.
    pub index: RegionHandle,

    /// Handle of the filter region; all zero when the table has no filter.
    pub filter: RegionHandle,

    /// Must equal [`TABLE_MAGIC`].
    pub magic: u64,
}

// ------------------------------------------------------------------------------------------------
// Encoding implementations
// ------------------------------------------------------------------------------------------------

impl Encode for TableHeader {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.version.encode_to(buf)?;
        encoding::put_varint32(buf, self.user_key_len);
        Ok(())
    }
}

impl Decode for TableHeader {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (version, n) = u8::decode_from(&buf[off..])?;
        off += n;
        let (user_key_len, n) = encoding::get_varint32(&buf[off..])?;
        off += n;
        Ok((
            Self {
                version,
                user_key_len,
            },
            off,
        ))
    }
}

impl Encode for RegionHandle {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.offset.encode_to(buf)?;
        self.size.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for RegionHandle {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (offset, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (size, n) = u64::decode_from(&buf[off..])?;
        off += n;
        Ok((Self { offset, size }, off))
    }
}

impl Encode for TableFooter {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.index.encode_to(buf)?;
        self.filter.encode_to(buf)?;
        self.magic.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for TableFooter {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (index, n) = RegionHandle::decode_from(&buf[off..])?;
        off += n;
        let (filter, n) = RegionHandle::decode_from(&buf[off..])?;
        off += n;
        let (magic, n) = u64::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                index,
                filter,
                magic,
            },
            off,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// Entry codec
// ------------------------------------------------------------------------------------------------

/// How keys are laid out in the data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// Every key carries a varint32 length prefix.
    Variable,

    /// Every key is exactly this many bytes, stored without a prefix.
    Fixed(u32),
}

impl KeyFormat {
    /// Maps a header's `user_key_len` to a key format.
    pub fn from_user_key_len(user_key_len: u32) -> Self {
        if user_key_len == VARIABLE_LENGTH {
            KeyFormat::Variable
        } else {
            KeyFormat::Fixed(user_key_len)
        }
    }

    /// The header value for this format.
    pub fn user_key_len(self) -> u32 {
        match self {
            KeyFormat::Variable => VARIABLE_LENGTH,
            KeyFormat::Fixed(len) => len,
        }
    }

    /// Rejects keys whose length does not match a fixed key length.
    pub fn check_key(self, key: &[u8]) -> Result<(), TableError> {
        match self {
            KeyFormat::Fixed(len) if key.len() != len as usize => {
                Err(TableError::InvalidKeyLength {
                    expected: len,
                    actual: key.len(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Appends one data-region entry for `key` and `value` to `buf`.
    ///
    /// The caller must have validated `key` with [`KeyFormat::check_key`].
    pub fn encode_entry(
        self,
        buf: &mut Vec<u8>,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), EncodingError> {
        match self {
            KeyFormat::Variable => encoding::put_length_prefixed(buf, key)?,
            KeyFormat::Fixed(_) => buf.extend_from_slice(key),
        }
        encoding::put_length_prefixed(buf, value)
    }

    /// Decodes the entry at the start of `buf`.
    ///
    /// Returns `(key, value, bytes_consumed)`; `key` and `value` borrow from `buf`.
    pub fn decode_entry(self, buf: &[u8]) -> Result<(&[u8], &[u8], usize), EncodingError> {
        let (key, key_end) = match self {
            KeyFormat::Variable => encoding::get_length_prefixed(buf)?,
            KeyFormat::Fixed(len) => {
                let len = len as usize;
                encoding::require(buf, len)?;
                (&buf[..len], len)
            }
        };
        let (value, n) = encoding::get_length_prefixed(&buf[key_end..])?;
        Ok((key, value, key_end + n))
    }
}

// ------------------------------------------------------------------------------------------------
// Table properties
// ------------------------------------------------------------------------------------------------

/// Summary of a finished table, returned by the builder and the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableProperties {
    /// On-disk format version.
    pub format_version: u8,

    /// Fixed key length, or [`VARIABLE_LENGTH`].
    pub user_key_len: u32,

    /// Number of entries in the data region.
    pub num_entries: u64,

    /// Number of hash index buckets.
    pub bucket_count: u64,

    /// Size of the data region in bytes.
    pub data_size: u64,

    /// Size of the index region in bytes.
    pub index_size: u64,

    /// Size of the filter region in bytes (0 without a filter).
    pub filter_size: u64,

    /// Filter budget (0 without a filter).
    pub bloom_bits_per_key: u32,

    /// Total file size including the footer.
    pub file_size: u64,
}

// ------------------------------------------------------------------------------------------------
// Capability traits
// ------------------------------------------------------------------------------------------------

/// Write side of a table format, as seen by a storage engine's flush path.
pub trait TableBuilder {
    /// Appends one entry; keys must arrive in strictly ascending order.
    fn add(&mut self, key: &[u8], value: &[u8]) -> Result<(), TableError>;

    /// Writes all trailing metadata and seals the table.
    fn finish(&mut self) -> Result<TableProperties, TableError>;

    /// Stops building without sealing the table; the output must be discarded.
    fn abandon(&mut self);

    /// Entries added so far.
    fn num_entries(&self) -> u64;

    /// Bytes written so far.
    fn file_size(&self) -> u64;
}

/// Read side of a table format, as seen by a storage engine's lookup path.
pub trait TableReader: Send + Sync {
    /// Point lookup; `Ok(None)` when the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<&[u8]>, TableError>;

    /// Ordered scan over every entry.
    fn new_iterator(&self) -> Box<dyn Iterator<Item = Result<Entry<'_>, TableError>> + '_>;

    /// Table-level metadata.
    fn properties(&self) -> TableProperties;
}
