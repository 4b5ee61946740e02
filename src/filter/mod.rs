//! Optional per-key bloom filter stored in the table's filter region.
//!
//! The filter is built once, during
//! [`PlainTableBuilder::finish`](crate::PlainTableBuilder::finish), over every
//! full key that was added to the table. Readers consult it before touching
//! the hash index: a negative answer is definitive, a positive answer only
//! means the key *may* be present.
//!
//! # Region layout
//!
//! ```text
//! [bits_per_key: varint32][bloom bytes ...]
//! ```
//!
//! The bloom bytes are the self-describing serialization produced by the
//! [`bloomfilter`] crate (bitmap, hash count and hashing keys). The region
//! extends to the end of the byte range recorded in the footer.


use std::fmt;

use bloomfilter::Bloom;
use tracing::{debug, warn};

use crate::encoding::{self, Encode, EncodingError};
use crate::table::TableError;

/// Upper bound for the configured bits-per-key budget.
pub const MAX_BITS_PER_KEY: u32 = 64;

// ------------------------------------------------------------------------------------------------
// FilterBuilder
// ------------------------------------------------------------------------------------------------

/// Accumulates keys while a table is being built.
///
/// The bloom bitmap is sized from the final key count, so keys are buffered
/// until [`FilterBuilder::finish`].
pub struct FilterBuilder {
    bits_per_key: u32,
    keys: Vec<Vec<u8>>,
}

impl FilterBuilder {
    /// Creates a builder with the given space budget. `bits_per_key` must
    /// be non-zero; a zero budget means "no filter" and is handled by the
    /// table builder.
    pub fn new(bits_per_key: u32) -> Self {
        Self {
            bits_per_key,
            keys: Vec::new(),
        }
    }

    /// Records a full key for insertion into the filter.
    pub fn add_key(&mut self, key: &[u8]) {
        self.keys.push(key.to_vec());
    }

    /// Number of keys recorded so far.
    pub fn num_keys(&self) -> usize {
        self.keys.len()
    }

    /// Sizes the bitmap and inserts every recorded key.
    pub fn finish(self) -> Result<PrefixFilter, TableError> {
        let num_keys = self.keys.len();
        let bitmap_bytes = bitmap_size_bytes(num_keys, self.bits_per_key);
        let mut bloom: Bloom<[u8]> = Bloom::new(bitmap_bytes, num_keys.max(1))
            .map_err(|e| TableError::Internal(format!("bloom filter: {e}")))?;

        for key in &self.keys {
            bloom.set(key.as_slice());
        }

        debug!(
            num_keys,
            bits_per_key = self.bits_per_key,
            bitmap_bytes,
            hash_functions = bloom.number_of_hash_functions(),
            "built key filter"
        );

        Ok(PrefixFilter {
            bits_per_key: self.bits_per_key,
            bloom,
        })
    }
}

/// Bytes of bitmap for `num_keys` keys at `bits_per_key`, at least one.
fn bitmap_size_bytes(num_keys: usize, bits_per_key: u32) -> usize {
    let bits = num_keys.saturating_mul(bits_per_key as usize);
    bits.div_ceil(8).max(1)
}

// ------------------------------------------------------------------------------------------------
// PrefixFilter
// ------------------------------------------------------------------------------------------------

/// Immutable membership filter over a table's keys.
///
/// Read-only after construction, so it is safe to query from many threads.
pub struct PrefixFilter {
    bits_per_key: u32,
    bloom: Bloom<[u8]>,
}

impl PrefixFilter {
    /// Returns `false` only if `key` is definitely not in the table.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.bloom.check(key)
    }

    /// The bits-per-key budget this filter was built with.
    pub fn bits_per_key(&self) -> u32 {
        self.bits_per_key
    }

    /// Size of the bitmap in bits.
    pub fn num_bits(&self) -> u64 {
        self.bloom.len()
    }

    /// Parses a filter region.
    ///
    /// # Errors
    ///
    /// [`TableError::CorruptData`] if the budget is zero or the bloom bytes
    /// cannot be parsed.
    pub fn decode(region: &[u8]) -> Result<Self, TableError> {
        let (bits_per_key, n) = encoding::get_varint32(region)?;
        if bits_per_key == 0 || bits_per_key > MAX_BITS_PER_KEY {
            return Err(TableError::CorruptData(format!(
                "filter bits_per_key {bits_per_key} out of range"
            )));
        }

        let bloom = Bloom::from_slice(&region[n..]).map_err(|e| {
            warn!(error = e, "filter region rejected");
            TableError::CorruptData(format!("filter bitmap: {e}"))
        })?;

        Ok(Self {
            bits_per_key,
            bloom,
        })
    }
}

impl Encode for PrefixFilter {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encoding::put_varint32(buf, self.bits_per_key);
        buf.extend_from_slice(self.bloom.as_slice());
        Ok(())
    }
}

impl fmt::Debug for PrefixFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefixFilter")
            .field("bits_per_key", &self.bits_per_key)
            .field("num_bits", &self.bloom.len())
            .finish_non_exhaustive()
    }
}
