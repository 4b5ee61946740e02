//! # plaintable
//!
//! An immutable, memory-mapped sorted key-value table format built for
//! **low-latency point lookups**. Entries are stored back to back in key
//! order and located through a **hash index over key prefixes**; an
//! optional **bloom filter** answers most negative lookups without touching
//! the data at all.
//!
//! A table is written once by a [`PlainTableBuilder`] and then served by
//! any number of threads through a shared [`PlainTableReader`].
//!
//! ## Quick Start
//!
//! ```rust
//! use plaintable::{PlainTableBuilder, PlainTableOptions, PlainTableReader};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("fruit.plain");
//! let options = PlainTableOptions {
//!     bloom_bits_per_key: 10,
//!     ..PlainTableOptions::default()
//! };
//!
//! // Build
//! let mut builder = PlainTableBuilder::create(&path, options.clone()).unwrap();
//! builder.add(b"apple", b"1").unwrap();
//! builder.add(b"banana", b"2").unwrap();
//! builder.add(b"cherry", b"3").unwrap();
//! builder.finish().unwrap();
//!
//! // Point lookups
//! let reader = PlainTableReader::open(&path, options).unwrap();
//! assert_eq!(reader.get(b"banana").unwrap(), Some(&b"2"[..]));
//! assert_eq!(reader.get(b"avocado").unwrap(), None);
//!
//! // Ordered scan
//! let keys: Vec<_> = reader.iter().map(|e| e.unwrap().key.to_vec()).collect();
//! assert_eq!(keys, vec![b"apple".to_vec(), b"banana".to_vec(), b"cherry".to_vec()]);
//! ```
//!
//! ## Features
//!
//! - **Zero-copy reads** — values are returned as slices of the mapped file.
//! - **Fixed or variable key length** — fixed-length tables drop the key length prefix.
//! - **Pluggable prefix extraction** — index whole keys or a fixed-length prefix.
//! - **Bloom filter** — optional, sized in bits per key.
//! - **Strict open-time validation** — a reader never exists for a malformed file.

pub mod encoding;
pub mod file;
pub mod filter;
pub mod index;
pub mod prefix;
pub mod table;

use std::sync::Arc;

pub use file::{RandomAccessFile, WritableFile};
pub use prefix::{FixedPrefix, FullKeyPrefix, PrefixExtractor};
pub use table::{
    Entry, FOOTER_SIZE, KeyFormat, PlainTableBuilder, PlainTableReader, TABLE_FORMAT_VERSION,
    TABLE_MAGIC, TableBuilder, TableError, TableIterator, TableProperties, TableReader,
    VARIABLE_LENGTH,
};

use filter::MAX_BITS_PER_KEY;
use index::MIN_HASH_TABLE_RATIO;

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration shared by [`PlainTableBuilder`] and [`PlainTableReader`].
///
/// All fields have defaults via [`PlainTableOptions::default()`]. Options are
/// validated when a builder is created. A reader takes the key length from
/// the table header, but the prefix extractor must be the one the table was
/// built with.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use plaintable::{FixedPrefix, PlainTableOptions};
///
/// // Variable-length keys, no filter, 0.75 prefixes per bucket
/// let options = PlainTableOptions::default();
///
/// // Or customize
/// let options = PlainTableOptions {
///     user_key_len: 16,
///     bloom_bits_per_key: 10,
///     prefix_extractor: Arc::new(FixedPrefix::new(4)),
///     ..PlainTableOptions::default()
/// };
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct PlainTableOptions {
    /// Fixed key length in bytes, or [`VARIABLE_LENGTH`] (0) for
    /// variable-length keys.
    ///
    /// Default: 0.
    pub user_key_len: u32,

    /// Filter budget in bits per key. 0 disables the filter.
    ///
    /// Default: 0. Must be ≤ 64.
    pub bloom_bits_per_key: u32,

    /// Desired number of distinct prefixes per index bucket.
    ///
    /// Default: 0.75. Must be finite and ≥ 0.001.
    pub hash_table_ratio: f64,

    /// Maps each key to the prefix that is hashed into the index.
    ///
    /// Default: [`FullKeyPrefix`].
    pub prefix_extractor: Arc<dyn PrefixExtractor>,
}

impl Default for PlainTableOptions {
    fn default() -> Self {
        Self {
            user_key_len: VARIABLE_LENGTH,
            bloom_bits_per_key: 0,
            hash_table_ratio: 0.75,
            prefix_extractor: Arc::new(FullKeyPrefix),
        }
    }
}

impl PlainTableOptions {
    /// Validates all configuration parameters.
    pub fn validate(&self) -> Result<(), TableError> {
        if !self.hash_table_ratio.is_finite() || self.hash_table_ratio < MIN_HASH_TABLE_RATIO {
            return Err(TableError::InvalidConfig(format!(
                "hash_table_ratio must be finite and >= {MIN_HASH_TABLE_RATIO}"
            )));
        }
        if self.bloom_bits_per_key > MAX_BITS_PER_KEY {
            return Err(TableError::InvalidConfig(format!(
                "bloom_bits_per_key must be <= {MAX_BITS_PER_KEY}"
            )));
        }
        Ok(())
    }
}
