//! Prefix extraction strategies for the hash index.
//!
//! The hash index never hashes a full key directly; it hashes the key's
//! *prefix* as produced by a [`PrefixExtractor`]. The extractor is supplied
//! by the surrounding engine through [`PlainTableOptions`](crate::PlainTableOptions)
//! and must be identical for the builder and every reader of a table.
//!
//! Keys that share a prefix land in the same bucket chain, so a coarse
//! prefix trades longer chains for a smaller index.

use std::fmt::Debug;

/// Produces the indexed prefix of a key.
///
/// Implementations must be deterministic: the same key always yields the
/// same prefix. The returned slice must borrow from `key`.
pub trait PrefixExtractor: Send + Sync + Debug {
    /// Human-readable name, logged when a table is built or opened.
    fn name(&self) -> &str;

    /// Returns the prefix of `key` used for hashing.
    fn transform<'a>(&self, key: &'a [u8]) -> &'a [u8];
}

/// Uses the whole key as its own prefix.
///
/// Every distinct key becomes a distinct prefix, which gives the shortest
/// chains at the cost of one index slot per key.
#[derive(Debug, Default, Clone, Copy)]
pub struct FullKeyPrefix;

impl PrefixExtractor for FullKeyPrefix {
    fn name(&self) -> &str {
        "plaintable.FullKeyPrefix"
    }

    fn transform<'a>(&self, key: &'a [u8]) -> &'a [u8] {
        key
    }
}

/// Uses the first `len` bytes of the key; shorter keys are used whole.
#[derive(Debug, Clone)]
pub struct FixedPrefix {
    len: usize,
    name: String,
}

impl FixedPrefix {
    /// Creates an extractor keeping the first `len` bytes of each key.
    pub fn new(len: usize) -> Self {
        Self {
            len,
            name: format!("plaintable.FixedPrefix.{len}"),
        }
    }

    /// The configured prefix length.
    pub fn prefix_len(&self) -> usize {
        self.len
    }
}

impl PrefixExtractor for FixedPrefix {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform<'a>(&self, key: &'a [u8]) -> &'a [u8] {
        &key[..key.len().min(self.len)]
    }
}
