//! Hash prefix index: maps `crc32(prefix(key))` to chains of entry offsets.
//!
//! The index has two phases:
//!
//! - **Build time** — [`IndexBuilder`] records one `(prefix_hash, offset)` pair
//!   per added entry, in insertion (ascending-key) order, and counts distinct
//!   prefixes.
//! - **Immutable** — [`HashIndex`] holds the finished bucket table. It is
//!   produced either by [`IndexBuilder::finish`] or by [`HashIndex::decode`]
//!   when a table is opened, and is never modified afterward.
//!
//! # Region layout
//!
//! ```text
//! [bucket_count: varint32]
//! bucket_count × [chain_length: varint32][offset: u64 LE] × chain_length
//! ```
//!
//! In memory the chains are flattened into one offsets array plus a
//! `bucket_count + 1` array of chain start positions, so resolving a bucket
//! is two array reads.
//!
//! # Chain order
//!
//! Offsets inside a chain are strictly ascending. Since entries are written
//! in ascending key order, this is also ascending key order, and readers can
//! stop scanning a chain as soon as a candidate key exceeds the lookup key.
//! A hash match is never trusted on its own: callers must always compare the
//! full key stored at the candidate offset.


use std::ops::Range;

use tracing::debug;

use crate::encoding::{self, Encode, EncodingError};
use crate::table::TableError;

/// Smallest accepted `hash_table_ratio`: at most 1000 buckets per prefix.
pub const MIN_HASH_TABLE_RATIO: f64 = 1e-3;

/// Hash of a key prefix, used to select a bucket.
#[inline]
pub fn prefix_hash(prefix: &[u8]) -> u32 {
    crc32fast::hash(prefix)
}

/// Number of buckets for `distinct_prefixes` at the given load ratio.
///
/// `hash_table_ratio` is the desired number of prefixes per bucket, so the
/// result is `ceil(distinct_prefixes / hash_table_ratio)`, never below one
/// and never above `u32::MAX`.
pub fn bucket_count_for(distinct_prefixes: usize, hash_table_ratio: f64) -> usize {
    let wanted = (distinct_prefixes as f64 / hash_table_ratio).ceil();
    if !wanted.is_finite() || wanted >= u32::MAX as f64 {
        return u32::MAX as usize;
    }
    (wanted as usize).max(1)
}

// ------------------------------------------------------------------------------------------------
// IndexBuilder
// ------------------------------------------------------------------------------------------------

/// Build-time accumulator owned exclusively by a table builder.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    /// `(prefix_hash, entry_offset)` in insertion order.
    records: Vec<(u32, u64)>,

    /// Prefix of the most recently added key.
    last_prefix: Option<Vec<u8>>,

    distinct_prefixes: usize,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the entry starting at `offset` whose key has `prefix`.
    pub fn add(&mut self, prefix: &[u8], offset: u64) {
        if self.last_prefix.as_deref() != Some(prefix) {
            self.distinct_prefixes += 1;
            match &mut self.last_prefix {
                Some(last) => {
                    last.clear();
                    last.extend_from_slice(prefix);
                }
                None => self.last_prefix = Some(prefix.to_vec()),
            }
        }
        self.records.push((prefix_hash(prefix), offset));
    }

    /// Number of entries recorded.
    pub fn num_entries(&self) -> usize {
        self.records.len()
    }

    /// Number of distinct prefixes seen, counting runs of equal prefixes once.
    pub fn distinct_prefixes(&self) -> usize {
        self.distinct_prefixes
    }

    /// Distributes the recorded offsets into buckets.
    ///
    /// Uses a stable counting sort, so each chain keeps insertion order.
    pub fn finish(self, hash_table_ratio: f64) -> HashIndex {
        let bucket_count = bucket_count_for(self.distinct_prefixes, hash_table_ratio);

        let mut bucket_starts = vec![0usize; bucket_count + 1];
        for (hash, _) in &self.records {
            bucket_starts[bucket_of(*hash, bucket_count) + 1] += 1;
        }
        for i in 1..bucket_starts.len() {
            bucket_starts[i] += bucket_starts[i - 1];
        }

        let mut cursor = bucket_starts.clone();
        let mut offsets = vec![0u64; self.records.len()];
        for (hash, offset) in &self.records {
            let bucket = bucket_of(*hash, bucket_count);
            offsets[cursor[bucket]] = *offset;
            cursor[bucket] += 1;
        }

        debug!(
            entries = offsets.len(),
            distinct_prefixes = self.distinct_prefixes,
            bucket_count,
            "hash index finished"
        );

        HashIndex {
            bucket_starts,
            offsets,
        }
    }
}

#[inline]
fn bucket_of(hash: u32, bucket_count: usize) -> usize {
    hash as usize % bucket_count
}

// ------------------------------------------------------------------------------------------------
// HashIndex
// ------------------------------------------------------------------------------------------------

/// Immutable bucket table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashIndex {
    /// `bucket_starts[b]..bucket_starts[b + 1]` is bucket `b`'s range in `offsets`.
    bucket_starts: Vec<usize>,

    /// All chains, concatenated in bucket order.
    offsets: Vec<u64>,
}

impl HashIndex {
    /// Number of buckets (always at least one).
    pub fn bucket_count(&self) -> usize {
        self.bucket_starts.len() - 1
    }

    /// Total number of indexed entries.
    pub fn num_entries(&self) -> usize {
        self.offsets.len()
    }

    /// Bucket selected by `prefix`.
    pub fn bucket_for(&self, prefix: &[u8]) -> usize {
        bucket_of(prefix_hash(prefix), self.bucket_count())
    }

    /// Candidate offsets of `bucket`, in ascending order. Empty if out of range.
    pub fn chain(&self, bucket: usize) -> &[u64] {
        match (
            self.bucket_starts.get(bucket),
            self.bucket_starts.get(bucket + 1),
        ) {
            (Some(&start), Some(&end)) => &self.offsets[start..end],
            _ => &[],
        }
    }

    /// Candidate offsets for a key with the given `prefix`.
    pub fn candidates(&self, prefix: &[u8]) -> &[u64] {
        self.chain(self.bucket_for(prefix))
    }

    /// Length of the longest chain.
    pub fn max_chain_len(&self) -> usize {
        self.bucket_starts
            .windows(2)
            .map(|w| w[1] - w[0])
            .max()
            .unwrap_or(0)
    }

    /// Parses an index region.
    ///
    /// Every offset must fall inside `data_range` and chains must be strictly
    /// ascending; the region must be consumed exactly.
    ///
    /// # Errors
    ///
    /// [`TableError::CorruptData`] on any malformed count, out-of-range
    /// offset, unordered chain, or trailing bytes.
    pub fn decode(region: &[u8], data_range: Range<u64>) -> Result<Self, TableError> {
        let (bucket_count, mut off) = encoding::get_varint32(region)?;
        let bucket_count = bucket_count as usize;
        if bucket_count == 0 {
            return Err(TableError::CorruptData("index has zero buckets".into()));
        }
        // Every bucket takes at least one byte for its chain length.
        if bucket_count > region.len() - off {
            return Err(TableError::CorruptData(format!(
                "index declares {bucket_count} buckets in {} bytes",
                region.len() - off
            )));
        }

        let mut bucket_starts = Vec::with_capacity(bucket_count + 1);
        let mut offsets = Vec::new();
        bucket_starts.push(0);

        for bucket in 0..bucket_count {
            let (chain_len, n) = encoding::get_varint32(&region[off..])?;
            off += n;
            let chain_len = chain_len as usize;

            let chain_bytes = chain_len.checked_mul(8).unwrap_or(usize::MAX);
            if chain_bytes > region.len() - off {
                return Err(TableError::CorruptData(format!(
                    "bucket {bucket} chain of {chain_len} offsets exceeds index region"
                )));
            }

            let mut previous: Option<u64> = None;
            for _ in 0..chain_len {
                let offset = encoding::read_u64_le(&region[off..])?;
                off += 8;
                if !data_range.contains(&offset) {
                    return Err(TableError::CorruptData(format!(
                        "bucket {bucket} offset {offset} outside data region {data_range:?}"
                    )));
                }
                if previous.is_some_and(|p| p >= offset) {
                    return Err(TableError::CorruptData(format!(
                        "bucket {bucket} chain is not ascending at offset {offset}"
                    )));
                }
                previous = Some(offset);
                offsets.push(offset);
            }
            bucket_starts.push(offsets.len());
        }

        if off != region.len() {
            return Err(TableError::CorruptData(format!(
                "{} trailing bytes after index",
                region.len() - off
            )));
        }

        Ok(Self {
            bucket_starts,
            offsets,
        })
    }
}

impl Encode for HashIndex {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encoding::put_varint32(buf, encoding::len_to_u32(self.bucket_count())?);
        for bucket in 0..self.bucket_count() {
            let chain = self.chain(bucket);
            encoding::put_varint32(buf, encoding::len_to_u32(chain.len())?);
            for offset in chain {
                offset.encode_to(buf)?;
            }
        }
        Ok(())
    }
}
