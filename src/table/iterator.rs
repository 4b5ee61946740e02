//! Ordered scan over a table's data region.
//!
//! The data region is already sorted, so iteration is a straight walk from
//! the first entry to the last. The hash index is only consulted by
//! [`TableIterator::seek`] to skip ahead.

use tracing::{trace, warn};

use crate::index::HashIndex;
use crate::prefix::PrefixExtractor;

use super::{KeyFormat, TableError};

/// A key-value pair borrowed from the table, with its file offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],

    /// Absolute offset of the entry in the file.
    pub offset: u64,
}

/// Forward iterator over every entry, in ascending key order.
///
/// Yields `Err(TableError::CorruptData)` at most once; after an error the
/// iterator is exhausted until repositioned with
/// [`seek_to_first`](Self::seek_to_first) or [`seek`](Self::seek).
pub struct TableIterator<'a> {
    /// File bytes up to the end of the data region.
    bytes: &'a [u8],
    data_start: usize,
    cursor: usize,
    key_format: KeyFormat,
    index: &'a HashIndex,
    prefix_extractor: &'a dyn PrefixExtractor,
    failed: bool,
}

impl<'a> TableIterator<'a> {
    pub(crate) fn new(
        bytes: &'a [u8],
        data_start: usize,
        key_format: KeyFormat,
        index: &'a HashIndex,
        prefix_extractor: &'a dyn PrefixExtractor,
    ) -> Self {
        Self {
            bytes,
            data_start,
            cursor: data_start,
            key_format,
            index,
            prefix_extractor,
            failed: false,
        }
    }

    /// Repositions at the first entry.
    pub fn seek_to_first(&mut self) {
        self.cursor = self.data_start;
        self.failed = false;
    }

    /// Positions the iterator at the first entry whose key is `>= target`.
    ///
    /// The target's index chain is used to find the closest entry at or
    /// before `target`; an exact hit needs no scanning at all. From there
    /// the data region is walked forward.
    ///
    /// # Errors
    ///
    /// [`TableError::CorruptData`] if an entry read along the way cannot be
    /// decoded. The iterator is then exhausted.
    pub fn seek(&mut self, target: &[u8]) -> Result<(), TableError> {
        self.seek_to_first();

        let chain = self.index.candidates(self.prefix_extractor.transform(target));
        for &offset in chain.iter().rev() {
            let Ok(start) = usize::try_from(offset) else {
                continue;
            };
            let (key, _, _) = self.decode_at(start)?;
            if key <= target {
                self.cursor = start;
                if key == target {
                    trace!(offset, "seek hit index");
                    return Ok(());
                }
                break;
            }
        }

        while self.cursor < self.bytes.len() {
            let (key, _, len) = self.decode_at(self.cursor)?;
            if key >= target {
                break;
            }
            self.cursor += len;
        }
        trace!(offset = self.cursor, "seek positioned");
        Ok(())
    }

    /// Offset of the entry the next call to `next` returns, or the end of
    /// the data region when exhausted.
    pub fn position(&self) -> u64 {
        self.cursor as u64
    }

    fn decode_at(&mut self, start: usize) -> Result<(&'a [u8], &'a [u8], usize), TableError> {
        let bytes = self.bytes;
        let region = bytes.get(start..).unwrap_or_default();
        self.key_format.decode_entry(region).map_err(|e| {
            warn!(offset = start, error = %e, "corrupt entry during scan");
            self.failed = true;
            self.cursor = bytes.len();
            TableError::CorruptData(format!("entry at offset {start}: {e}"))
        })
    }
}

impl<'a> Iterator for TableIterator<'a> {
    type Item = Result<Entry<'a>, TableError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.bytes.len() {
            return None;
        }
        let offset = self.cursor;
        match self.decode_at(offset) {
            Ok((key, value, len)) => {
                self.cursor += len;
                Some(Ok(Entry {
                    key,
                    value,
                    offset: offset as u64,
                }))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl std::iter::FusedIterator for TableIterator<'_> {}
