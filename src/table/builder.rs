//! Plain table writer — builds a complete table from a sorted stream of entries.
//!
//! [`PlainTableBuilder`] is driven by the write path one entry at a time:
//!
//! 1. [`PlainTableBuilder::new`] validates the options and writes the header.
//! 2. [`PlainTableBuilder::add`] appends an entry to the data region and
//!    records `(prefix_hash, offset)` in the index accumulator.
//! 3. [`PlainTableBuilder::finish`] writes the hash index, the optional
//!    filter and the footer, then syncs the sink.
//!
//! # Input Requirements
//!
//! Keys **must** arrive in strictly ascending bytewise order. A key that is
//! not greater than its predecessor fails with [`TableError::OutOfOrder`]
//! and aborts the build: every later call fails with [`TableError::Aborted`]
//! and the partially written output must be discarded.
//!
//! # Memory
//!
//! The builder never reads back what it wrote. It keeps one
//! `(hash, offset)` record per entry for the index and, when a filter is
//! configured, a copy of every key until `finish` sizes the bloom bitmap.

use std::{
    fs::File,
    io::BufWriter,
    mem,
    path::Path,
    sync::Arc,
};

use tracing::{debug, trace, warn};

use crate::PlainTableOptions;
use crate::encoding;
use crate::file::WritableFile;
use crate::filter::FilterBuilder;
use crate::index::IndexBuilder;
use crate::prefix::PrefixExtractor;

use super::{
    FOOTER_SIZE, KeyFormat, RegionHandle, TABLE_FORMAT_VERSION, TABLE_MAGIC, TableBuilder,
    TableError, TableFooter, TableHeader, TableProperties,
};

// ------------------------------------------------------------------------------------------------
// Build state
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildState {
    Building,
    Finished,
    Aborted,
}

// ------------------------------------------------------------------------------------------------
// PlainTableBuilder
// ------------------------------------------------------------------------------------------------

/// Builds a plain table into a [`WritableFile`].
///
/// # Example
///
/// ```rust
/// use plaintable::{PlainTableBuilder, PlainTableOptions};
///
/// let mut builder = PlainTableBuilder::new(Vec::<u8>::new(), PlainTableOptions::default()).unwrap();
/// builder.add(b"apple", b"1").unwrap();
/// builder.add(b"banana", b"2").unwrap();
/// let props = builder.finish().unwrap();
/// assert_eq!(props.num_entries, 2);
/// ```
pub struct PlainTableBuilder<W: WritableFile> {
    writer: W,

    key_format: KeyFormat,
    hash_table_ratio: f64,
    bloom_bits_per_key: u32,
    prefix_extractor: Arc<dyn PrefixExtractor>,

    /// Bytes written so far; the offset of the next entry.
    offset: u64,

    /// Offset of the first entry.
    data_start: u64,

    num_entries: u64,
    last_key: Option<Vec<u8>>,
    index: IndexBuilder,
    filter: Option<FilterBuilder>,
    state: BuildState,

    /// Reused encoding buffer for entries.
    scratch: Vec<u8>,
}

impl PlainTableBuilder<BufWriter<File>> {
    /// Creates (or truncates) the file at `path` and starts a table in it.
    pub fn create(path: impl AsRef<Path>, options: PlainTableOptions) -> Result<Self, TableError> {
        let file = File::create(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "creating plain table");
        Self::new(BufWriter::new(file), options)
    }
}

impl<W: WritableFile> PlainTableBuilder<W> {
    /// Starts a table in `writer` and writes the header.
    ///
    /// # Errors
    ///
    /// - [`TableError::InvalidConfig`] if `options` fail validation.
    /// - I/O errors from writing the header.
    pub fn new(mut writer: W, options: PlainTableOptions) -> Result<Self, TableError> {
        options.validate()?;

        let header = TableHeader {
            version: TABLE_FORMAT_VERSION,
            user_key_len: options.user_key_len,
        };
        let header_bytes = encoding::encode_to_vec(&header)?;
        writer.write_all(&header_bytes)?;

        debug!(
            user_key_len = options.user_key_len,
            bloom_bits_per_key = options.bloom_bits_per_key,
            hash_table_ratio = options.hash_table_ratio,
            prefix_extractor = options.prefix_extractor.name(),
            "plain table builder started"
        );

        let filter =
            (options.bloom_bits_per_key > 0).then(|| FilterBuilder::new(options.bloom_bits_per_key));

        Ok(Self {
            writer,
            key_format: KeyFormat::from_user_key_len(options.user_key_len),
            hash_table_ratio: options.hash_table_ratio,
            bloom_bits_per_key: options.bloom_bits_per_key,
            prefix_extractor: options.prefix_extractor,
            offset: header_bytes.len() as u64,
            data_start: header_bytes.len() as u64,
            num_entries: 0,
            last_key: None,
            index: IndexBuilder::new(),
            filter,
            state: BuildState::Building,
            scratch: Vec::new(),
        })
    }

    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// - [`TableError::AlreadyFinished`] after [`finish`](Self::finish) or
    ///   [`abandon`](Self::abandon).
    /// - [`TableError::Aborted`] after an earlier fatal error.
    /// - [`TableError::InvalidKeyLength`] if the table has a fixed key length
    ///   and `key` differs from it. The entry is skipped; the build goes on.
    /// - [`TableError::OutOfOrder`] if `key` is not greater than the
    ///   previous key. Fatal.
    /// - I/O errors from the sink. Fatal.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<(), TableError> {
        self.ensure_building()?;
        self.key_format.check_key(key)?;

        if let Some(previous) = &self.last_key {
            if key <= previous.as_slice() {
                warn!(
                    key_len = key.len(),
                    entry = self.num_entries,
                    "out-of-order key rejected, aborting table build"
                );
                self.state = BuildState::Aborted;
                return Err(TableError::OutOfOrder {
                    previous: previous.clone(),
                    key: key.to_vec(),
                });
            }
        }

        self.scratch.clear();
        self.key_format.encode_entry(&mut self.scratch, key, value)?;
        if let Err(e) = self.writer.write_all(&self.scratch) {
            self.state = BuildState::Aborted;
            return Err(e.into());
        }

        let entry_offset = self.offset;
        self.offset += self.scratch.len() as u64;
        self.num_entries += 1;

        self.index.add(self.prefix_extractor.transform(key), entry_offset);
        if let Some(filter) = &mut self.filter {
            filter.add_key(key);
        }
        match &mut self.last_key {
            Some(last) => {
                last.clear();
                last.extend_from_slice(key);
            }
            None => self.last_key = Some(key.to_vec()),
        }

        trace!(
            offset = entry_offset,
            key_len = key.len(),
            value_len = value.len(),
            "entry added"
        );
        Ok(())
    }

    /// Writes the index region, the filter region (if configured) and the
    /// footer, then syncs the sink.
    ///
    /// # Errors
    ///
    /// - [`TableError::AlreadyFinished`] if called twice.
    /// - [`TableError::Aborted`] after an earlier fatal error.
    /// - I/O or internal errors while writing the trailer. Fatal.
    pub fn finish(&mut self) -> Result<TableProperties, TableError> {
        self.ensure_building()?;
        match self.write_trailer() {
            Ok(props) => {
                self.state = BuildState::Finished;
                debug!(
                    num_entries = props.num_entries,
                    bucket_count = props.bucket_count,
                    data_size = props.data_size,
                    index_size = props.index_size,
                    filter_size = props.filter_size,
                    file_size = props.file_size,
                    "plain table finished"
                );
                Ok(props)
            }
            Err(e) => {
                warn!(error = %e, "failed to finish plain table");
                self.state = BuildState::Aborted;
                Err(e)
            }
        }
    }

    /// Stops the build without writing the index or footer. The output is
    /// not a valid table.
    pub fn abandon(&mut self) {
        if self.state == BuildState::Building {
            debug!(num_entries = self.num_entries, "plain table build abandoned");
            self.state = BuildState::Finished;
        }
    }

    /// Entries added so far.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Bytes written so far (the final file size once finished).
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    /// Returns the underlying sink.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn ensure_building(&self) -> Result<(), TableError> {
        match self.state {
            BuildState::Building => Ok(()),
            BuildState::Finished => Err(TableError::AlreadyFinished),
            BuildState::Aborted => Err(TableError::Aborted),
        }
    }

    fn write_trailer(&mut self) -> Result<TableProperties, TableError> {
        let data_size = self.offset - self.data_start;

        // 1. Index region
        let index = mem::take(&mut self.index).finish(self.hash_table_ratio);
        let index_bytes = encoding::encode_to_vec(&index)?;
        let index_handle = self.write_region(&index_bytes)?;

        // 2. Filter region
        let filter_handle = match self.filter.take() {
            Some(builder) => {
                let filter = builder.finish()?;
                let filter_bytes = encoding::encode_to_vec(&filter)?;
                self.write_region(&filter_bytes)?
            }
            None => RegionHandle::default(),
        };

        // 3. Footer
        let footer = TableFooter {
            index: index_handle,
            filter: filter_handle,
            magic: TABLE_MAGIC,
        };
        let footer_bytes = encoding::encode_to_vec(&footer)?;
        if footer_bytes.len() != FOOTER_SIZE {
            return Err(TableError::Internal(format!(
                "footer encoded to {} bytes",
                footer_bytes.len()
            )));
        }
        self.write_region(&footer_bytes)?;

        self.writer.sync()?;

        Ok(TableProperties {
            format_version: TABLE_FORMAT_VERSION,
            user_key_len: self.key_format.user_key_len(),
            num_entries: self.num_entries,
            bucket_count: index.bucket_count() as u64,
            data_size,
            index_size: index_handle.size,
            filter_size: filter_handle.size,
            bloom_bits_per_key: if filter_handle.size > 0 {
                self.bloom_bits_per_key
            } else {
                0
            },
            file_size: self.offset,
        })
    }

    /// Appends `bytes` at the current offset and returns their handle.
    fn write_region(&mut self, bytes: &[u8]) -> Result<RegionHandle, TableError> {
        self.writer.write_all(bytes)?;
        let handle = RegionHandle {
            offset: self.offset,
            size: bytes.len() as u64,
        };
        self.offset += handle.size;
        Ok(handle)
    }
}

impl<W: WritableFile> TableBuilder for PlainTableBuilder<W> {
    fn add(&mut self, key: &[u8], value: &[u8]) -> Result<(), TableError> {
        PlainTableBuilder::add(self, key, value)
    }

    fn finish(&mut self) -> Result<TableProperties, TableError> {
        PlainTableBuilder::finish(self)
    }

    fn abandon(&mut self) {
        PlainTableBuilder::abandon(self)
    }

    fn num_entries(&self) -> u64 {
        self.num_entries
    }

    fn file_size(&self) -> u64 {
        self.offset
    }
}
