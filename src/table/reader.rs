//! Plain table reader — point lookups and scans against a mapped table.
//!
//! [`PlainTableReader`] validates a finished table once, at open time, and
//! then serves every request directly from the mapped bytes. No block cache
//! sits in between: an entry is decoded in place at its recorded offset and
//! returned as a slice borrowed from the mapping.

use std::{fmt, fs::File, ops::Range, path::Path, sync::Arc};

use memmap2::Mmap;
use tracing::{debug, trace, warn};

use crate::PlainTableOptions;
use crate::encoding;
use crate::file::RandomAccessFile;
use crate::filter::PrefixFilter;
use crate::index::HashIndex;
use crate::prefix::PrefixExtractor;

use super::{
    BINARY_SEARCH_MIN_CHAIN, FOOTER_SIZE, KeyFormat, MIN_TABLE_SIZE, TABLE_FORMAT_VERSION,
    TABLE_MAGIC, TableError, TableFooter, TableHeader, TableProperties, TableReader,
};
use super::iterator::{Entry, TableIterator};

// ------------------------------------------------------------------------------------------------
// PlainTableReader
// ------------------------------------------------------------------------------------------------

/// An opened, validated, immutable plain table.
///
/// All state is read-only after [`PlainTableReader::from_file`] returns, so a
/// reader is `Send + Sync` whenever its file is and may be shared across
/// threads through an `Arc` without locking.
pub struct PlainTableReader<F: RandomAccessFile = Mmap> {
    /// Backing bytes (normally a read-only memory map).
    file: F,

    /// Logical table size; may be smaller than the backing file.
    file_size: usize,

    header: TableHeader,
    footer: TableFooter,
    key_format: KeyFormat,

    /// Byte range of the data region.
    data: Range<usize>,

    index: HashIndex,
    filter: Option<PrefixFilter>,
    prefix_extractor: Arc<dyn PrefixExtractor>,
}

impl PlainTableReader<Mmap> {
    /// Opens and memory-maps the table at `path`.
    ///
    /// The file handle is released as soon as the mapping exists; the
    /// mapping itself lives as long as the reader.
    ///
    /// # Safety
    ///
    /// Uses `unsafe { Mmap::map(...) }`. This is sound as long as the file is
    /// not modified while mapped, which holds for finished tables: they are
    /// never written again.
    pub fn open(path: impl AsRef<Path>, options: PlainTableOptions) -> Result<Self, TableError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < MIN_TABLE_SIZE as u64 {
            return Err(TableError::InvalidFormat(format!(
                "file of {file_size} bytes is too small to be a table"
            )));
        }

        // SAFETY: finished tables are immutable on disk; the map is read-only.
        let mmap = unsafe { Mmap::map(&file)? };
        drop(file);

        debug!(path = %path.display(), file_size, "mapped plain table");
        Self::from_file(mmap, file_size, options)
    }
}

impl<F: RandomAccessFile> PlainTableReader<F> {
    /// Validates and loads the table held by `file`, whose logical size is
    /// `file_size`.
    ///
    /// # Overview
    ///
    /// 1. **Footer** — read from the last [`FOOTER_SIZE`] bytes; the magic
    ///    must match.
    /// 2. **Header** — version must be supported.
    /// 3. **Region layout** — data, index and filter regions must tile the
    ///    space between the header and the footer exactly.
    /// 4. **Index** — parsed into memory; every offset must point into the
    ///    data region.
    /// 5. **Filter** — parsed if present.
    ///
    /// # Errors
    ///
    /// - [`TableError::InvalidFormat`] for size, magic, version or layout
    ///   violations.
    /// - [`TableError::CorruptData`] for malformed index or filter contents.
    ///
    /// No partially-initialized reader is ever returned.
    pub fn from_file(
        file: F,
        file_size: u64,
        options: PlainTableOptions,
    ) -> Result<Self, TableError> {
        if file_size > file.size() {
            return Err(TableError::InvalidFormat(format!(
                "declared size {file_size} exceeds backing file of {} bytes",
                file.size()
            )));
        }
        let file_size = usize::try_from(file_size).map_err(|_| {
            TableError::InvalidFormat("file size exceeds addressable range".into())
        })?;
        if file_size < MIN_TABLE_SIZE {
            return Err(TableError::InvalidFormat(format!(
                "file of {file_size} bytes is too small to be a table"
            )));
        }
        let bytes = file.as_bytes().get(..file_size).ok_or_else(|| {
            TableError::InvalidFormat(format!(
                "file reports {} bytes but maps only {}",
                file.size(),
                file.as_bytes().len()
            ))
        })?;

        // 1) Footer
        let footer_start = file_size - FOOTER_SIZE;
        let footer_bytes = file.read(footer_start as u64, FOOTER_SIZE)?;
        let (footer, _) = encoding::decode_from_slice::<TableFooter>(footer_bytes)
            .map_err(|e| TableError::InvalidFormat(format!("footer: {e}")))?;
        if footer.magic != TABLE_MAGIC {
            return Err(TableError::InvalidFormat(format!(
                "bad magic 0x{:016X}",
                footer.magic
            )));
        }

        // 2) Header
        let (header, header_len) = encoding::decode_from_slice::<TableHeader>(bytes)
            .map_err(|e| TableError::InvalidFormat(format!("header: {e}")))?;
        if header.version != TABLE_FORMAT_VERSION {
            return Err(TableError::InvalidFormat(format!(
                "unsupported format version {}",
                header.version
            )));
        }

        // 3) Region layout
        let (index_range, filter_range) =
            Self::check_layout(&footer, header_len as u64, footer_start as u64)?;
        let data = header_len..index_range.start;

        // 4) Index
        let index = HashIndex::decode(
            &bytes[index_range],
            data.start as u64..data.end as u64,
        )?;

        // 5) Filter
        let filter = match filter_range {
            Some(range) => Some(PrefixFilter::decode(&bytes[range])?),
            None => None,
        };

        if options.user_key_len != header.user_key_len {
            warn!(
                configured = options.user_key_len,
                stored = header.user_key_len,
                "configured key length differs from table header, using header"
            );
        }

        debug!(
            file_size,
            user_key_len = header.user_key_len,
            num_entries = index.num_entries(),
            bucket_count = index.bucket_count(),
            max_chain_len = index.max_chain_len(),
            has_filter = filter.is_some(),
            prefix_extractor = options.prefix_extractor.name(),
            "opened plain table"
        );

        Ok(Self {
            file,
            file_size,
            header,
            footer,
            key_format: KeyFormat::from_user_key_len(header.user_key_len),
            data,
            index,
            filter,
            prefix_extractor: options.prefix_extractor,
        })
    }

    /// Checks that data, index and filter regions tile
    /// `[header_len, footer_start)` and returns the index and filter ranges.
    fn check_layout(
        footer: &TableFooter,
        header_len: u64,
        footer_start: u64,
    ) -> Result<(Range<usize>, Option<Range<usize>>), TableError> {
        let index_end = footer
            .index
            .end()
            .ok_or_else(|| TableError::InvalidFormat("index region overflows".into()))?;
        if footer.index.offset < header_len || footer.index.size == 0 {
            return Err(TableError::InvalidFormat(format!(
                "index region {:?} overlaps header or is empty",
                footer.index
            )));
        }

        let regions_end = if footer.filter.size == 0 {
            if footer.filter.offset != 0 {
                return Err(TableError::InvalidFormat(format!(
                    "empty filter region with non-zero offset {}",
                    footer.filter.offset
                )));
            }
            index_end
        } else {
            if footer.filter.offset != index_end {
                return Err(TableError::InvalidFormat(format!(
                    "filter region {:?} does not follow index region ending at {index_end}",
                    footer.filter
                )));
            }
            footer
                .filter
                .end()
                .ok_or_else(|| TableError::InvalidFormat("filter region overflows".into()))?
        };

        if regions_end != footer_start {
            return Err(TableError::InvalidFormat(format!(
                "regions end at {regions_end}, footer starts at {footer_start}"
            )));
        }

        // All bounds are now <= footer_start, which fits in usize.
        let index_range = footer.index.offset as usize..index_end as usize;
        let filter_range = (footer.filter.size > 0)
            .then(|| footer.filter.offset as usize..regions_end as usize);
        Ok((index_range, filter_range))
    }

    /// Looks up `key`.
    ///
    /// # Lookup pipeline
    ///
    /// 1. **Key length** — fixed-length tables reject keys of another length.
    /// 2. **Filter** — a negative answer returns `None` without touching the
    ///    index or the data region.
    /// 3. **Bucket** — the key's prefix hash selects one chain of offsets.
    /// 4. **Disambiguation** — candidates are decoded in place and compared
    ///    by full key. Chains are key-ascending, so the scan stops at the
    ///    first larger key, and long chains are binary searched.
    ///
    /// # Errors
    ///
    /// - [`TableError::InvalidKeyLength`] for a fixed-length mismatch.
    /// - [`TableError::CorruptData`] if a candidate entry cannot be decoded.
    ///   The reader stays usable for other lookups.
    pub fn get(&self, key: &[u8]) -> Result<Option<&[u8]>, TableError> {
        self.key_format.check_key(key)?;

        if let Some(filter) = &self.filter {
            if !filter.may_contain(key) {
                trace!(key_len = key.len(), "filter excluded key");
                return Ok(None);
            }
        }

        let chain = self.index.candidates(self.prefix_extractor.transform(key));
        trace!(key_len = key.len(), candidates = chain.len(), "probing bucket");

        if chain.len() >= BINARY_SEARCH_MIN_CHAIN {
            self.search_chain(chain, key)
        } else {
            self.scan_chain(chain, key)
        }
    }

    /// Returns `true` if `key` is stored in the table.
    pub fn contains_key(&self, key: &[u8]) -> Result<bool, TableError> {
        Ok(self.get(key)?.is_some())
    }

    /// Filter probe only: `false` means `key` is definitely absent.
    /// Always `true` for tables without a filter.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.filter.as_ref().is_none_or(|f| f.may_contain(key))
    }

    /// Returns an iterator over all entries in ascending key order.
    pub fn iter(&self) -> TableIterator<'_> {
        TableIterator::new(
            &self.file.as_bytes()[..self.data.end],
            self.data.start,
            self.key_format,
            &self.index,
            self.prefix_extractor.as_ref(),
        )
    }

    /// Fixed key length, or 0 for variable-length keys.
    pub fn user_key_length(&self) -> u32 {
        self.header.user_key_len
    }

    /// Number of entries in the table.
    pub fn num_entries(&self) -> u64 {
        self.index.num_entries() as u64
    }

    /// Number of hash index buckets.
    pub fn bucket_count(&self) -> usize {
        self.index.bucket_count()
    }

    /// Logical size of the table in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size as u64
    }

    /// Whether the table carries a filter region.
    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Table-level metadata derived from the header, footer and index.
    pub fn properties(&self) -> TableProperties {
        TableProperties {
            format_version: self.header.version,
            user_key_len: self.header.user_key_len,
            num_entries: self.num_entries(),
            bucket_count: self.index.bucket_count() as u64,
            data_size: (self.data.end - self.data.start) as u64,
            index_size: self.footer.index.size,
            filter_size: self.footer.filter.size,
            bloom_bits_per_key: self.filter.as_ref().map_or(0, |f| f.bits_per_key()),
            file_size: self.file_size as u64,
        }
    }

    // --------------------------------------------------------------------------------------------
    // Chain resolution
    // --------------------------------------------------------------------------------------------

    fn scan_chain(&self, chain: &[u64], key: &[u8]) -> Result<Option<&[u8]>, TableError> {
        for &offset in chain {
            let (candidate, value) = self.entry_at(offset)?;
            match candidate.cmp(key) {
                std::cmp::Ordering::Equal => return Ok(Some(value)),
                std::cmp::Ordering::Greater => break,
                std::cmp::Ordering::Less => {}
            }
        }
        Ok(None)
    }

    fn search_chain(&self, chain: &[u64], key: &[u8]) -> Result<Option<&[u8]>, TableError> {
        let (mut lo, mut hi) = (0, chain.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (candidate, value) = self.entry_at(chain[mid])?;
            match candidate.cmp(key) {
                std::cmp::Ordering::Equal => return Ok(Some(value)),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        Ok(None)
    }

    /// Decodes the entry starting at `offset` in place.
    fn entry_at(&self, offset: u64) -> Result<(&[u8], &[u8]), TableError> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|o| self.data.contains(o))
            .ok_or_else(|| {
                TableError::CorruptData(format!("entry offset {offset} outside data region"))
            })?;
        let region = &self.file.as_bytes()[start..self.data.end];
        let (key, value, _) = self.key_format.decode_entry(region).map_err(|e| {
            warn!(offset, error = %e, "corrupt entry");
            TableError::CorruptData(format!("entry at offset {offset}: {e}"))
        })?;
        Ok((key, value))
    }
}

impl<F: RandomAccessFile> TableReader for PlainTableReader<F> {
    fn get(&self, key: &[u8]) -> Result<Option<&[u8]>, TableError> {
        PlainTableReader::get(self, key)
    }

    fn new_iterator(&self) -> Box<dyn Iterator<Item = Result<Entry<'_>, TableError>> + '_> {
        Box::new(self.iter())
    }

    fn properties(&self) -> TableProperties {
        PlainTableReader::properties(self)
    }
}

impl<F: RandomAccessFile> fmt::Debug for PlainTableReader<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainTableReader")
            .field("file_size", &self.file_size)
            .field("header", &self.header)
            .field("footer", &self.footer)
            .field("buckets", &self.index.bucket_count())
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}
