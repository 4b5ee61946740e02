//! File abstractions the table format is written to and read from.
//!
//! - [`WritableFile`] — a sequential append sink. Any [`Write`] works; the
//!   extra [`WritableFile::sync`] hook lets file-backed sinks reach stable
//!   storage when a table is finished.
//! - [`RandomAccessFile`] — an addressable, immutable byte source. The
//!   reader works directly against it without copying data into a block
//!   cache; [`Mmap`] is the production source, in-memory buffers are
//!   accepted for tests and embedding.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;

use memmap2::Mmap;

use crate::table::TableError;

// ------------------------------------------------------------------------------------------------
// Sequential writes
// ------------------------------------------------------------------------------------------------

/// Append-only destination of a table builder.
pub trait WritableFile: Write {
    /// Flushes buffered bytes and makes them durable.
    fn sync(&mut self) -> io::Result<()>;
}

impl WritableFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.sync_all()
    }
}

impl WritableFile for BufWriter<File> {
    fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.get_ref().sync_all()
    }
}

impl WritableFile for Vec<u8> {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: WritableFile + ?Sized> WritableFile for &mut W {
    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

// ------------------------------------------------------------------------------------------------
// Random-access reads
// ------------------------------------------------------------------------------------------------

/// Immutable, addressable bytes of a finished table.
pub trait RandomAccessFile: Send + Sync {
    /// The whole file.
    fn as_bytes(&self) -> &[u8];

    /// File size in bytes.
    fn size(&self) -> u64 {
        self.as_bytes().len() as u64
    }

    /// Borrows `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// [`TableError::CorruptData`] if the range extends past the end of the file.
    fn read(&self, offset: u64, len: usize) -> Result<&[u8], TableError> {
        let bytes = self.as_bytes();
        usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(len)?))
            .and_then(|range| bytes.get(range))
            .ok_or_else(|| {
                TableError::CorruptData(format!(
                    "read of {len} bytes at offset {offset} past end of {}-byte file",
                    bytes.len()
                ))
            })
    }
}

impl RandomAccessFile for Mmap {
    fn as_bytes(&self) -> &[u8] {
        self
    }
}

impl RandomAccessFile for Vec<u8> {
    fn as_bytes(&self) -> &[u8] {
        self
    }
}

impl RandomAccessFile for Arc<[u8]> {
    fn as_bytes(&self) -> &[u8] {
        self
    }
}
