use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::PlainTableOptions;
use crate::prefix::FixedPrefix;
use crate::table::{FOOTER_SIZE, PlainTableBuilder, PlainTableReader, TableProperties};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Default options with a filter of `bits` bits per key.
pub fn with_filter(bits: u32) -> PlainTableOptions {
    PlainTableOptions {
        bloom_bits_per_key: bits,
        ..PlainTableOptions::default()
    }
}

/// A ratio so large that every key lands in the single bucket.
pub fn single_bucket() -> PlainTableOptions {
    PlainTableOptions {
        hash_table_ratio: 1e12,
        ..PlainTableOptions::default()
    }
}

/// Keys share a bucket whenever they share their first `len` bytes.
pub fn fixed_prefix(len: usize) -> PlainTableOptions {
    PlainTableOptions {
        prefix_extractor: Arc::new(FixedPrefix::new(len)),
        ..PlainTableOptions::default()
    }
}

/// Zero-padded numeric key; lexicographic order matches numeric order.
pub fn numbered_key(i: u32) -> Vec<u8> {
    format!("key-{i:08}").into_bytes()
}

pub fn numbered_value(i: u32) -> Vec<u8> {
    format!("value-{i}").into_bytes()
}

/// `n` sorted numbered entries.
pub fn numbered_entries(n: u32) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..n).map(|i| (numbered_key(i), numbered_value(i))).collect()
}

/// Builds a table into memory.
pub fn build_bytes<K, V>(entries: &[(K, V)], options: &PlainTableOptions) -> Vec<u8>
where
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    let mut builder = PlainTableBuilder::new(Vec::new(), options.clone()).unwrap();
    for (key, value) in entries {
        builder.add(key.as_ref(), value.as_ref()).unwrap();
    }
    builder.finish().unwrap();
    builder.into_inner()
}

/// Builds a table into `dir/name` and returns its path with the builder's properties.
pub fn build_file<K, V>(
    dir: &Path,
    name: &str,
    entries: &[(K, V)],
    options: &PlainTableOptions,
) -> (PathBuf, TableProperties)
where
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    let path = dir.join(name);
    let mut builder = PlainTableBuilder::create(&path, options.clone()).unwrap();
    for (key, value) in entries {
        builder.add(key.as_ref(), value.as_ref()).unwrap();
    }
    let props = builder.finish().unwrap();
    (path, props)
}

/// Opens an in-memory table.
pub fn open_bytes(
    bytes: Vec<u8>,
    options: &PlainTableOptions,
) -> Result<PlainTableReader<Vec<u8>>, crate::table::TableError> {
    let len = bytes.len() as u64;
    PlainTableReader::from_file(bytes, len, options.clone())
}

/// Raw footer fields: `(index_offset, index_size, filter_offset, filter_size, magic)`.
pub fn read_footer(bytes: &[u8]) -> (u64, u64, u64, u64, u64) {
    let footer = &bytes[bytes.len() - FOOTER_SIZE..];
    let field = |i: usize| u64::from_le_bytes(footer[i * 8..i * 8 + 8].try_into().unwrap());
    (field(0), field(1), field(2), field(3), field(4))
}

/// Overwrites footer field `i` (0..5) with `value`.
pub fn patch_footer(bytes: &mut [u8], i: usize, value: u64) {
    let start = bytes.len() - FOOTER_SIZE + i * 8;
    bytes[start..start + 8].copy_from_slice(&value.to_le_bytes());
}
