//! Builder contract: ordering, state transitions and sink failures.

#[cfg(test)]
mod tests {
    use std::io::{self, Write};

    use crate::PlainTableOptions;
    use crate::file::WritableFile;
    use crate::table::tests::helpers::*;
    use crate::table::{PlainTableBuilder, TableBuilder, TableError};

    /// Sink that fails every write after `budget` bytes.
    struct FailingSink {
        written: Vec<u8>,
        budget: usize,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written.len() + buf.len() > self.budget {
                return Err(io::Error::other("disk full"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl WritableFile for FailingSink {
        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn builder() -> PlainTableBuilder<Vec<u8>> {
        PlainTableBuilder::new(Vec::new(), PlainTableOptions::default()).unwrap()
    }

    /// # Scenario
    /// Add a key equal to the previous one.
    ///
    /// # Expected behavior
    /// `OutOfOrder` carrying both keys; every later call fails with `Aborted`.
    #[test]
    fn duplicate_key_aborts() {
        init_tracing();
        let mut b = builder();
        b.add(b"k1", b"v").unwrap();

        match b.add(b"k1", b"v") {
            Err(TableError::OutOfOrder { previous, key }) => {
                assert_eq!(previous, b"k1");
                assert_eq!(key, b"k1");
            }
            other => panic!("expected OutOfOrder, got {other:?}"),
        }
        assert!(matches!(b.add(b"k2", b"v"), Err(TableError::Aborted)));
        assert!(matches!(b.finish(), Err(TableError::Aborted)));
        assert_eq!(b.num_entries(), 1);
    }

    #[test]
    fn descending_key_aborts() {
        init_tracing();
        let mut b = builder();
        b.add(b"b", b"1").unwrap();
        assert!(matches!(
            b.add(b"a", b"2"),
            Err(TableError::OutOfOrder { .. })
        ));
        assert!(matches!(b.add(b"c", b"3"), Err(TableError::Aborted)));
    }

    /// # Scenario
    /// Call `add` and `finish` after a successful `finish`.
    ///
    /// # Expected behavior
    /// Both fail with `AlreadyFinished` and the output is unchanged.
    #[test]
    fn add_after_finish() {
        init_tracing();
        let mut b = builder();
        b.add(b"a", b"1").unwrap();
        b.finish().unwrap();
        let size = b.file_size();

        assert!(matches!(b.add(b"b", b"2"), Err(TableError::AlreadyFinished)));
        assert!(matches!(b.finish(), Err(TableError::AlreadyFinished)));
        assert_eq!(b.file_size(), size);
        assert_eq!(b.into_inner().len() as u64, size);
    }

    #[test]
    fn abandon_stops_the_build() {
        init_tracing();
        let mut b = builder();
        b.add(b"a", b"1").unwrap();
        let size = b.file_size();
        b.abandon();

        assert!(matches!(b.add(b"b", b"2"), Err(TableError::AlreadyFinished)));
        assert!(matches!(b.finish(), Err(TableError::AlreadyFinished)));
        let bytes = b.into_inner();
        assert_eq!(bytes.len() as u64, size);
        assert!(open_bytes(bytes, &PlainTableOptions::default()).is_err());
    }

    /// # Scenario
    /// Track `num_entries` and `file_size` while adding entries.
    ///
    /// # Expected behavior
    /// Both grow with every entry; the size starts at the header.
    #[test]
    fn progress_counters() {
        init_tracing();
        let mut b = builder();
        assert_eq!(b.num_entries(), 0);
        assert_eq!(b.file_size(), 2);

        b.add(b"abc", b"xyz").unwrap();
        assert_eq!(b.num_entries(), 1);
        assert_eq!(b.file_size(), 2 + 1 + 3 + 1 + 3);

        b.add(b"abd", b"").unwrap();
        assert_eq!(b.num_entries(), 2);
        assert_eq!(b.file_size(), 10 + 1 + 3 + 1);
    }

    #[test]
    fn invalid_options_rejected() {
        init_tracing();
        let options = PlainTableOptions {
            hash_table_ratio: 0.0,
            ..PlainTableOptions::default()
        };
        assert!(matches!(
            PlainTableBuilder::new(Vec::<u8>::new(), options),
            Err(TableError::InvalidConfig(_))
        ));

        let options = PlainTableOptions {
            bloom_bits_per_key: 65,
            ..PlainTableOptions::default()
        };
        assert!(matches!(
            PlainTableBuilder::new(Vec::<u8>::new(), options),
            Err(TableError::InvalidConfig(_))
        ));
    }

    /// # Scenario
    /// Build ten keys at a ratio below the minimum, then at the minimum.
    ///
    /// # Expected behavior
    /// The tiny ratio is refused up front; the minimum yields at most
    /// 1000 buckets per distinct prefix.
    #[test]
    fn tiny_ratio_rejected() {
        init_tracing();
        let options = PlainTableOptions {
            hash_table_ratio: 1e-6,
            ..PlainTableOptions::default()
        };
        assert!(matches!(
            PlainTableBuilder::new(Vec::<u8>::new(), options),
            Err(TableError::InvalidConfig(_))
        ));

        let options = PlainTableOptions {
            hash_table_ratio: crate::index::MIN_HASH_TABLE_RATIO,
            ..PlainTableOptions::default()
        };
        let entries = numbered_entries(10);
        let reader = open_bytes(build_bytes(&entries, &options), &options).unwrap();
        assert_eq!(reader.bucket_count(), 10_000);
        for (key, value) in &entries {
            assert_eq!(reader.get(key).unwrap(), Some(value.as_slice()));
        }
    }

    /// # Scenario
    /// The sink fails in the middle of the data region.
    ///
    /// # Expected behavior
    /// The failing `add` returns `Io`; the builder is aborted afterward.
    #[test]
    fn write_failure_aborts() {
        init_tracing();
        let sink = FailingSink {
            written: Vec::new(),
            budget: 40,
        };
        let mut b = PlainTableBuilder::new(sink, PlainTableOptions::default()).unwrap();

        let mut failed = false;
        for (key, value) in numbered_entries(10) {
            match b.add(&key, &value) {
                Ok(()) => {}
                Err(TableError::Io(_)) => {
                    failed = true;
                    break;
                }
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        assert!(failed, "sink budget should have been exceeded");
        assert!(matches!(b.add(b"zzz", b""), Err(TableError::Aborted)));
        assert!(matches!(b.finish(), Err(TableError::Aborted)));
    }

    /// # Scenario
    /// The sink fails while the trailer is written.
    ///
    /// # Expected behavior
    /// `finish` returns `Io` and later calls fail with `Aborted`.
    #[test]
    fn trailer_failure_aborts() {
        init_tracing();
        let sink = FailingSink {
            written: Vec::new(),
            budget: 30,
        };
        let mut b = PlainTableBuilder::new(sink, PlainTableOptions::default()).unwrap();
        b.add(b"a", b"1").unwrap();

        assert!(matches!(b.finish(), Err(TableError::Io(_))));
        assert!(matches!(b.finish(), Err(TableError::Aborted)));
    }

    /// # Scenario
    /// Drive the builder through the `TableBuilder` trait object.
    ///
    /// # Expected behavior
    /// Same results as the inherent methods.
    #[test]
    fn table_builder_trait_object() {
        init_tracing();
        let mut b = builder();
        let dyn_builder: &mut dyn TableBuilder = &mut b;
        dyn_builder.add(b"a", b"1").unwrap();
        dyn_builder.add(b"b", b"2").unwrap();
        assert_eq!(dyn_builder.num_entries(), 2);
        let props = dyn_builder.finish().unwrap();
        assert_eq!(props.file_size, dyn_builder.file_size());

        let reader = open_bytes(b.into_inner(), &PlainTableOptions::default()).unwrap();
        assert_eq!(reader.get(b"b").unwrap(), Some(b"2".as_slice()));
    }

    /// # Scenario
    /// Write a table through a `&mut Vec<u8>` sink.
    ///
    /// # Expected behavior
    /// The borrowed buffer holds a readable table after `finish`.
    #[test]
    fn borrowed_sink() {
        init_tracing();
        let mut buf = Vec::new();
        {
            let mut b = PlainTableBuilder::new(&mut buf, PlainTableOptions::default()).unwrap();
            b.add(b"x", b"1").unwrap();
            b.finish().unwrap();
        }
        let reader = open_bytes(buf, &PlainTableOptions::default()).unwrap();
        assert_eq!(reader.get(b"x").unwrap(), Some(b"1".as_slice()));
    }
}
