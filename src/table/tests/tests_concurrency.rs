//! A single reader shared across threads.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::TempDir;

    use crate::table::PlainTableReader;
    use crate::table::tests::helpers::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn reader_is_send_and_sync() {
        assert_send_sync::<PlainTableReader>();
        assert_send_sync::<PlainTableReader<Vec<u8>>>();
    }

    /// # Scenario
    /// Eight threads share one `Arc<PlainTableReader>` over a mapped file
    /// and issue random lookups (seeded per thread) while others scan.
    ///
    /// # Expected behavior
    /// Every lookup returns the stored value and every scan sees all entries.
    #[test]
    fn concurrent_gets_and_scans() {
        init_tracing();
        let tmp = TempDir::new().unwrap();
        let options = with_filter(10);
        let entries = numbered_entries(2_000);
        let (path, _) = build_file(tmp.path(), "shared.plain", &entries, &options);
        let reader = Arc::new(PlainTableReader::open(&path, options).unwrap());

        crossbeam::scope(|s| {
            for t in 0..6u64 {
                let reader = Arc::clone(&reader);
                s.spawn(move |_| {
                    let mut rng = StdRng::seed_from_u64(t);
                    for _ in 0..2_000 {
                        let i = rng.random_range(0..2_500u32);
                        let got = reader.get(&numbered_key(i)).unwrap();
                        if i < 2_000 {
                            assert_eq!(got, Some(numbered_value(i).as_slice()));
                        } else {
                            assert_eq!(got, None);
                        }
                    }
                });
            }
            for _ in 0..2 {
                let reader = Arc::clone(&reader);
                s.spawn(move |_| {
                    for _ in 0..5 {
                        assert_eq!(reader.iter().filter(|e| e.is_ok()).count(), 2_000);
                    }
                });
            }
        })
        .unwrap();
    }

    /// # Scenario
    /// Threads borrow the reader directly inside a scope, without `Arc`.
    ///
    /// # Expected behavior
    /// Each thread sees its own slice of keys.
    #[test]
    fn scoped_borrowed_reader() {
        init_tracing();
        let options = single_bucket();
        let entries = numbered_entries(400);
        let reader = open_bytes(build_bytes(&entries, &options), &options).unwrap();
        let reader = &reader;

        crossbeam::scope(|s| {
            for t in 0..4u32 {
                s.spawn(move |_| {
                    for i in (t * 100)..((t + 1) * 100) {
                        assert_eq!(
                            reader.get(&numbered_key(i)).unwrap(),
                            Some(numbered_value(i).as_slice())
                        );
                    }
                });
            }
        })
        .unwrap();
    }
}
