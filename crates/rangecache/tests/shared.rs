#![expect(
    clippy::unwrap_used,
    reason = "integration test crate — unwraps are acceptable in test code"
)]

use std::{
    io::{Read, Seek, SeekFrom},
    thread,
    time::Duration,
};

use rangecache::{CacheOptions, MoreOutcome, SharedCacheEngine};
use rangecache_test_utils::{MemorySource, patterned_bytes, temp_dir};
use rstest::rstest;
use tempfile::TempDir;

const URL: &str = "https://media.example.com/concert.flac";

#[rstest]
#[timeout(Duration::from_secs(10))]
fn reader_and_prefetcher_share_one_cache(temp_dir: TempDir) {
    let data = patterned_bytes(200_000);
    let source = MemorySource::new(data.clone()).with_max_chunk(700);
    let probe = source.probe();
    let options = CacheOptions::new(temp_dir.path()).with_buffer_size(4096);
    let shared = SharedCacheEngine::open(options, URL, source).unwrap();

    let prefetcher = {
        let shared = shared.clone();
        thread::spawn(move || {
            loop {
                match shared.more().unwrap() {
                    MoreOutcome::Exhausted | MoreOutcome::BudgetExhausted => break,
                    MoreOutcome::Loaded(_) | MoreOutcome::CaughtUp => thread::yield_now(),
                }
            }
        })
    };

    let mut reader = shared.clone();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    prefetcher.join().unwrap();

    assert_eq!(out.len(), data.len());
    assert!(out == data);
    assert!(shared.lock().is_eof());
    assert_eq!(probe.bytes_fetched() as usize, data.len());
    shared.lock().index().validate().unwrap();
}

#[rstest]
fn handles_share_cursor(temp_dir: TempDir) {
    let options = CacheOptions::new(temp_dir.path()).with_buffer_size(100);
    let mut a =
        SharedCacheEngine::open(options, URL, MemorySource::new(patterned_bytes(1000))).unwrap();
    let b = a.clone();

    Seek::seek(&mut a, SeekFrom::Start(40)).unwrap();
    assert_eq!(b.position(), 40);
    let mut buf = [0u8; 10];
    b.read(&mut buf).unwrap();
    assert_eq!(a.position(), 50);
    assert_eq!(b.size().unwrap(), 1000);
    assert_eq!(a.stats().entries, 1);

    b.close().unwrap();
    assert!(a.lock().is_closed());
}
