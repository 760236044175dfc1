#![expect(
    clippy::unwrap_used,
    reason = "integration test crate — unwraps are acceptable in test code"
)]

use std::io::{Read, SeekFrom};

use rangecache::{CacheEngine, CacheKey, CacheLayout, CacheOptions};
use rangecache_test_utils::{MemorySource, patterned_bytes, temp_dir};
use rstest::rstest;
use tempfile::TempDir;

const URL: &str = "https://Media.Example.com:443/show/s01e01.mkv?b=2&a=1#t=30";
const SAME_URL: &str = "https://media.example.com/show/s01e01.mkv?a=1&b=2";

fn retained(dir: &TempDir) -> CacheOptions {
    CacheOptions::new(dir.path())
        .with_buffer_size(100)
        .with_retain(true)
}

fn index_path(dir: &TempDir) -> std::path::PathBuf {
    CacheLayout::new(dir.path()).index_path(&CacheKey::from_identifier(URL).unwrap())
}

#[rstest]
fn retained_cache_survives_reopen(temp_dir: TempDir) {
    let data = patterned_bytes(1000);
    {
        let mut engine =
            CacheEngine::open(retained(&temp_dir), URL, MemorySource::new(data.clone())).unwrap();
        let mut out = Vec::new();
        engine.read_to_end(&mut out).unwrap();
        engine.close().unwrap();
    }
    assert!(index_path(&temp_dir).exists());

    let source = MemorySource::new(data.clone());
    let probe = source.probe();
    let mut engine = CacheEngine::open(retained(&temp_dir), SAME_URL, source).unwrap();
    assert!(engine.is_eof());
    assert_eq!(engine.known_end(), 1000);
    assert_eq!(engine.size().unwrap(), 1000);

    let mut out = Vec::new();
    engine.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
    assert_eq!(probe.calls(), 0);
}

#[rstest]
fn partial_cache_resumes_from_network(temp_dir: TempDir) {
    let data = patterned_bytes(1000);
    {
        let mut engine =
            CacheEngine::open(retained(&temp_dir), URL, MemorySource::new(data.clone())).unwrap();
        let mut buf = [0u8; 100];
        engine.read(&mut buf).unwrap();
        engine.seek(SeekFrom::Start(600)).unwrap();
        engine.read(&mut buf).unwrap();
    }

    let source = MemorySource::new(data.clone());
    let probe = source.probe();
    let mut engine = CacheEngine::open(retained(&temp_dir), URL, source).unwrap();
    assert!(!engine.is_eof());
    assert_eq!(engine.entries().len(), 2);

    let mut out = Vec::new();
    engine.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
    assert_eq!(probe.bytes_fetched(), 800);
}

#[rstest]
fn index_is_written_on_every_fill(temp_dir: TempDir) {
    let mut engine = CacheEngine::open(
        retained(&temp_dir),
        URL,
        MemorySource::new(patterned_bytes(1000)),
    )
    .unwrap();
    let mut buf = [0u8; 100];
    engine.read(&mut buf).unwrap();

    let json = std::fs::read_to_string(index_path(&temp_dir)).unwrap();
    assert!(json.contains("\"version\":1"));
    assert!(json.contains("\"len\":100"));
}

#[rstest]
#[case::garbage(b"{{{{".as_slice())]
#[case::overlapping(
    br#"{"version":1,"entries":[
        {"logical_start":0,"physical_start":0,"len":100,"capacity":null},
        {"logical_start":50,"physical_start":100,"len":100,"capacity":null}]}"#
        .as_slice()
)]
fn unusable_index_starts_empty(temp_dir: TempDir, #[case] contents: &[u8]) {
    {
        let mut engine = CacheEngine::open(
            retained(&temp_dir),
            URL,
            MemorySource::new(patterned_bytes(1000)),
        )
        .unwrap();
        let mut buf = [0u8; 200];
        engine.read(&mut buf).unwrap();
        engine.read(&mut buf).unwrap();
    }
    std::fs::write(index_path(&temp_dir), contents).unwrap();

    let source = MemorySource::new(patterned_bytes(1000));
    let probe = source.probe();
    let mut engine = CacheEngine::open(retained(&temp_dir), URL, source).unwrap();
    assert!(engine.entries().is_empty());

    let mut buf = [0u8; 10];
    engine.read(&mut buf).unwrap();
    assert_eq!(probe.reads(), 1);
}

#[rstest]
fn entries_past_truncated_file_are_dropped(temp_dir: TempDir) {
    let data = patterned_bytes(1000);
    let data_path = {
        let mut engine =
            CacheEngine::open(retained(&temp_dir), URL, MemorySource::new(data.clone())).unwrap();
        let mut buf = [0u8; 100];
        engine.read(&mut buf).unwrap();
        engine.seek(SeekFrom::Start(500)).unwrap();
        engine.read(&mut buf).unwrap();
        engine.data_path().to_path_buf()
    };
    std::fs::OpenOptions::new()
        .write(true)
        .open(&data_path)
        .unwrap()
        .set_len(150)
        .unwrap();

    let mut engine =
        CacheEngine::open(retained(&temp_dir), URL, MemorySource::new(data.clone())).unwrap();
    assert_eq!(engine.entries().len(), 1);
    assert_eq!(engine.entries()[0].logical_range(), 0..100);

    engine.seek(SeekFrom::Start(500)).unwrap();
    let mut buf = [0u8; 100];
    engine.read(&mut buf).unwrap();
    assert_eq!(&buf[..], &data[500..600]);
}

#[rstest]
fn transient_open_discards_previous_cache(temp_dir: TempDir) {
    {
        let mut engine = CacheEngine::open(
            retained(&temp_dir),
            URL,
            MemorySource::new(patterned_bytes(1000)),
        )
        .unwrap();
        let mut buf = [0u8; 100];
        engine.read(&mut buf).unwrap();
    }
    assert!(index_path(&temp_dir).exists());

    let options = CacheOptions::new(temp_dir.path()).with_buffer_size(100);
    let mut engine =
        CacheEngine::open(options, URL, MemorySource::new(patterned_bytes(1000))).unwrap();
    assert!(engine.entries().is_empty());
    assert!(!index_path(&temp_dir).exists());

    let mut buf = [0u8; 100];
    engine.read(&mut buf).unwrap();
    assert!(!index_path(&temp_dir).exists(), "transient caches are never persisted");
    let data_path = engine.data_path().to_path_buf();
    drop(engine);
    assert!(!data_path.exists());
}
