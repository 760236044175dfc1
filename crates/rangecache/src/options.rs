use std::path::PathBuf;

use crate::evict::EvictionConfig;

/// Default transfer buffer: the largest single network fetch.
pub const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;

/// Construction parameters of a [`CacheEngine`](crate::CacheEngine).
#[derive(Clone, Debug)]
pub struct CacheOptions {
    /// Directory holding cache files and persisted indexes.
    pub cache_dir: PathBuf,
    /// Upper bound on one network fetch, also the read-through window for forward seeks.
    pub buffer_size: usize,
    /// Keep cache file and index after close (and reuse them on the next open).
    pub retain: bool,
    pub eviction: EvictionConfig,
    /// Retry short source reads until a fetch is satisfied.
    pub read_complete: bool,
    /// Drop everything cached when a size probe first learns the stream length.
    pub discard_on_size_probe: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("rangecache"),
            buffer_size: DEFAULT_BUFFER_SIZE,
            retain: false,
            eviction: EvictionConfig::default(),
            read_complete: true,
            discard_on_size_probe: false,
        }
    }
}

impl CacheOptions {
    pub fn new<P: Into<PathBuf>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    /// Set the transfer buffer size. Zero is raised to one byte.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn with_eviction(mut self, eviction: EvictionConfig) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn with_read_complete(mut self, read_complete: bool) -> Self {
        self.read_complete = read_complete;
        self
    }

    pub fn with_discard_on_size_probe(mut self, discard: bool) -> Self {
        self.discard_on_size_probe = discard;
        self
    }
}
