use std::{
    io::{self, Read, Seek, SeekFrom},
    sync::Arc,
};

use parking_lot::{Mutex, MutexGuard};
use rangecache_core::DownloadSource;

use crate::{
    engine::{CacheEngine, CacheStats},
    error::CacheResult,
    options::CacheOptions,
    prefetch::{MoreOutcome, ReadaheadReport},
};

/// Cloneable, lockable handle to one [`CacheEngine`].
///
/// Lets a demuxer thread and a prefetch scheduler drive the same cache; every call holds
/// the lock for its whole duration, so network I/O of one caller blocks the other.
pub struct SharedCacheEngine<S: DownloadSource> {
    inner: Arc<Mutex<CacheEngine<S>>>,
}

impl<S: DownloadSource> Clone for SharedCacheEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: DownloadSource> SharedCacheEngine<S> {
    pub fn new(engine: CacheEngine<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn open(options: CacheOptions, identifier: &str, source: S) -> CacheResult<Self> {
        CacheEngine::open(options, identifier, source).map(Self::new)
    }

    /// Lock for a sequence of operations that must not interleave with other handles.
    pub fn lock(&self) -> MutexGuard<'_, CacheEngine<S>> {
        self.inner.lock()
    }

    pub fn read(&self, buf: &mut [u8]) -> CacheResult<usize> {
        self.inner.lock().read(buf)
    }

    pub fn seek(&self, pos: SeekFrom) -> CacheResult<u64> {
        self.inner.lock().seek(pos)
    }

    pub fn size(&self) -> CacheResult<u64> {
        self.inner.lock().size()
    }

    pub fn more(&self) -> CacheResult<MoreOutcome> {
        self.inner.lock().more()
    }

    pub fn fill_readahead(&self, window: u64, max_steps: usize) -> CacheResult<ReadaheadReport> {
        self.inner.lock().fill_readahead(window, max_steps)
    }

    pub fn loaded_size(&self) -> u64 {
        self.inner.lock().loaded_size()
    }

    pub fn position(&self) -> u64 {
        self.inner.lock().position()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }

    pub fn close(&self) -> CacheResult<()> {
        self.inner.lock().close()
    }
}

impl<S: DownloadSource> Read for SharedCacheEngine<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        SharedCacheEngine::read(self, buf).map_err(io::Error::from)
    }
}

impl<S: DownloadSource> Seek for SharedCacheEngine<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        SharedCacheEngine::seek(self, pos).map_err(io::Error::from)
    }
}
