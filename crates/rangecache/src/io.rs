//! `std::io` adapters so demuxers can consume the cache as a plain reader.

use std::io::{self, Read, Seek, SeekFrom};

use rangecache_core::DownloadSource;

use crate::engine::CacheEngine;

impl<S: DownloadSource> Read for CacheEngine<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        CacheEngine::read(self, buf).map_err(io::Error::from)
    }
}

impl<S: DownloadSource> Seek for CacheEngine<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        CacheEngine::seek(self, pos).map_err(io::Error::from)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position())
    }
}
