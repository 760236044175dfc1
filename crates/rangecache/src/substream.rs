//! Independent child caches opened alongside a primary stream (e.g. external subtitles
//! or a separate audio rendition).

use rangecache_core::{CacheKey, DownloadSource};
use tracing::debug;

use crate::{engine::CacheEngine, error::CacheResult};

/// A child engine. Its source is boxed so children of one parent may differ in type.
pub type SubStream = CacheEngine<Box<dyn DownloadSource>>;

/// Handle to a child returned by [`CacheEngine::open_sub_stream`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubStreamId(usize);

impl SubStreamId {
    pub fn ordinal(self) -> usize {
        self.0
    }
}

impl<S: DownloadSource> CacheEngine<S> {
    /// Open a child cache with its own file, index and source.
    ///
    /// Children are never shared: the cache key mixes in the child's ordinal, so opening
    /// the same identifier twice yields two distinct cache files. A child never marks
    /// end of stream from its own network reads.
    pub fn open_sub_stream<C>(&mut self, identifier: &str, source: C) -> CacheResult<SubStreamId>
    where
        C: DownloadSource + 'static,
    {
        self.ensure_open()?;
        let ordinal = self.sub_streams.len();
        let key = self
            .key
            .child(&CacheKey::from_identifier(identifier)?, ordinal);
        let source: Box<dyn DownloadSource> = Box::new(source);
        let child = SubStream::open_with_key(self.options.clone(), key, source, false)?;
        debug!(parent = ?self.key, child = ?child.key, ordinal, "sub-stream opened");
        self.sub_streams.push(child);
        Ok(SubStreamId(ordinal))
    }

    pub fn sub_stream(&self, id: SubStreamId) -> Option<&SubStream> {
        self.sub_streams.get(id.0)
    }

    pub fn sub_stream_mut(&mut self, id: SubStreamId) -> Option<&mut SubStream> {
        self.sub_streams.get_mut(id.0)
    }

    pub fn sub_stream_count(&self) -> usize {
        self.sub_streams.len()
    }
}
