#![forbid(unsafe_code)]

//! # rangecache
//!
//! Disk-backed, range-aware read cache between a media demuxer and a remote byte source.
//!
//! A [`CacheEngine`] owns one cache file and a sparse [`EntryList`] mapping logical stream
//! ranges to physical file ranges. Reads are served from disk when cached and fetched
//! through the [`DownloadSource`](rangecache_core::DownloadSource) otherwise; every fetch
//! is written to the cache. [`CacheEngine::more`] prefetches ahead of the cursor, and an
//! [`EvictionConfig`] bounds the cache file.
//!
//! ```no_run
//! use std::io::Read;
//!
//! # fn demo<S: rangecache_core::DownloadSource>(source: S) -> Result<(), Box<dyn std::error::Error>> {
//! use rangecache::{CacheEngine, CacheOptions, EvictionConfig};
//!
//! let options = CacheOptions::new("/tmp/rangecache").with_eviction(EvictionConfig::ring_default());
//! let mut engine = CacheEngine::open(options, "https://example.com/movie.mkv", source)?;
//! let mut header = [0u8; 4096];
//! engine.read_exact(&mut header)?;
//! # Ok(())
//! # }
//! ```

mod cache_file;
mod engine;
mod entry;
mod error;
mod evict;
mod index;
mod io;
mod layout;
mod options;
mod persist;
mod prefetch;
mod shared;
mod substream;

pub use engine::{CacheEngine, CacheStats};
pub use entry::{CacheEntry, MAX_ENTRY_SIZE};
pub use error::{CacheError, CacheResult};
pub use evict::{
    DEFAULT_PREFETCH_CAP, DEFAULT_RING_MAX_SIZE, DEFAULT_WATCHED_CAP, DualBudget, EvictionConfig,
    EvictionPolicy, FillRequest, Placement, RingBounded, Unbounded,
};
pub use index::{EntryList, IndexError};
pub use layout::CacheLayout;
pub use options::{CacheOptions, DEFAULT_BUFFER_SIZE};
pub use prefetch::{MoreOutcome, ReadaheadReport, ReadaheadStop};
pub use rangecache_core::{CacheKey, DownloadSource, SourceError, SourceResult};
pub use shared::SharedCacheEngine;
pub use substream::{SubStream, SubStreamId};
