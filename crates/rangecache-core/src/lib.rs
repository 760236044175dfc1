#![forbid(unsafe_code)]

//! `rangecache-core`
//!
//! Shared vocabulary for the rangecache workspace:
//! - [`CacheKey`]: stable hash of a stream identifier, used to name cache files
//! - [`DownloadSource`]: the capability the cache engine consumes from the network layer

mod cache_key;
mod canonicalization;
mod errors;
mod source;

pub use cache_key::CacheKey;
pub use canonicalization::canonicalize_identifier;
pub use errors::{CoreError, CoreResult};
pub use source::{DownloadSource, SourceError, SourceResult};
