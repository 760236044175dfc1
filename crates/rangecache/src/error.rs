use std::io;

use rangecache_core::{CoreError, SourceError};
use thiserror::Error;

/// Result type used by `rangecache`.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors produced by the cache engine.
///
/// Notes:
/// - `Network` carries the source error verbatim; `SourceError::Eof` never escapes
///   `read`/`more` (it becomes a zero-length read / `MoreOutcome::Exhausted`).
/// - `Disk` and `Persist` failures during a cache fill are logged and swallowed by the
///   engine; they only surface from construction and `close`.
/// - `ExhaustedBudget` is an expected steady state of bounded caches.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("network error: {0}")]
    Network(#[from] SourceError),

    #[error("disk error: {0}")]
    Disk(#[from] io::Error),

    #[error("index encoding error: {0}")]
    Persist(#[from] serde_json::Error),

    #[error("eviction budget exhausted")]
    ExhaustedBudget,

    #[error("invalid seek position: {0}")]
    InvalidSeek(i128),

    #[error("stream length unknown")]
    UnknownLength,

    #[error("cache engine closed")]
    Closed,

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<CacheError> for io::Error {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Disk(e) | CacheError::Network(SourceError::Io(e)) => e,
            CacheError::Network(SourceError::Interrupted) => {
                io::Error::new(io::ErrorKind::Interrupted, "source interrupted")
            }
            CacheError::Network(SourceError::Timeout) => {
                io::Error::new(io::ErrorKind::TimedOut, "source timed out")
            }
            e @ CacheError::InvalidSeek(_) => io::Error::new(io::ErrorKind::InvalidInput, e),
            e @ CacheError::UnknownLength => io::Error::new(io::ErrorKind::Unsupported, e),
            e => io::Error::other(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::budget(CacheError::ExhaustedBudget, "eviction budget exhausted")]
    #[case::seek(CacheError::InvalidSeek(-4), "invalid seek position: -4")]
    #[case::length(CacheError::UnknownLength, "stream length unknown")]
    #[case::closed(CacheError::Closed, "cache engine closed")]
    #[case::network(CacheError::Network(SourceError::Timeout), "network error: timed out")]
    fn error_display(#[case] error: CacheError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::invalid_seek(CacheError::InvalidSeek(-1), io::ErrorKind::InvalidInput)]
    #[case::unknown(CacheError::UnknownLength, io::ErrorKind::Unsupported)]
    #[case::timeout(CacheError::Network(SourceError::Timeout), io::ErrorKind::TimedOut)]
    #[case::disk(CacheError::Disk(io::ErrorKind::NotFound.into()), io::ErrorKind::NotFound)]
    #[case::other(CacheError::ExhaustedBudget, io::ErrorKind::Other)]
    fn io_error_kind(#[case] error: CacheError, #[case] kind: io::ErrorKind) {
        assert_eq!(io::Error::from(error).kind(), kind);
    }

    #[test]
    fn cache_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CacheError>();
    }
}
