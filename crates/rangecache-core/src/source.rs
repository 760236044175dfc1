use std::io::SeekFrom;

use thiserror::Error;

/// Errors reported by a [`DownloadSource`].
///
/// `Eof` is the end-of-stream sentinel and is not a failure: the cache engine uses it to
/// learn the stream length. Everything else is surfaced to the consumer unchanged.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("end of stream")]
    Eof,

    #[error("operation interrupted")]
    Interrupted,

    #[error("timed out")]
    Timeout,

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("source failed: {0}")]
    Failed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Blocking byte source behind the cache (typically a network connection).
///
/// Normative:
/// - `read` returns the number of bytes read; it may return fewer than requested even when
///   more data is available. `Ok(0)` and `Err(SourceError::Eof)` both mean end of stream.
/// - `seek` returns the new absolute position. `SeekFrom::End` is only meaningful when the
///   source knows its length.
/// - `size` returns the total length if the source can report it.
/// - A blocked call returns control through the source's own timeout/interrupt handling;
///   the cache never cancels it.
pub trait DownloadSource: Send {
    fn read(&mut self, buf: &mut [u8]) -> SourceResult<usize>;

    fn seek(&mut self, pos: SeekFrom) -> SourceResult<u64>;

    fn size(&mut self) -> Option<u64>;

    /// Release the underlying connection. Called once, when the owning engine closes.
    fn close(&mut self) {}
}

impl<S: DownloadSource + ?Sized> DownloadSource for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> SourceResult<usize> {
        (**self).read(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> SourceResult<u64> {
        (**self).seek(pos)
    }

    fn size(&mut self) -> Option<u64> {
        (**self).size()
    }

    fn close(&mut self) {
        (**self).close();
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::eof(SourceError::Eof, "end of stream")]
    #[case::interrupted(SourceError::Interrupted, "operation interrupted")]
    #[case::timeout(SourceError::Timeout, "timed out")]
    #[case::unsupported(SourceError::Unsupported("seek"), "operation not supported: seek")]
    #[case::failed(SourceError::Failed("503".into()), "source failed: 503")]
    fn error_display(#[case] error: SourceError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn only_eof_is_eof() {
        assert!(SourceError::Eof.is_eof());
        assert!(!SourceError::Timeout.is_eof());
        assert!(!SourceError::Io(std::io::Error::other("x")).is_eof());
    }

    #[test]
    fn source_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SourceError>();
    }
}
