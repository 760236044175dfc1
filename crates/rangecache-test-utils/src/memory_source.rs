//! In-memory `DownloadSource` with call accounting for cache tests.

use std::{
    io::SeekFrom,
    ops::Range,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use rangecache_core::{DownloadSource, SourceError, SourceResult};

#[derive(Default)]
struct ProbeState {
    reads: AtomicUsize,
    seeks: AtomicUsize,
    size_calls: AtomicUsize,
    closed: AtomicBool,
    fetched: Mutex<Vec<Range<u64>>>,
}

/// Shared view of what a [`MemorySource`] has been asked to do.
///
/// Cloned before the source is moved into an engine, then inspected afterwards.
#[derive(Clone, Default)]
pub struct SourceProbe {
    state: Arc<ProbeState>,
}

impl SourceProbe {
    /// Number of `read` calls (including ones that returned EOF or failed).
    pub fn reads(&self) -> usize {
        self.state.reads.load(Ordering::SeqCst)
    }

    pub fn seeks(&self) -> usize {
        self.state.seeks.load(Ordering::SeqCst)
    }

    pub fn size_calls(&self) -> usize {
        self.state.size_calls.load(Ordering::SeqCst)
    }

    /// Total network round trips (`read` + `seek` + `size`).
    pub fn calls(&self) -> usize {
        self.reads() + self.seeks() + self.size_calls()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Byte ranges delivered by successful reads, in call order.
    pub fn fetched(&self) -> Vec<Range<u64>> {
        self.state.fetched.lock().unwrap().clone()
    }

    pub fn bytes_fetched(&self) -> u64 {
        self.fetched().iter().map(|r| r.end - r.start).sum()
    }
}

/// Remote-stream stand-in backed by a byte vector.
///
/// Knobs cover the behaviours the cache has to cope with: short reads, unknown length,
/// failing seeks/reads, and zero-vs-sentinel end of stream.
pub struct MemorySource {
    data: Vec<u8>,
    pos: u64,
    max_chunk: Option<usize>,
    report_size: bool,
    seek_end: bool,
    zero_on_eof: bool,
    failing_seeks: usize,
    failing_read_at: Option<u64>,
    probe: SourceProbe,
}

impl MemorySource {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            max_chunk: None,
            report_size: true,
            seek_end: true,
            zero_on_eof: false,
            failing_seeks: 0,
            failing_read_at: None,
            probe: SourceProbe::default(),
        }
    }

    /// Every `read` returns at most `n` bytes.
    #[must_use]
    pub fn with_max_chunk(mut self, n: usize) -> Self {
        self.max_chunk = Some(n.max(1));
        self
    }

    /// `size()` reports nothing and `SeekFrom::End` is rejected.
    #[must_use]
    pub fn with_unknown_len(mut self) -> Self {
        self.report_size = false;
        self.seek_end = false;
        self
    }

    /// `size()` reports nothing but `SeekFrom::End` still works.
    #[must_use]
    pub fn with_hidden_size(mut self) -> Self {
        self.report_size = false;
        self
    }

    /// End of stream is signalled with `Ok(0)` instead of `SourceError::Eof`.
    #[must_use]
    pub fn with_zero_on_eof(mut self) -> Self {
        self.zero_on_eof = true;
        self
    }

    /// The next `n` seeks fail.
    #[must_use]
    pub fn with_failing_seeks(mut self, n: usize) -> Self {
        self.failing_seeks = n;
        self
    }

    /// Any read starting at `offset` fails.
    #[must_use]
    pub fn with_failing_read_at(mut self, offset: u64) -> Self {
        self.failing_read_at = Some(offset);
        self
    }

    #[must_use]
    pub fn probe(&self) -> SourceProbe {
        self.probe.clone()
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

impl DownloadSource for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> SourceResult<usize> {
        self.probe.state.reads.fetch_add(1, Ordering::SeqCst);

        if self.failing_read_at == Some(self.pos) {
            return Err(SourceError::Failed(format!("read refused at {}", self.pos)));
        }
        if self.pos >= self.len() {
            return if self.zero_on_eof {
                Ok(0)
            } else {
                Err(SourceError::Eof)
            };
        }

        let offset = self.pos as usize;
        let mut n = buf.len().min(self.data.len() - offset);
        if let Some(max) = self.max_chunk {
            n = n.min(max);
        }
        buf[..n].copy_from_slice(&self.data[offset..offset + n]);

        let start = self.pos;
        self.pos += n as u64;
        if n > 0 {
            self.probe
                .state
                .fetched
                .lock()
                .unwrap()
                .push(start..self.pos);
        }
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> SourceResult<u64> {
        self.probe.state.seeks.fetch_add(1, Ordering::SeqCst);

        if self.failing_seeks > 0 {
            self.failing_seeks -= 1;
            return Err(SourceError::Failed("seek refused".to_string()));
        }

        let target: i128 = match pos {
            SeekFrom::Start(p) => i128::from(p),
            SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
            SeekFrom::End(delta) => {
                if !self.seek_end {
                    return Err(SourceError::Unsupported("seek from end"));
                }
                i128::from(self.len()) + i128::from(delta)
            }
        };
        if target < 0 {
            return Err(SourceError::Failed(format!("negative seek {target}")));
        }

        self.pos = target as u64;
        Ok(self.pos)
    }

    fn size(&mut self) -> Option<u64> {
        self.probe.state.size_calls.fetch_add(1, Ordering::SeqCst);
        self.report_size.then(|| self.len())
    }

    fn close(&mut self) {
        self.probe.state.closed.store(true, Ordering::SeqCst);
    }
}
