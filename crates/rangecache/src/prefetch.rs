//! Read-ahead: pull bytes past the consumer cursor into the cache.

use std::io::SeekFrom;

use rangecache_core::DownloadSource;
use tracing::{debug, trace};

use crate::{
    engine::CacheEngine,
    error::{CacheError, CacheResult},
};

/// Result of one [`CacheEngine::more`] step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoreOutcome {
    /// This many bytes were fetched and cached.
    Loaded(usize),
    /// The network cursor was moved to the first uncached byte; nothing was fetched.
    CaughtUp,
    /// The stream end is cached (or reached); nothing left to prefetch.
    Exhausted,
    /// The eviction policy refused to admit more bytes.
    BudgetExhausted,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadaheadStop {
    WindowFilled,
    Exhausted,
    BudgetExhausted,
    #[default]
    StepLimit,
}

/// Summary of a [`CacheEngine::fill_readahead`] run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadaheadReport {
    pub steps: usize,
    pub bytes_loaded: u64,
    pub stop: ReadaheadStop,
}

impl<S: DownloadSource> CacheEngine<S> {
    /// Bytes cached contiguously ahead of the cursor.
    pub fn loaded_size(&self) -> u64 {
        self.readahead_pos.saturating_sub(self.logical_pos)
    }

    /// Fetch one transfer buffer at the first uncached byte after the cursor.
    pub fn more(&mut self) -> CacheResult<MoreOutcome> {
        self.ensure_open()?;

        let gap = match self.index.find_containing(self.logical_pos) {
            Some(idx) => self.index.contiguous_end(idx),
            None => self.logical_pos,
        };
        if self.network_pos != gap {
            let pos = self.seek_source(SeekFrom::Start(gap))?;
            debug!(gap, pos, "prefetch caught up with cached data");
            self.refresh_readahead();
            return Ok(MoreOutcome::CaughtUp);
        }

        if self.eof && self.network_pos >= self.known_end {
            return Ok(MoreOutcome::Exhausted);
        }
        let wanted = self.clamp_fetch(self.network_pos, self.buffer_size() as u64) as usize;
        if wanted == 0 {
            return Ok(MoreOutcome::Exhausted);
        }

        let mut scratch = self.take_scratch();
        let result = self.fill(&mut scratch[..wanted], true);
        self.scratch = scratch;

        match result {
            Ok(0) => Ok(MoreOutcome::Exhausted),
            Ok(n) => {
                trace!(pos = self.network_pos, n, "prefetched");
                Ok(MoreOutcome::Loaded(n))
            }
            Err(CacheError::ExhaustedBudget) => {
                debug!(pos = self.network_pos, "prefetch budget exhausted");
                Ok(MoreOutcome::BudgetExhausted)
            }
            Err(e) => Err(e),
        }
    }

    /// Call [`more`](Self::more) until `window` bytes are loaded ahead of the cursor, the
    /// stream or budget is exhausted, or `max_steps` calls were made.
    pub fn fill_readahead(&mut self, window: u64, max_steps: usize) -> CacheResult<ReadaheadReport> {
        let mut report = ReadaheadReport::default();
        while report.steps < max_steps {
            if self.loaded_size() >= window {
                report.stop = ReadaheadStop::WindowFilled;
                return Ok(report);
            }
            report.steps += 1;
            match self.more()? {
                MoreOutcome::Loaded(n) => report.bytes_loaded += n as u64,
                MoreOutcome::CaughtUp => {}
                MoreOutcome::Exhausted => {
                    report.stop = ReadaheadStop::Exhausted;
                    return Ok(report);
                }
                MoreOutcome::BudgetExhausted => {
                    report.stop = ReadaheadStop::BudgetExhausted;
                    return Ok(report);
                }
            }
        }
        if self.loaded_size() >= window {
            report.stop = ReadaheadStop::WindowFilled;
        }
        Ok(report)
    }
}
