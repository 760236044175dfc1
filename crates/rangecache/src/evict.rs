//! Eviction policies: where a new cache entry goes once the file is under a size limit.
//!
//! The engine consults the policy at one point only, when a network fill is about to be
//! cached:
//! - [`EvictionPolicy::allow_extend`] may veto in-place growth of the entry abutting the fill;
//! - [`EvictionPolicy::place`] picks the physical slot for a new entry, reclaiming existing
//!   entries when needed, or refuses with [`CacheError::ExhaustedBudget`].

use std::fmt::Debug;

use crate::{
    entry::CacheEntry,
    error::{CacheError, CacheResult},
    index::EntryList,
};

pub const DEFAULT_RING_MAX_SIZE: u64 = 1024 * 1024 * 1024;
pub const DEFAULT_PREFETCH_CAP: u64 = 1024 * 1024 * 1024;
pub const DEFAULT_WATCHED_CAP: u64 = 128 * 1024 * 1024;

/// A pending fill, as seen by the policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FillRequest {
    /// Logical offset the fetched bytes will start at.
    pub start: u64,
    /// Consumer cursor (`logical_pos`) at the time of the fill.
    pub cursor: u64,
    /// Bytes the engine is about to fetch.
    pub wanted: u64,
    /// Read-ahead fill from [`more`](crate::CacheEngine::more) rather than a consumer read.
    pub prefetch: bool,
}

impl FillRequest {
    /// Bytes of this fill that land ahead of the consumer. Prefetched bytes always count,
    /// even when the fill starts at the cursor.
    fn incoming_ahead(&self) -> u64 {
        if self.prefetch || self.start > self.cursor {
            self.wanted
        } else {
            0
        }
    }
}

/// Physical placement of a new entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Append at the physical end of the file; the entry stays open.
    Append,
    /// Reuse the slots of `victims` (logical starts), which the engine drops from the
    /// index before writing. The new entry is closed at `capacity`.
    Reuse {
        physical_start: u64,
        capacity: u64,
        victims: Vec<u64>,
    },
}

impl Placement {
    fn reclaim(entry: &CacheEntry) -> Self {
        Self::Reuse {
            physical_start: entry.physical_start(),
            capacity: entry.slot_size(),
            victims: vec![entry.logical_start()],
        }
    }
}

pub trait EvictionPolicy: Send + Sync + Debug {
    /// May the entry at `idx` (ending exactly at `req.start`) grow by `req.wanted` bytes?
    fn allow_extend(&self, index: &EntryList, idx: usize, req: &FillRequest) -> bool;

    /// Choose where a new entry for `req` goes.
    fn place(&self, index: &EntryList, req: &FillRequest) -> CacheResult<Placement>;
}

/// Eviction configuration carried by [`CacheOptions`](crate::CacheOptions).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EvictionConfig {
    /// Grow the cache file without bound.
    #[default]
    Unbounded,
    /// Cap the cache file at `max_size` bytes, recycling the oldest entries.
    RingBounded { max_size: u64 },
    /// Separate budgets for unconsumed (prefetched) and consumed (watched) bytes.
    DualBudget { prefetch_cap: u64, watched_cap: u64 },
}

impl EvictionConfig {
    pub fn ring(max_size: u64) -> Self {
        Self::RingBounded { max_size }
    }

    pub fn dual(prefetch_cap: u64, watched_cap: u64) -> Self {
        Self::DualBudget {
            prefetch_cap,
            watched_cap,
        }
    }

    pub fn ring_default() -> Self {
        Self::ring(DEFAULT_RING_MAX_SIZE)
    }

    pub fn dual_default() -> Self {
        Self::dual(DEFAULT_PREFETCH_CAP, DEFAULT_WATCHED_CAP)
    }

    pub fn build(&self) -> Box<dyn EvictionPolicy> {
        match *self {
            Self::Unbounded => Box::new(Unbounded),
            Self::RingBounded { max_size } => Box::new(RingBounded { max_size }),
            Self::DualBudget {
                prefetch_cap,
                watched_cap,
            } => Box::new(DualBudget {
                prefetch_cap,
                watched_cap,
            }),
        }
    }
}

#[derive(Debug)]
pub struct Unbounded;

impl EvictionPolicy for Unbounded {
    fn allow_extend(&self, _index: &EntryList, _idx: usize, _req: &FillRequest) -> bool {
        true
    }

    fn place(&self, _index: &EntryList, _req: &FillRequest) -> CacheResult<Placement> {
        Ok(Placement::Append)
    }
}

/// Ring buffer over a fixed-size file.
///
/// While the physical extent is below `max_size` entries are appended and the tail grows.
/// Past it, the logically first entry's slot is recycled; if that slot is smaller than the
/// incoming fill and the next-oldest entry sits right behind it physically, both are merged
/// into one slot so a seek-produced sliver does not become a tiny entry.
#[derive(Debug)]
pub struct RingBounded {
    max_size: u64,
}

impl EvictionPolicy for RingBounded {
    fn allow_extend(&self, index: &EntryList, idx: usize, _req: &FillRequest) -> bool {
        index.get(idx).is_some_and(CacheEntry::is_closed) || index.physical_extent() < self.max_size
    }

    fn place(&self, index: &EntryList, req: &FillRequest) -> CacheResult<Placement> {
        if index.physical_extent() < self.max_size {
            return Ok(Placement::Append);
        }
        let Some(first) = index.first() else {
            return Ok(Placement::Append);
        };

        let mut capacity = first.slot_size();
        let mut victims = vec![first.logical_start()];
        if capacity < req.wanted
            && let Some(second) = index.get(1)
            && second.physical_start() == first.reserved_end()
        {
            capacity += second.slot_size();
            victims.push(second.logical_start());
        }
        Ok(Placement::Reuse {
            physical_start: first.physical_start(),
            capacity,
            victims,
        })
    }
}

/// Two budgets split at the consumer cursor.
///
/// - prefetched bytes (at or after the cursor) plus an incoming read-ahead fill must stay
///   within `prefetch_cap`; past it the logically last entry is recycled if it lies beyond
///   the fill, else the fill is refused;
/// - consumed bytes (before the cursor) beyond `watched_cap` recycle the oldest entry, as
///   long as it lies entirely behind the cursor.
#[derive(Debug)]
pub struct DualBudget {
    prefetch_cap: u64,
    watched_cap: u64,
}

impl EvictionPolicy for DualBudget {
    fn allow_extend(&self, index: &EntryList, _idx: usize, req: &FillRequest) -> bool {
        index.bytes_ahead(req.cursor) + req.incoming_ahead() <= self.prefetch_cap
    }

    fn place(&self, index: &EntryList, req: &FillRequest) -> CacheResult<Placement> {
        let ahead = index.bytes_ahead(req.cursor);
        if ahead + req.incoming_ahead() > self.prefetch_cap {
            let Some(last) = index.last().filter(|l| l.logical_start() > req.start) else {
                return Err(CacheError::ExhaustedBudget);
            };
            let last_ahead = last
                .logical_end()
                .saturating_sub(last.logical_start().max(req.cursor));
            let after =
                ahead.saturating_sub(last_ahead) + req.incoming_ahead().min(last.slot_size());
            if after > self.prefetch_cap {
                return Err(CacheError::ExhaustedBudget);
            }
            return Ok(Placement::reclaim(last));
        }

        if index.bytes_behind(req.cursor) > self.watched_cap
            && let Some(first) = index.first().filter(|f| f.logical_end() <= req.cursor)
        {
            return Ok(Placement::reclaim(first));
        }
        Ok(Placement::Append)
    }
}
