//! Sparse interval index over one logical stream.
//!
//! [`EntryList`] maps logical byte ranges to physical cache-file ranges.
//!
//! ## Invariants
//! - entries are sorted by `logical_start` ascending
//! - logical ranges never overlap (gaps are not-yet-cached data)
//! - reserved physical regions `[physical_start, physical_start + slot_size)` never overlap,
//!   which implies the data ranges never overlap either
//! - no entry is empty

use std::ops::Range;

use rangemap::RangeSet;
use thiserror::Error;
use tracing::warn;

use crate::entry::CacheEntry;

/// Invariant violation found by [`EntryList::validate`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("entry at logical {0} is empty")]
    EmptyEntry(u64),

    #[error("entries not sorted: {prev} before {next}")]
    Unsorted { prev: u64, next: u64 },

    #[error("logical ranges overlap: {first:?} and {second:?}")]
    LogicalOverlap { first: Range<u64>, second: Range<u64> },

    #[error("physical regions overlap: {first:?} and {second:?}")]
    PhysicalOverlap { first: Range<u64>, second: Range<u64> },
}

#[derive(Clone, Debug, Default)]
pub struct EntryList {
    entries: Vec<CacheEntry>,
}

impl EntryList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index from persisted records.
    ///
    /// Records pointing past `file_len` (data lost after an unclean shutdown) are dropped;
    /// anything that still violates the invariants rejects the whole set.
    pub fn restore(mut entries: Vec<CacheEntry>, file_len: u64) -> Result<Self, IndexError> {
        let before = entries.len();
        entries.retain(|e| !e.is_empty() && e.physical_range().end <= file_len);
        if entries.len() != before {
            warn!(
                dropped = before - entries.len(),
                file_len, "persisted entries beyond cache file dropped"
            );
        }
        entries.sort_by_key(CacheEntry::logical_start);

        let list = Self { entries };
        list.validate()?;
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_slice(&self) -> &[CacheEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CacheEntry> {
        self.entries.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&CacheEntry> {
        self.entries.get(idx)
    }

    pub fn first(&self) -> Option<&CacheEntry> {
        self.entries.first()
    }

    pub fn last(&self) -> Option<&CacheEntry> {
        self.entries.last()
    }

    /// Index of the entry whose logical range contains `pos`.
    pub fn find_containing(&self, pos: u64) -> Option<usize> {
        let idx = self.entries.partition_point(|e| e.logical_start() <= pos);
        let candidate = idx.checked_sub(1)?;
        self.entries[candidate].contains(pos).then_some(candidate)
    }

    /// First entry starting strictly after `pos`.
    pub fn find_next_after(&self, pos: u64) -> Option<&CacheEntry> {
        let idx = self.entries.partition_point(|e| e.logical_start() <= pos);
        self.entries.get(idx)
    }

    /// Index of the entry whose logical range ends exactly at `pos`.
    pub fn find_abutting(&self, pos: u64) -> Option<usize> {
        let idx = self.entries.partition_point(|e| e.logical_start() < pos);
        let candidate = idx.checked_sub(1)?;
        (self.entries[candidate].logical_end() == pos).then_some(candidate)
    }

    /// End of the run of logically contiguous entries starting at `idx`.
    pub fn contiguous_end(&self, idx: usize) -> u64 {
        let Some(entry) = self.entries.get(idx) else {
            return 0;
        };
        let mut end = entry.logical_end();
        for next in &self.entries[idx + 1..] {
            if next.logical_start() != end {
                break;
            }
            end = next.logical_end();
        }
        end
    }

    /// First physical offset past every reserved region; new entries are appended here.
    pub fn physical_extent(&self) -> u64 {
        self.entries
            .iter()
            .map(CacheEntry::reserved_end)
            .max()
            .unwrap_or(0)
    }

    pub fn cached_bytes(&self) -> u64 {
        self.entries.iter().map(CacheEntry::len).sum()
    }

    /// Cached bytes at or after `cursor` (not yet consumed).
    pub fn bytes_ahead(&self, cursor: u64) -> u64 {
        self.entries
            .iter()
            .map(|e| e.logical_end().saturating_sub(e.logical_start().max(cursor)))
            .sum()
    }

    /// Cached bytes before `cursor` (already consumed).
    pub fn bytes_behind(&self, cursor: u64) -> u64 {
        self.entries
            .iter()
            .map(|e| e.logical_end().min(cursor).saturating_sub(e.logical_start()))
            .sum()
    }

    /// Logical end of the entry flagged as stream end, if any.
    pub fn stream_end(&self) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.is_stream_end())
            .map(CacheEntry::logical_end)
    }

    /// Merged logical coverage (adjacent entries collapse into one range).
    pub fn coverage(&self) -> RangeSet<u64> {
        let mut set = RangeSet::new();
        for e in &self.entries {
            set.insert(e.logical_range());
        }
        set
    }

    /// Check every invariant listed in the module docs.
    pub fn validate(&self) -> Result<(), IndexError> {
        for pair in self.entries.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.logical_start() > next.logical_start() {
                return Err(IndexError::Unsorted {
                    prev: prev.logical_start(),
                    next: next.logical_start(),
                });
            }
            if prev.logical_end() > next.logical_start() {
                return Err(IndexError::LogicalOverlap {
                    first: prev.logical_range(),
                    second: next.logical_range(),
                });
            }
        }
        if let Some(e) = self.entries.iter().find(|e| e.is_empty()) {
            return Err(IndexError::EmptyEntry(e.logical_start()));
        }

        let mut regions: Vec<Range<u64>> = self
            .entries
            .iter()
            .map(|e| e.physical_start()..e.reserved_end())
            .collect();
        regions.sort_by_key(|r| r.start);
        for pair in regions.windows(2) {
            if pair[0].end > pair[1].start {
                return Err(IndexError::PhysicalOverlap {
                    first: pair[0].clone(),
                    second: pair[1].clone(),
                });
            }
        }
        Ok(())
    }

    /// Bytes the entry at `idx` can grow by in place.
    ///
    /// Applies the collision rule: if growing by `wanted` would run into the next
    /// physical neighbour, the entry is capped at the gap so it can never overlap it.
    pub(crate) fn room_for_extend(&mut self, idx: usize, wanted: u64) -> u64 {
        let entry = &self.entries[idx];
        let mut room = entry.room();
        if let Some(next_physical) = self.next_physical_start(idx) {
            let data_end = entry.physical_start() + entry.len();
            let physical_room = next_physical.saturating_sub(data_end);
            if physical_room < wanted {
                let gap = next_physical - entry.physical_start();
                self.entries[idx].cap_at(gap);
            }
            room = room.min(physical_room);
        }
        room
    }

    pub(crate) fn grow(&mut self, idx: usize, n: u64) {
        self.entries[idx].grow(n);
    }

    pub(crate) fn close(&mut self, idx: usize) {
        self.entries[idx].close();
    }

    /// Insert keeping logical order; returns the new entry's index.
    pub(crate) fn insert(&mut self, entry: CacheEntry) -> usize {
        let idx = self
            .entries
            .partition_point(|e| e.logical_start() < entry.logical_start());
        self.entries.insert(idx, entry);
        idx
    }

    pub(crate) fn remove(&mut self, idx: usize) -> CacheEntry {
        self.entries.remove(idx)
    }

    pub(crate) fn remove_at_start(&mut self, logical_start: u64) -> Option<CacheEntry> {
        let idx = self
            .entries
            .binary_search_by_key(&logical_start, CacheEntry::logical_start)
            .ok()?;
        Some(self.entries.remove(idx))
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Flag the entry (if any) that ends at `known_end` as the stream end.
    pub(crate) fn mark_stream_end(&mut self, known_end: u64) {
        for e in &mut self.entries {
            e.set_stream_end(e.logical_end() == known_end);
        }
    }

    fn next_physical_start(&self, idx: usize) -> Option<u64> {
        let start = self.entries[idx].physical_start();
        self.entries
            .iter()
            .map(CacheEntry::physical_start)
            .filter(|&p| p > start)
            .min()
    }
}
