use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Hard ceiling on a single entry, independent of available physical space.
///
/// Bounds individual disk reads/writes and keeps the index fine-grained enough for
/// eviction to reclaim space in useful steps.
pub const MAX_ENTRY_SIZE: u64 = 8 * 1024 * 1024;

/// One contiguous cached byte range: `len` bytes of the logical stream starting at
/// `logical_start`, stored in the cache file at `physical_start`.
///
/// `capacity` set means the entry is closed: it may still be filled up to `capacity`
/// (a reclaimed slot, or room left before the next physical neighbour) but never beyond.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    logical_start: u64,
    physical_start: u64,
    len: u64,
    capacity: Option<u64>,
    #[serde(default)]
    is_stream_end: bool,
}

impl CacheEntry {
    pub(crate) fn new(logical_start: u64, physical_start: u64, len: u64, capacity: Option<u64>) -> Self {
        Self {
            logical_start,
            physical_start,
            len,
            capacity,
            is_stream_end: false,
        }
    }

    pub fn logical_start(&self) -> u64 {
        self.logical_start
    }

    pub fn logical_end(&self) -> u64 {
        self.logical_start + self.len
    }

    pub fn logical_range(&self) -> Range<u64> {
        self.logical_start..self.logical_end()
    }

    pub fn physical_start(&self) -> u64 {
        self.physical_start
    }

    pub fn physical_range(&self) -> Range<u64> {
        self.physical_start..self.physical_start + self.len
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.capacity.is_some()
    }

    pub fn is_stream_end(&self) -> bool {
        self.is_stream_end
    }

    pub fn contains(&self, pos: u64) -> bool {
        pos >= self.logical_start && pos < self.logical_end()
    }

    /// Physical bytes this entry owns: its data plus any reserved, unfilled capacity.
    pub(crate) fn slot_size(&self) -> u64 {
        self.capacity.map_or(self.len, |cap| cap.max(self.len))
    }

    pub(crate) fn reserved_end(&self) -> u64 {
        self.physical_start + self.slot_size()
    }

    /// Bytes that may still be appended before hitting `capacity` or [`MAX_ENTRY_SIZE`].
    pub(crate) fn room(&self) -> u64 {
        let ceiling = self.capacity.unwrap_or(MAX_ENTRY_SIZE).min(MAX_ENTRY_SIZE);
        ceiling.saturating_sub(self.len)
    }

    pub(crate) fn grow(&mut self, n: u64) {
        self.len += n;
    }

    pub(crate) fn close(&mut self) {
        self.capacity.get_or_insert(self.len);
    }

    pub(crate) fn cap_at(&mut self, capacity: u64) {
        self.capacity.get_or_insert(capacity);
    }

    pub(crate) fn set_stream_end(&mut self, is_stream_end: bool) {
        self.is_stream_end = is_stream_end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_entry_room_is_max_entry_size() {
        let e = CacheEntry::new(0, 0, 100, None);
        assert_eq!(e.room(), MAX_ENTRY_SIZE - 100);
        assert_eq!(e.slot_size(), 100);
    }

    #[test]
    fn capacity_bounds_room_and_slot() {
        let mut e = CacheEntry::new(0, 1000, 10, Some(64));
        assert_eq!(e.room(), 54);
        assert_eq!(e.reserved_end(), 1064);
        e.grow(54);
        assert_eq!(e.room(), 0);
    }

    #[test]
    fn close_keeps_existing_capacity() {
        let mut e = CacheEntry::new(0, 0, 10, Some(64));
        e.close();
        assert_eq!(e.capacity(), Some(64));

        let mut e = CacheEntry::new(0, 0, 10, None);
        e.close();
        assert_eq!(e.capacity(), Some(10));
        assert_eq!(e.room(), 0);
    }

    #[test]
    fn contains_is_half_open() {
        let e = CacheEntry::new(500, 0, 10, None);
        assert!(!e.contains(499));
        assert!(e.contains(500));
        assert!(e.contains(509));
        assert!(!e.contains(510));
    }

    #[test]
    fn legacy_record_without_stream_end_flag() {
        let json = r#"{"logical_start":5,"physical_start":0,"len":3,"capacity":null}"#;
        let e: CacheEntry = serde_json::from_str(json).unwrap();
        assert_eq!(e.logical_range(), 5..8);
        assert!(!e.is_stream_end());
    }
}
