//! The cache engine: read / seek / size / close over one logical stream.
//!
//! ## Cursor model
//! - `logical_pos`: the consumer's cursor.
//! - `network_pos`: where the next [`DownloadSource::read`] lands.
//! - `known_end`: highest stream offset seen so far; the stream length once `eof` is set.
//! - `eof`: set once, on a network end of stream (primary instances only) or on a
//!   positive size probe.
//!
//! ## Fill path
//! Every network fetch that is cached goes through `plan_fill` (choose extension or a
//! new slot, consulting the eviction policy, so the fetch can be sized to the slot)
//! followed by `commit_fill` (write bytes, mutate and persist the index).

use std::{
    io::{self, SeekFrom},
    ops::Range,
    path::Path,
};

use rangecache_core::{CacheKey, DownloadSource, SourceError, SourceResult};
use rangemap::RangeSet;
use tracing::{debug, trace, warn};

use crate::{
    cache_file::CacheFile,
    entry::CacheEntry,
    error::{CacheError, CacheResult},
    evict::{EvictionPolicy, FillRequest, Placement},
    index::EntryList,
    layout::CacheLayout,
    options::CacheOptions,
    persist::IndexStore,
    substream::SubStream,
};

/// While the engine's first fill is being completed, a retry returning fewer bytes than
/// this ends the fill early (container probing issues many small reads).
const FIRST_FILL_MIN_CHUNK: usize = 200;

/// Snapshot of cache occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub cached_bytes: u64,
    pub file_len: u64,
    /// Cached bytes at or after the consumer cursor.
    pub bytes_ahead: u64,
    /// Cached bytes before the consumer cursor.
    pub bytes_behind: u64,
    pub loaded_size: u64,
}

/// Where a planned fill is written.
#[derive(Debug)]
enum FillTarget {
    /// Append to the entry at this index.
    Extend(usize),
    New {
        physical_start: u64,
        capacity: Option<u64>,
        victims: Vec<u64>,
    },
}

#[derive(Debug)]
pub(crate) struct FillPlan {
    target: FillTarget,
    /// Bytes the fetch may bring in without leaving a hole or overrunning the slot.
    len: u64,
}

/// Disk-backed range cache in front of a [`DownloadSource`].
///
/// Not thread-safe by itself; see [`SharedCacheEngine`](crate::SharedCacheEngine) for a
/// lockable handle.
pub struct CacheEngine<S: DownloadSource> {
    pub(crate) options: CacheOptions,
    pub(crate) key: CacheKey,
    file: CacheFile,
    store: IndexStore,
    pub(crate) index: EntryList,
    policy: Box<dyn EvictionPolicy>,
    pub(crate) source: S,

    pub(crate) logical_pos: u64,
    pub(crate) network_pos: u64,
    pub(crate) known_end: u64,
    pub(crate) eof: bool,
    pub(crate) readahead_pos: u64,

    /// Only primary instances let a network end of stream set `eof`.
    primary: bool,
    /// A network fill has completed at least once.
    filled: bool,
    /// Transfer buffer for fills that do not go to a caller buffer.
    pub(crate) scratch: Vec<u8>,
    pub(crate) sub_streams: Vec<SubStream>,
    closed: bool,
}

impl<S: DownloadSource> CacheEngine<S> {
    /// Open a cache for the stream named `identifier`, fetching through `source`.
    pub fn open(options: CacheOptions, identifier: &str, source: S) -> CacheResult<Self> {
        let key = CacheKey::from_identifier(identifier)?;
        Self::open_with_key(options, key, source, true)
    }

    pub(crate) fn open_with_key(
        options: CacheOptions,
        key: CacheKey,
        source: S,
        primary: bool,
    ) -> CacheResult<Self> {
        let layout = CacheLayout::new(&options.cache_dir);
        layout.ensure_shard(&key)?;
        let data_path = layout.data_path(&key);
        let store = IndexStore::new(layout.index_path(&key));

        if !options.retain {
            remove_file(&data_path)?;
            store.remove()?;
        }
        let file = CacheFile::open(&data_path)?;

        let index = if options.retain {
            EntryList::restore(store.load(), file.len()).unwrap_or_else(|e| {
                warn!(key = ?key, error = %e, "persisted index rejected, starting empty");
                EntryList::new()
            })
        } else {
            EntryList::new()
        };

        let stream_end = index.stream_end();
        let policy = options.eviction.build();
        debug!(
            key = ?key,
            entries = index.len(),
            retain = options.retain,
            primary,
            ?stream_end,
            "cache engine opened"
        );

        let mut engine = Self {
            options,
            key,
            file,
            store,
            index,
            policy,
            source,
            logical_pos: 0,
            network_pos: 0,
            known_end: stream_end.unwrap_or(0),
            eof: primary && stream_end.is_some(),
            readahead_pos: 0,
            primary,
            filled: false,
            scratch: Vec::new(),
            sub_streams: Vec::new(),
            closed: false,
        };
        engine.refresh_readahead();
        Ok(engine)
    }

    /// Read up to `buf.len()` bytes at the cursor. `Ok(0)` means end of stream.
    ///
    /// Serves from disk when the cursor is cached, else fetches at most one transfer
    /// buffer from the network (stopping short of the next cached entry) and caches it.
    pub fn read(&mut self, buf: &mut [u8]) -> CacheResult<usize> {
        self.ensure_open()?;
        if buf.is_empty() || (self.eof && self.logical_pos >= self.known_end) {
            return Ok(0);
        }
        if let Some(n) = self.read_cached(buf) {
            return Ok(n);
        }

        if self.network_pos != self.logical_pos {
            let pos = self.source.seek(SeekFrom::Start(self.logical_pos))?;
            debug!(from = self.network_pos, to = pos, "network seek for read");
            self.network_pos = pos;
            self.logical_pos = pos;
            if let Some(n) = self.read_cached(buf) {
                return Ok(n);
            }
        }

        let wanted = self.clamp_fetch(self.network_pos, buf.len() as u64);
        if wanted == 0 {
            return Ok(0);
        }
        let n = self.fill(&mut buf[..wanted as usize], false)?;
        self.logical_pos += n as u64;
        trace!(pos = self.logical_pos, n, "read from network");
        Ok(n)
    }

    /// Move the cursor. Positions inside cached data never touch the network.
    pub fn seek(&mut self, pos: SeekFrom) -> CacheResult<u64> {
        self.ensure_open()?;
        let target = match pos {
            SeekFrom::Start(p) => i128::from(p),
            SeekFrom::Current(delta) => i128::from(self.logical_pos) + i128::from(delta),
            SeekFrom::End(delta) if self.eof => i128::from(self.known_end) + i128::from(delta),
            SeekFrom::End(_) => {
                let pos = self.seek_source(pos)?;
                self.logical_pos = pos;
                self.refresh_readahead();
                return Ok(pos);
            }
        };
        let target = u64::try_from(target).map_err(|_| CacheError::InvalidSeek(target))?;

        if self.index.find_containing(target).is_some() {
            trace!(target, "seek within cache");
            self.logical_pos = target;
        } else if self.read_through(target) {
            debug!(target, "seek by reading through");
            self.logical_pos = target;
        } else {
            let pos = self.seek_source(SeekFrom::Start(target))?;
            debug!(target, pos, "network seek");
            self.logical_pos = pos;
        }
        self.refresh_readahead();
        Ok(self.logical_pos)
    }

    /// Total stream length, probing the source if it is not known yet.
    pub fn size(&mut self) -> CacheResult<u64> {
        self.ensure_open()?;
        if self.eof {
            return Ok(self.known_end);
        }

        let probed = match self.source.size().filter(|&len| len > 0) {
            Some(len) => Some(len),
            None => self.probe_by_seek(),
        };
        let Some(len) = probed else {
            return match self.known_end {
                0 => Err(CacheError::UnknownLength),
                known => Ok(known),
            };
        };

        self.known_end = self.known_end.max(len);
        debug!(len, known_end = self.known_end, "size probed");
        if self.primary {
            self.eof = true;
            if self.options.discard_on_size_probe {
                self.discard_cache();
            } else {
                self.index.mark_stream_end(self.known_end);
                self.persist();
            }
        }
        Ok(self.known_end)
    }

    /// Flush and release everything; drops cache files unless retained. Idempotent.
    pub fn close(&mut self) -> CacheResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut result = self.file.close().map_err(CacheError::from);
        self.source.close();
        for child in &mut self.sub_streams {
            if let Err(e) = child.close() {
                warn!(key = ?child.key, error = %e, "sub-stream close failed");
            }
        }

        if self.options.retain {
            if self.eof {
                self.index.mark_stream_end(self.known_end);
            }
            let stored = self.store.store(self.index.as_slice());
            result = result.and(stored);
        } else {
            let removed = remove_file(self.file.path()).and_then(|()| self.store.remove());
            result = result.and(removed.map_err(CacheError::from));
        }
        debug!(key = ?self.key, entries = self.index.len(), "cache engine closed");
        result
    }

    pub fn position(&self) -> u64 {
        self.logical_pos
    }

    pub fn network_position(&self) -> u64 {
        self.network_pos
    }

    pub fn known_end(&self) -> u64 {
        self.known_end
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn data_path(&self) -> &Path {
        self.file.path()
    }

    pub fn index(&self) -> &EntryList {
        &self.index
    }

    pub fn entries(&self) -> &[CacheEntry] {
        self.index.as_slice()
    }

    /// Merged logical ranges currently on disk.
    pub fn cached_ranges(&self) -> RangeSet<u64> {
        self.index.coverage()
    }

    /// Uncached holes inside `within`.
    pub fn gaps(&self, within: Range<u64>) -> Vec<Range<u64>> {
        self.index.coverage().gaps(&within).collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.index.len(),
            cached_bytes: self.index.cached_bytes(),
            file_len: self.file.len(),
            bytes_ahead: self.index.bytes_ahead(self.logical_pos),
            bytes_behind: self.index.bytes_behind(self.logical_pos),
            loaded_size: self.loaded_size(),
        }
    }

    pub(crate) fn ensure_open(&self) -> CacheResult<()> {
        if self.closed {
            Err(CacheError::Closed)
        } else {
            Ok(())
        }
    }

    fn read_cached(&mut self, buf: &mut [u8]) -> Option<usize> {
        let idx = self.index.find_containing(self.logical_pos)?;
        let entry = self.index.get(idx)?;
        let offset = self.logical_pos - entry.logical_start();
        let n = (entry.len() - offset).min(buf.len() as u64) as usize;
        let physical = entry.physical_start() + offset;

        match self.file.read_at(physical, &mut buf[..n]) {
            Ok(read) if read == n => {
                self.logical_pos += n as u64;
                trace!(pos = self.logical_pos, n, "cache hit");
                Some(n)
            }
            Ok(read) => {
                warn!(physical, read, expected = n, "short cache read, dropping entry");
                self.drop_entry(idx);
                None
            }
            Err(e) => {
                warn!(physical, error = %e, "cache read failed, dropping entry");
                self.drop_entry(idx);
                None
            }
        }
    }

    fn drop_entry(&mut self, idx: usize) {
        self.index.remove(idx);
        self.persist();
    }

    /// Largest fetch starting at `start`: bounded by the transfer buffer, the next cached
    /// entry and, once known, the stream end.
    pub(crate) fn clamp_fetch(&self, start: u64, requested: u64) -> u64 {
        let mut len = requested.min(self.buffer_size() as u64);
        if let Some(next) = self.index.find_next_after(start) {
            len = len.min(next.logical_start() - start);
        }
        if self.eof {
            len = len.min(self.known_end.saturating_sub(start));
        }
        len
    }

    /// Fetch `buf.len()` bytes (or fewer, per the plan) at `network_pos` and cache them.
    ///
    /// With `require_admission`, an eviction refusal is returned as
    /// [`CacheError::ExhaustedBudget`] before any network I/O; otherwise the bytes are
    /// fetched and handed back uncached.
    pub(crate) fn fill(&mut self, buf: &mut [u8], require_admission: bool) -> CacheResult<usize> {
        let start = self.network_pos;
        let plan = match self.plan_fill(start, buf.len() as u64, require_admission) {
            Ok(plan) => Some(plan),
            Err(e) if !require_admission => {
                debug!(start, wanted = buf.len(), error = %e, "fill not admitted, serving uncached");
                None
            }
            Err(e) => return Err(e),
        };
        let len = plan.as_ref().map_or(buf.len(), |p| p.len as usize);

        let n = self.fetch(&mut buf[..len])?;
        if n > 0 {
            if let Some(plan) = plan {
                self.commit_fill(plan, start, &buf[..n]);
            }
            self.advance_readahead(start);
        }
        Ok(n)
    }

    fn plan_fill(&mut self, start: u64, wanted: u64, prefetch: bool) -> CacheResult<FillPlan> {
        let req = FillRequest {
            start,
            cursor: self.logical_pos,
            wanted,
            prefetch,
        };

        let abutting = self.index.find_abutting(start);
        if let Some(idx) = abutting {
            let room = self.index.room_for_extend(idx, wanted);
            if room > 0 {
                let len = wanted.min(room);
                let extend = FillRequest { wanted: len, ..req };
                if self.policy.allow_extend(&self.index, idx, &extend) {
                    return Ok(FillPlan {
                        target: FillTarget::Extend(idx),
                        len,
                    });
                }
            }
        }

        let placement = self.policy.place(&self.index, &req)?;
        // a refused fill leaves the abutting entry open for a later extension
        if let Some(idx) = abutting {
            self.index.close(idx);
        }
        let plan = match placement {
            Placement::Append => FillPlan {
                target: FillTarget::New {
                    physical_start: self.index.physical_extent(),
                    capacity: None,
                    victims: Vec::new(),
                },
                len: wanted,
            },
            Placement::Reuse {
                physical_start,
                capacity,
                victims,
            } => {
                debug!(start, physical_start, capacity, ?victims, "reclaiming slot");
                FillPlan {
                    target: FillTarget::New {
                        physical_start,
                        capacity: Some(capacity),
                        victims,
                    },
                    len: wanted.min(capacity),
                }
            }
        };
        Ok(plan)
    }

    /// Write fetched bytes and record them. Disk failures leave the bytes uncached.
    fn commit_fill(&mut self, plan: FillPlan, start: u64, data: &[u8]) {
        let n = data.len() as u64;
        match plan.target {
            FillTarget::Extend(idx) => {
                let Some(entry) = self.index.get(idx) else {
                    return;
                };
                let physical = entry.physical_start() + entry.len();
                match self.file.write_at(physical, data) {
                    Ok(()) => self.index.grow(idx, n),
                    Err(e) => {
                        warn!(start, physical, error = %e, "cache write failed");
                        return;
                    }
                }
            }
            FillTarget::New {
                physical_start,
                capacity,
                victims,
            } => {
                for victim in victims {
                    self.index.remove_at_start(victim);
                }
                if let Err(e) = self.file.write_at(physical_start, data) {
                    warn!(start, physical_start, error = %e, "cache write failed");
                    self.persist();
                    return;
                }
                self.index
                    .insert(CacheEntry::new(start, physical_start, n, capacity));
                trace!(start, physical_start, n, ?capacity, "entry created");
            }
        }

        if self.eof {
            self.index.mark_stream_end(self.known_end);
        }
        self.persist();
    }

    /// One network fetch into `buf`. `Ok(0)` is end of stream.
    fn fetch(&mut self, buf: &mut [u8]) -> CacheResult<usize> {
        match self.read_source(buf) {
            Ok(0) | Err(SourceError::Eof) => {
                self.on_source_eof(buf.len());
                Ok(0)
            }
            Ok(n) => {
                self.network_pos += n as u64;
                self.known_end = self.known_end.max(self.network_pos);
                self.filled = true;
                Ok(n)
            }
            Err(e) => Err(CacheError::Network(e)),
        }
    }

    /// Read-complete: retry short reads until `buf` is full. A zero, end-of-stream or
    /// failed retry ends the loop with what was read so far; only the first attempt's
    /// outcome is propagated as-is.
    fn read_source(&mut self, buf: &mut [u8]) -> SourceResult<usize> {
        let first_fill = !self.filled;
        let first = self.source.read(buf)?;
        if first == 0 || !self.options.read_complete {
            return Ok(first);
        }

        let mut total = first;
        while total < buf.len() {
            match self.source.read(&mut buf[total..]) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    total += n;
                    if first_fill && n < FIRST_FILL_MIN_CHUNK {
                        break;
                    }
                }
            }
        }
        Ok(total)
    }

    fn on_source_eof(&mut self, requested: usize) {
        if !self.primary || requested == 0 || self.eof {
            return;
        }
        self.eof = true;
        self.known_end = self.known_end.max(self.network_pos);
        debug!(known_end = self.known_end, "network end of stream");
        self.index.mark_stream_end(self.known_end);
        self.persist();
    }

    /// Seek the source, retrying once on failure.
    pub(crate) fn seek_source(&mut self, pos: SeekFrom) -> CacheResult<u64> {
        let result = match self.source.seek(pos) {
            Ok(p) => Ok(p),
            Err(e) => {
                debug!(?pos, error = %e, "network seek failed, retrying once");
                self.source.seek(pos)
            }
        };
        let p = result?;
        self.network_pos = p;
        Ok(p)
    }

    /// Forward seek by fetching the bytes in between, when they fit in one transfer
    /// buffer and nothing cached lies in the way.
    fn read_through(&mut self, target: u64) -> bool {
        let start = self.network_pos;
        let gap = target.saturating_sub(start);
        if gap == 0 || gap >= self.buffer_size() as u64 {
            return false;
        }
        if self.index.find_containing(start).is_some()
            || self
                .index
                .find_next_after(start)
                .is_some_and(|e| e.logical_start() <= target)
        {
            return false;
        }

        let mut scratch = self.take_scratch();
        let reached = loop {
            let remaining = target - self.network_pos;
            if remaining == 0 {
                break true;
            }
            let wanted = self.clamp_fetch(self.network_pos, remaining) as usize;
            if wanted == 0 {
                break false;
            }
            match self.fill(&mut scratch[..wanted], false) {
                Ok(0) => break false,
                Ok(_) => {}
                Err(e) => {
                    debug!(target, error = %e, "read-through failed");
                    break false;
                }
            }
        };
        self.scratch = scratch;
        reached
    }

    pub(crate) fn take_scratch(&mut self) -> Vec<u8> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(self.buffer_size(), 0);
        scratch
    }

    /// Transfer buffer size; a zero set directly on the options still moves one byte.
    pub(crate) fn buffer_size(&self) -> usize {
        self.options.buffer_size.max(1)
    }

    /// Learn the length by seeking to the end and back.
    fn probe_by_seek(&mut self) -> Option<u64> {
        let end = match self.source.seek(SeekFrom::End(0)) {
            Ok(end) => end,
            Err(e) => {
                debug!(error = %e, "size probe by seek failed");
                return None;
            }
        };
        match self.source.seek(SeekFrom::Start(self.network_pos)) {
            Ok(pos) => self.network_pos = pos,
            Err(e) => {
                warn!(error = %e, "seek back after size probe failed");
                self.network_pos = end;
            }
        }
        (end > 0).then_some(end)
    }

    fn discard_cache(&mut self) {
        debug!(entries = self.index.len(), "discarding cache after size probe");
        self.index.clear();
        if let Err(e) = self.file.truncate() {
            warn!(error = %e, "cache truncate failed");
        }
        self.persist();
        self.refresh_readahead();
    }

    /// Persist the index when retained. Failures only cost the next session's cache.
    fn persist(&mut self) {
        if !self.options.retain {
            return;
        }
        if let Err(e) = self.store.store(self.index.as_slice()) {
            warn!(path = %self.store.path().display(), error = %e, "index persist failed");
        }
    }

    /// Reset the readahead marker to the cursor, then to the end of cached data
    /// contiguous with it.
    pub(crate) fn refresh_readahead(&mut self) {
        self.readahead_pos = match self.index.find_containing(self.logical_pos) {
            Some(idx) => self.index.contiguous_end(idx),
            None => self.logical_pos,
        };
    }

    /// Move the readahead marker along a fill that started at or before it.
    fn advance_readahead(&mut self, fill_start: u64) {
        let base = self.readahead_pos.max(self.logical_pos);
        if fill_start > base {
            return;
        }
        let mut end = base.max(self.network_pos);
        if let Some(idx) = self.index.find_containing(end) {
            end = self.index.contiguous_end(idx);
        }
        self.readahead_pos = end;
    }
}

impl<S: DownloadSource> Drop for CacheEngine<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(key = ?self.key, error = %e, "cache engine close on drop failed");
        }
    }
}

impl<S: DownloadSource> std::fmt::Debug for CacheEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("key", &self.key)
            .field("logical_pos", &self.logical_pos)
            .field("network_pos", &self.network_pos)
            .field("known_end", &self.known_end)
            .field("eof", &self.eof)
            .field("entries", &self.index.len())
            .field("sub_streams", &self.sub_streams.len())
            .finish()
    }
}

fn remove_file(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
