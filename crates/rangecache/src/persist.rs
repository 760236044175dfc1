use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{entry::CacheEntry, error::CacheResult};

const INDEX_VERSION: u32 = 1;

/// On-disk schema of a persisted index. Kept private; only [`IndexStore`] reads or writes it.
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    entries: Vec<CacheEntry>,
}

/// Persisted entry list of one cache file.
///
/// ## Normative
/// - `store` replaces the whole document atomically (temp file in the same directory,
///   then rename), so readers never observe a half-written index.
/// - `load` is best-effort: missing, unreadable, corrupt or version-mismatched documents
///   yield an empty list.
#[derive(Clone, Debug)]
pub(crate) struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn load(&self) -> Vec<CacheEntry> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "index unreadable, starting empty");
                return Vec::new();
            }
        };
        if bytes.is_empty() {
            return Vec::new();
        }

        match serde_json::from_slice::<IndexFile>(&bytes) {
            Ok(file) if file.version == INDEX_VERSION => {
                debug!(path = %self.path.display(), entries = file.entries.len(), "index loaded");
                file.entries
            }
            Ok(file) => {
                warn!(version = file.version, "index version mismatch, starting empty");
                Vec::new()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "index corrupt, starting empty");
                Vec::new()
            }
        }
    }

    pub(crate) fn store(&self, entries: &[CacheEntry]) -> CacheResult<()> {
        let file = IndexFile {
            version: INDEX_VERSION,
            entries: entries.to_vec(),
        };
        let bytes = serde_json::to_vec(&file)?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_data()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    pub(crate) fn remove(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
