use std::{
    io,
    path::{Path, PathBuf},
};

use rangecache_core::CacheKey;

/// On-disk naming for cache files and their persisted indexes.
///
/// Both live side by side under a two-character shard directory:
/// `<root>/<hex[0..2]>/<hex>.cache` and `<root>/<hex[0..2]>/<hex>.index.json`.
#[derive(Clone, Debug)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shard_dir(&self, key: &CacheKey) -> PathBuf {
        let hex = key.to_hex();
        self.root.join(&hex[..2])
    }

    pub fn data_path(&self, key: &CacheKey) -> PathBuf {
        self.shard_dir(key).join(format!("{}.cache", key.to_hex()))
    }

    pub fn index_path(&self, key: &CacheKey) -> PathBuf {
        self.shard_dir(key)
            .join(format!("{}.index.json", key.to_hex()))
    }

    pub(crate) fn ensure_shard(&self, key: &CacheKey) -> io::Result<()> {
        std::fs::create_dir_all(self.shard_dir(key))
    }
}
