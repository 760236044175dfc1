use std::fmt;

use sha2::{Digest, Sha256};
use url::Url;

use crate::{CoreError, CoreResult, canonicalize_identifier};

/// Stable identity of a logical stream in the cache directory.
///
/// The cache file and its persisted index are both named from this hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn from_url(url: &Url) -> CoreResult<CacheKey> {
        let canonical = canonicalize_identifier(url)?;
        Ok(Self::digest(canonical.as_bytes()))
    }

    /// Key for an arbitrary identifier.
    ///
    /// Identifiers that parse as URLs go through [`canonicalize_identifier`];
    /// anything else (plain paths, opaque ids) is hashed verbatim.
    pub fn from_identifier(identifier: &str) -> CoreResult<CacheKey> {
        let trimmed = identifier.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidIdentifier("empty identifier".to_string()));
        }
        match Url::parse(trimmed) {
            Ok(url) => Self::from_url(&url),
            Err(_) => Ok(Self::digest(trimmed.as_bytes())),
        }
    }

    /// Key of a companion stream opened under this one.
    ///
    /// `ordinal` keeps repeated references to the same child apart.
    pub fn child(&self, child: &CacheKey, ordinal: usize) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        hasher.update(child.0);
        hasher.update((ordinal as u64).to_be_bytes());
        CacheKey(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn digest(bytes: &[u8]) -> CacheKey {
        CacheKey(Sha256::digest(bytes).into())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", &self.to_hex()[..12])
    }
}
