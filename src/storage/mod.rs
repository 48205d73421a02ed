// src/storage/mod.rs

//! Content cache abstractions.
//!
//! The cache is a namespaced, key-addressed store for previously fetched or
//! derived bytes. Keys are deterministic hashes of the logical request, so
//! identical requests collide on the same entry across process restarts.
//! Entries are written once on first successful fetch and never expire;
//! forced refresh is an explicit bypass mode at the call site.

pub mod local;

use std::collections::BTreeMap;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;

pub use local::FileCache;

/// Fixed set of cache namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// Search result pages
    Search,
    /// Full-text article bodies
    Articles,
    /// Derived assets (extracted tables, text)
    Derived,
}

impl CacheNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheNamespace::Search => "search",
            CacheNamespace::Articles => "articles",
            CacheNamespace::Derived => "derived",
        }
    }
}

/// Caching mode selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Read through the cache, write misses back
    #[default]
    Use,
    /// Skip reads but still write fresh results back
    Bypass,
    /// No cache interaction at all
    Off,
}

impl CachePolicy {
    pub fn reads(&self) -> bool {
        matches!(self, CachePolicy::Use)
    }

    pub fn writes(&self) -> bool {
        !matches!(self, CachePolicy::Off)
    }
}

/// Optional metadata side-record stored next to a cache entry.
pub type CacheMetadata = BTreeMap<String, String>;

/// Trait for content cache backends.
#[async_trait]
pub trait ContentCache: Send + Sync {
    /// Return cached bytes if present.
    async fn get(&self, namespace: CacheNamespace, key: &str) -> Result<Option<Vec<u8>>>;

    /// Persist payload bytes for future reuse.
    ///
    /// Writes must be atomic with respect to readers; concurrent writers to
    /// the same key converge to a consistent final value.
    async fn put(
        &self,
        namespace: CacheNamespace,
        key: &str,
        data: &[u8],
        metadata: Option<&CacheMetadata>,
    ) -> Result<()>;
}

/// Deterministic cache key over the parts of a logical request.
///
/// Parts are joined with a separator before hashing so that ("ab", "c") and
/// ("a", "bc") produce distinct keys.
pub fn cache_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_deterministic() {
        let a = cache_key(&["doi:10.1/x", "xml"]);
        let b = cache_key(&["doi:10.1/x", "xml"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn cache_key_distinguishes_part_boundaries() {
        assert_ne!(cache_key(&["ab", "c"]), cache_key(&["a", "bc"]));
        assert_ne!(cache_key(&["doi:10.1/x", "xml"]), cache_key(&["doi:10.1/x", "html"]));
    }

    #[test]
    fn policy_modes() {
        assert!(CachePolicy::Use.reads() && CachePolicy::Use.writes());
        assert!(!CachePolicy::Bypass.reads() && CachePolicy::Bypass.writes());
        assert!(!CachePolicy::Off.reads() && !CachePolicy::Off.writes());
    }
}
