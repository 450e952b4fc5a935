//! Package access cache
//!
//! Memoizes reflective export/open decisions. Purely a latency optimization:
//! every answer it serves is one the access graph would give right now.
//!
//! Decisions live in a bounded moka cache. Invalidation is a generation bump
//! followed by `invalidate_all`. A decision records the generation observed
//! *before* it was computed and is served only while that generation is still
//! current, so a decision computed concurrently with a mutation can never
//! outlive the invalidation that follows it.

use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

use crate::config::CacheConfig;
use crate::module::traits::{AccessError, ModuleId, PackageAccess};

/// Cache key: (source, package, other, access kind)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessKey {
    pub source: ModuleId,
    pub package: String,
    pub other: ModuleId,
    pub access: PackageAccess,
}

impl AccessKey {
    pub fn new(source: ModuleId, package: &str, other: ModuleId, access: PackageAccess) -> Self {
        Self {
            source,
            package: package.to_string(),
            other,
            access,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedDecision {
    allowed: bool,
    generation: u64,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub entries: u64,
}

/// Process-wide memoization of access decisions
pub struct PackageAccessCache {
    enabled: bool,
    generation: AtomicU64,
    entries: Cache<AccessKey, CachedDecision>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl PackageAccessCache {
    /// Create a cache from configuration
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = if config.enabled { config.max_entries.max(1) } else { 0 };
        Self {
            enabled: config.enabled,
            generation: AtomicU64::new(0),
            entries: Cache::builder().max_capacity(capacity as u64).build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self::new(&CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current invalidation generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Serve a current decision for `key`, or compute and remember one
    pub fn get_or_compute<F>(&self, key: AccessKey, compute: F) -> Result<bool, AccessError>
    where
        F: FnOnce() -> Result<bool, AccessError>,
    {
        if !self.enabled {
            return compute();
        }

        let generation = self.generation.load(Ordering::SeqCst);
        if let Some(cached) = self.entries.get(&key) {
            if cached.generation == generation {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!("Access cache hit: {:?} -> {}", key, cached.allowed);
                return Ok(cached.allowed);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let allowed = compute()?;
        self.entries.insert(key, CachedDecision { allowed, generation });
        Ok(allowed)
    }

    /// Drop every cached decision
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.invalidate_all();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        trace!("Access cache invalidated");
    }

    /// Number of stored decisions once pending maintenance has run
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl Default for PackageAccessCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(package: &str) -> AccessKey {
        AccessKey::new(ModuleId::next(), package, ModuleId::next(), PackageAccess::Exported)
    }

    #[test]
    fn test_hit_after_miss() {
        let cache = PackageAccessCache::default();
        let k = key("p");
        assert!(!cache.get_or_compute(k.clone(), || Ok(false)).unwrap());
        // a hit never calls compute
        assert!(!cache.get_or_compute(k, || panic!("should be cached")).unwrap());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_invalidate_forces_recompute() {
        let cache = PackageAccessCache::default();
        let k = key("p");
        assert!(!cache.get_or_compute(k.clone(), || Ok(false)).unwrap());
        cache.invalidate();
        assert!(cache.get_or_compute(k, || Ok(true)).unwrap());
        let stats = cache.stats();
        assert_eq!(stats.invalidations, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_stale_generation_is_not_served() {
        let cache = PackageAccessCache::default();
        let k = key("p");
        // compute straddles an invalidation: the stored decision is tagged
        // with the generation read before computing
        let stale = cache
            .get_or_compute(k.clone(), || {
                cache.invalidate();
                Ok(false)
            })
            .unwrap();
        assert!(!stale);
        assert!(cache.get_or_compute(k, || Ok(true)).unwrap());
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_disabled_cache_always_computes() {
        let cache = PackageAccessCache::disabled();
        let k = key("p");
        assert!(cache.get_or_compute(k.clone(), || Ok(true)).unwrap());
        assert!(!cache.get_or_compute(k, || Ok(false)).unwrap());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_bounded_entries() {
        let cache = PackageAccessCache::new(&CacheConfig {
            enabled: true,
            max_entries: 2,
        });
        for i in 0..50 {
            assert!(cache.get_or_compute(key(&format!("p{}", i)), || Ok(true)).unwrap());
        }
        assert!(cache.len() <= 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = PackageAccessCache::default();
        let k = key("p");
        let err = cache.get_or_compute(k.clone(), || {
            Err(AccessError::UnregisteredModule("m".to_string()))
        });
        assert!(err.is_err());
        assert!(cache.is_empty());
        assert!(cache.get_or_compute(k, || Ok(true)).unwrap());
    }
}
