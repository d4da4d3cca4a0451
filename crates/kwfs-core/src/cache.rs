use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use crate::resolve::ResolvedView;
use crate::vpath;

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of views currently cached.
    pub entries: usize,
    /// Number of single-path invalidations that dropped a view.
    pub invalidations: u64,
    /// Number of full flushes.
    pub flushes: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Memoized resolutions keyed by normalized virtual path.
///
/// Not synchronized: the owner serializes access.
#[derive(Debug)]
pub struct ResolutionCache {
    enabled: bool,
    views: HashMap<String, Arc<ResolvedView>>,
    stats: CacheStats,
}

impl Default for ResolutionCache {
    fn default() -> Self {
        ResolutionCache::new(true)
    }
}

impl ResolutionCache {
    pub fn new(enabled: bool) -> Self {
        ResolutionCache {
            enabled,
            views: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a view. A disabled cache always misses.
    pub fn get(&mut self, path: &str) -> Option<Arc<ResolvedView>> {
        if !self.enabled {
            trace!(path = %path, "cache disabled, skipping lookup");
            self.stats.misses += 1;
            return None;
        }

        let key = vpath::normalize(path);
        match self.views.get(&key) {
            Some(view) => {
                self.stats.hits += 1;
                debug!(path = %key, "resolution cache hit");
                Some(Arc::clone(view))
            }
            None => {
                self.stats.misses += 1;
                debug!(path = %key, "resolution cache miss");
                None
            }
        }
    }

    /// Store a view, replacing any previous one for the same path.
    pub fn put(&mut self, path: &str, view: Arc<ResolvedView>) {
        if !self.enabled {
            trace!(path = %path, "cache disabled, skipping put");
            return;
        }
        let key = vpath::normalize(path);
        if self.views.insert(key, view).is_some() {
            trace!(path = %path, "replaced cached view");
        }
        self.stats.entries = self.views.len();
    }

    /// Drop the view for one virtual path.
    pub fn invalidate(&mut self, path: &str) {
        let key = vpath::normalize(path);
        if self.views.remove(&key).is_some() {
            self.stats.invalidations += 1;
            self.stats.entries = self.views.len();
            debug!(path = %key, "invalidated cached view");
        }
    }

    /// Drop every cached view.
    pub fn invalidate_all(&mut self) {
        let dropped = self.views.len();
        self.views.clear();
        self.stats.flushes += 1;
        self.stats.entries = 0;
        debug!(dropped, "flushed resolution cache");
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.views.contains_key(&vpath::normalize(path))
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn view(canonical: &str) -> Arc<ResolvedView> {
        Arc::new(ResolvedView {
            canonical: PathBuf::from(canonical),
            listing: vec![".".to_string(), "..".to_string()],
            matches: vec![PathBuf::from(canonical)],
        })
    }

    #[test]
    fn test_put_then_get() {
        let mut cache = ResolutionCache::new(true);
        assert!(cache.get("/urgent").is_none());

        cache.put("/urgent", view("/ref/urgent"));
        let hit = cache.get("/urgent").unwrap();
        assert_eq!(hit.canonical, PathBuf::from("/ref/urgent"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_keys_are_normalized() {
        let mut cache = ResolutionCache::new(true);
        cache.put("/urgent/", view("/ref/urgent"));
        assert!(cache.get("//urgent").is_some());
        assert!(cache.contains("/urgent"));
    }

    #[test]
    fn test_invalidate_single_path() {
        let mut cache = ResolutionCache::new(true);
        cache.put("/a", view("/ref/a"));
        cache.put("/b", view("/ref/b"));

        cache.invalidate("/a");
        assert!(!cache.contains("/a"));
        assert!(cache.contains("/b"));
        assert_eq!(cache.stats().invalidations, 1);

        // Missing keys do not count.
        cache.invalidate("/a");
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_invalidate_all() {
        let mut cache = ResolutionCache::new(true);
        cache.put("/", view("/ref"));
        cache.put("/a", view("/ref/a"));

        cache.invalidate_all();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().flushes, 1);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_disabled_cache_always_misses() {
        let mut cache = ResolutionCache::new(false);
        cache.put("/a", view("/ref/a"));
        assert!(cache.get("/a").is_none());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().misses, 1);
    }
}
