use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::perception::types::{FingerprintKey, ScreenAnalysis};

struct CacheEntry {
    analysis: Arc<ScreenAnalysis>,
    expires_at: Instant,
    last_access: Instant,
}

struct CacheInner {
    entries: HashMap<FingerprintKey, CacheEntry>,
}

/// Bounded fingerprint → analysis cache with TTL eviction.
///
/// Values are handed out as `Arc` clones, so a `get` racing a `put` on the
/// same key observes either the old analysis or the new one, never a torn
/// value. Internal faults (a poisoned lock) degrade to a miss; the cache
/// never surfaces an error.
pub struct AnalysisCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AnalysisCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
            }),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &FingerprintKey) -> Option<Arc<ScreenAnalysis>> {
        if key.is_sentinel() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let Ok(mut inner) = self.inner.lock() else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let now = Instant::now();
        match inner.entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.last_access = now;
                let analysis = entry.analysis.clone();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(analysis)
            }
            Some(_) => {
                // Expired: drop it now so a stale analysis can never bleed
                // into a later resolution.
                inner.entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: FingerprintKey, analysis: Arc<ScreenAnalysis>, ttl: Duration) {
        if key.is_sentinel() {
            return;
        }

        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        let now = Instant::now();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            Self::evict_one(&mut inner, now);
        }

        inner.entries.insert(
            key,
            CacheEntry {
                analysis,
                expires_at: now + ttl,
                last_access: now,
            },
        );
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            let n = inner.entries.len();
            inner.entries.clear();
            tracing::debug!(evicted = n, "analysis cache invalidated");
        }
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Least-recently-used among expired entries first; if nothing has
    /// expired yet, the globally least-recently-used entry goes.
    fn evict_one(inner: &mut CacheInner, now: Instant) {
        let victim = inner
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone())
            .or_else(|| {
                inner
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_access)
                    .map(|(k, _)| k.clone())
            });

        if let Some(key) = victim {
            inner.entries.remove(&key);
            tracing::debug!(key = %key.as_str(), "cache entry evicted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::FingerprintKey;

    fn analysis(tag: &str) -> Arc<ScreenAnalysis> {
        Arc::new(ScreenAnalysis {
            fingerprint: FingerprintKey::from_hash(tag.to_string()),
            description: format!("screen {tag}"),
            ui_elements: Vec::new(),
            game_state: None,
            confidence: 0.9,
            captured_at: chrono::Utc::now(),
            frame_width: 1920,
            frame_height: 1080,
        })
    }

    fn key(tag: &str) -> FingerprintKey {
        FingerprintKey::from_hash(tag.to_string())
    }

    #[test]
    fn get_returns_inserted_analysis_until_ttl_elapses() {
        let cache = AnalysisCache::new(4);
        cache.put(key("a"), analysis("a"), Duration::from_secs(60));

        let got = cache.get(&key("a")).expect("entry should be live");
        assert_eq!(got.description, "screen a");
        assert_eq!(cache.hit_count(), 1);

        cache.put(key("b"), analysis("b"), Duration::ZERO);
        assert!(cache.get(&key("b")).is_none(), "expired entry must miss");
        assert_eq!(cache.miss_count(), 1);
    }

    #[test]
    fn sentinel_key_never_hits_or_stores() {
        let cache = AnalysisCache::new(4);
        cache.put(FingerprintKey::sentinel(), analysis("x"), Duration::from_secs(60));
        assert!(cache.get(&FingerprintKey::sentinel()).is_none());
    }

    #[test]
    fn capacity_eviction_prefers_expired_entries() {
        let cache = AnalysisCache::new(2);
        cache.put(key("old"), analysis("old"), Duration::ZERO);
        cache.put(key("live"), analysis("live"), Duration::from_secs(60));

        // Cache is full; "old" is expired and must be the victim.
        cache.put(key("new"), analysis("new"), Duration::from_secs(60));

        assert!(cache.get(&key("live")).is_some());
        assert!(cache.get(&key("new")).is_some());
        assert!(cache.get(&key("old")).is_none());
    }

    #[test]
    fn capacity_eviction_falls_back_to_lru() {
        let cache = AnalysisCache::new(2);
        cache.put(key("a"), analysis("a"), Duration::from_secs(60));
        cache.put(key("b"), analysis("b"), Duration::from_secs(60));

        // Touch "a" so "b" is the least recently used.
        assert!(cache.get(&key("a")).is_some());
        cache.put(key("c"), analysis("c"), Duration::from_secs(60));

        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("c")).is_some());
        assert!(cache.get(&key("b")).is_none());
    }

    #[test]
    fn put_replaces_value_atomically_for_readers() {
        let cache = Arc::new(AnalysisCache::new(4));
        cache.put(key("k"), analysis("v1"), Duration::from_secs(60));

        let reader = {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    if let Some(a) = cache.get(&key("k")) {
                        assert!(a.description == "screen v1" || a.description == "screen v2");
                    }
                }
            })
        };
        for _ in 0..1000 {
            cache.put(key("k"), analysis("v2"), Duration::from_secs(60));
        }
        reader.join().expect("reader thread panicked");
    }
}
