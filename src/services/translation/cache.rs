use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

use crate::utils::Metrics;

/// In-memory LRU of collaborator answers.
///
/// Keys are xxHash3 digests of the model name and input text, so switching
/// models never serves a stale answer. Only successful translations are
/// stored; fallbacks are not.
#[derive(Clone)]
pub struct TranslationCache {
    entries: Arc<Mutex<LruCache<u64, String>>>,
    metrics: Option<Metrics>,
}

impl TranslationCache {
    pub fn new(max_entries: usize, metrics: Option<Metrics>) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            metrics,
        }
    }

    pub fn generate_key(model: &str, text: &str) -> u64 {
        let mut hash_input = Vec::with_capacity(model.len() + text.len() + 1);
        hash_input.extend_from_slice(model.as_bytes());
        hash_input.push(0);
        hash_input.extend_from_slice(text.as_bytes());
        xxh3_64(&hash_input)
    }

    pub fn get(&self, key: u64) -> Option<String> {
        let hit = self.entries.lock().get(&key).cloned();
        if let Some(ref m) = self.metrics {
            if hit.is_some() {
                m.record_cache_hit();
            } else {
                m.record_cache_miss();
            }
        }
        hit
    }

    pub fn put(&self, key: u64, translation: String) {
        let mut entries = self.entries.lock();
        entries.put(key, translation);
        if let Some(ref m) = self.metrics {
            m.update_cache_size(entries.len());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_put_get() {
        let metrics = Metrics::new();
        let cache = TranslationCache::new(10, Some(metrics.clone()));

        let key = TranslationCache::generate_key("opus-mt-en-es", "hola");
        assert!(cache.get(key).is_none());
        cache.put(key, "hello".to_string());
        assert_eq!(cache.get(key).as_deref(), Some("hello"));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.cache_size, 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = TranslationCache::new(2, None);
        assert!(cache.is_empty());
        cache.put(1, "one".to_string());
        cache.put(2, "two".to_string());
        cache.get(1);
        cache.put(3, "three".to_string());

        assert!(cache.get(2).is_none());
        assert!(cache.get(1).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_xxhash_key_depends_on_model() {
        let a = TranslationCache::generate_key("m1", "abc");
        let b = TranslationCache::generate_key("m1", "abc");
        let c = TranslationCache::generate_key("m2", "abc");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
