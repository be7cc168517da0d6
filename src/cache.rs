use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Bounded map from request identity to a finished result.
///
/// Least recently used entries are evicted once `capacity` is reached. Values
/// are shared behind `Arc` so a hit never copies image bytes.
pub struct ResultCache<V> {
  entries: Mutex<LruCache<String, Arc<V>>>,
}

impl<V> ResultCache<V> {
  /// A zero capacity is bumped to one.
  pub fn new(capacity: usize) -> Self {
    let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
    Self {
      entries: Mutex::new(LruCache::new(capacity)),
    }
  }

  pub fn get(&self, key: &str) -> Option<Arc<V>> {
    // Poisoning leaves the map consistent
    let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
    entries.get(key).cloned()
  }

  /// Insert or overwrite, returning the shared value.
  pub fn insert(&self, key: impl Into<String>, value: V) -> Arc<V> {
    let value = Arc::new(value);
    let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
    entries.put(key.into(), Arc::clone(&value));
    value
  }

  pub fn len(&self) -> usize {
    self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clear(&self) {
    self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
  }
}
