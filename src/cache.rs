//! Two-layer embedding cache: a per-call-argument cache around the embedder,
//! and a per-descriptor composite cache that can short-circuit the whole
//! embedding step. Both are insertion-order LRUs (the oldest entry evicts,
//! not the least-recently-read one) with hit/miss counters.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

struct Bounded<K, V> {
    capacity: usize,
    order: VecDeque<K>,
    map: HashMap<K, V>,
}

impl<K: std::hash::Hash + Eq + Clone, V: Clone> Bounded<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            map: HashMap::new(),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.map.get(key).cloned()
    }

    fn insert(&mut self, key: K, value: V) {
        if !self.map.contains_key(&key) {
            if self.order.len() >= self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.map.remove(&oldest);
                }
            }
            self.order.push_back(key.clone());
        }
        self.map.insert(key, value);
    }

    fn clear(&mut self) {
        self.order.clear();
        self.map.clear();
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Bounded, insertion-order-evicted cache keyed by the raw embedder input
/// string, with hit/miss statistics. Safe for concurrent get/insert: stale
/// reads are acceptable, torn vectors are not (guarded by a single lock).
pub struct ArgumentCache {
    inner: RwLock<Bounded<String, Vec<f32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ArgumentCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Bounded::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let hit = self.inner.read().unwrap().get(&key.to_string());
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    pub fn insert(&self, key: String, value: Vec<f32>) {
        self.inner.write().unwrap().insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    pub fn clear(&self) {
        self.inner.write().unwrap().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// Composite cache keyed by a stable 32-bit hash of `title ⊕ description ⊕ diff`,
/// valued by `(text_vec, diff_vec)`. A hit short-circuits the whole embedding
/// step of the detector pipeline.
pub struct CompositeCache {
    inner: RwLock<Bounded<u32, (Vec<f32>, Vec<f32>)>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CompositeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Bounded::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn key(title: &str, description: &str, diff: &str) -> u32 {
        let mut buf = String::with_capacity(title.len() + description.len() + diff.len());
        buf.push_str(title);
        buf.push_str(description);
        buf.push_str(diff);
        xxhash_rust::xxh32::xxh32(buf.as_bytes(), 0)
    }

    pub fn get(&self, key: u32) -> Option<(Vec<f32>, Vec<f32>)> {
        let hit = self.inner.read().unwrap().get(&key);
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    pub fn insert(&self, key: u32, value: (Vec<f32>, Vec<f32>)) {
        self.inner.write().unwrap().insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    pub fn clear(&self) {
        self.inner.write().unwrap().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_cache_evicts_oldest_on_overflow() {
        let cache = ArgumentCache::new(2);
        cache.insert("a".into(), vec![1.0]);
        cache.insert("b".into(), vec![2.0]);
        cache.insert("c".into(), vec![3.0]);

        assert!(cache.get("a").is_none(), "oldest entry should be evicted");
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn argument_cache_tracks_hit_rate() {
        let cache = ArgumentCache::new(4);
        cache.insert("k".into(), vec![1.0]);
        cache.get("k"); // hit
        cache.get("missing"); // miss
        assert!((cache.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn clear_resets_counters_and_entries() {
        let cache = ArgumentCache::new(4);
        cache.insert("k".into(), vec![1.0]);
        cache.get("k");
        cache.clear();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.hit_rate(), 0.0);
    }

    #[test]
    fn composite_key_is_stable_and_order_sensitive() {
        let a = CompositeCache::key("t", "d", "diff");
        let b = CompositeCache::key("t", "d", "diff");
        assert_eq!(a, b);
    }

    #[test]
    fn composite_cache_round_trips_both_vectors() {
        let cache = CompositeCache::new(8);
        let key = CompositeCache::key("title", "desc", "");
        cache.insert(key, (vec![1.0, 2.0], vec![3.0, 4.0]));
        let (text_vec, diff_vec) = cache.get(key).unwrap();
        assert_eq!(text_vec, vec![1.0, 2.0]);
        assert_eq!(diff_vec, vec![3.0, 4.0]);
    }
}
