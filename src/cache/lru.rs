//! LRU cache implementation.
//!
//! A bounded LRU keyed by a single `u64`, protected by one mutex. Entries are
//! linked through an index-based list so no unsafe pointer juggling is needed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Statistics for cache operations.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: AtomicU64,
    /// Number of cache misses.
    pub misses: AtomicU64,
}

impl CacheStats {
    /// Get hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// A node in the LRU linked list.
struct LruNode<V> {
    key: u64,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

struct LruInner<V> {
    /// Maximum number of entries.
    capacity: usize,
    /// Map from key to node index.
    map: HashMap<u64, usize>,
    /// Node storage (indices instead of pointers).
    nodes: Vec<Option<LruNode<V>>>,
    /// Free list of node indices.
    free_list: Vec<usize>,
    /// Most recently used.
    head: Option<usize>,
    /// Least recently used.
    tail: Option<usize>,
}

impl<V: Clone> LruInner<V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            head: None,
            tail: None,
        }
    }

    fn get(&mut self, key: u64) -> Option<V> {
        if let Some(&idx) = self.map.get(&key) {
            self.move_to_front(idx);
            self.nodes[idx].as_ref().map(|n| n.value.clone())
        } else {
            None
        }
    }

    fn insert(&mut self, key: u64, value: V) {
        if let Some(&idx) = self.map.get(&key) {
            if let Some(ref mut node) = self.nodes[idx] {
                node.value = value;
            }
            self.move_to_front(idx);
            return;
        }

        if self.map.len() >= self.capacity {
            self.evict_lru();
        }

        let idx = self.allocate_node();
        self.nodes[idx] = Some(LruNode {
            key,
            value,
            prev: None,
            next: self.head,
        });

        if let Some(head_idx) = self.head {
            if let Some(ref mut head_node) = self.nodes[head_idx] {
                head_node.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }

        self.map.insert(key, idx);
    }

    fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
    }

    fn allocate_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }

        let (prev, next) = {
            let node = self.nodes[idx].as_ref().unwrap();
            (node.prev, node.next)
        };

        if let Some(prev_idx) = prev {
            if let Some(ref mut prev_node) = self.nodes[prev_idx] {
                prev_node.next = next;
            }
        }

        if let Some(next_idx) = next {
            if let Some(ref mut next_node) = self.nodes[next_idx] {
                next_node.prev = prev;
            }
        }

        if self.tail == Some(idx) {
            self.tail = prev;
        }

        if let Some(ref mut node) = self.nodes[idx] {
            node.prev = None;
            node.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(ref mut head_node) = self.nodes[head_idx] {
                head_node.prev = Some(idx);
            }
        }

        self.head = Some(idx);
    }

    fn evict_lru(&mut self) {
        if let Some(tail_idx) = self.tail {
            let key = self.nodes[tail_idx].as_ref().unwrap().key;
            self.map.remove(&key);
            self.unlink_node(tail_idx);
            self.free_list.push(tail_idx);
        }
    }

    fn unlink_node(&mut self, idx: usize) {
        let (prev, next) = match self.nodes[idx].take() {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        if let Some(prev_idx) = prev {
            if let Some(ref mut prev_node) = self.nodes[prev_idx] {
                prev_node.next = next;
            }
        } else {
            self.head = next;
        }

        if let Some(next_idx) = next {
            if let Some(ref mut next_node) = self.nodes[next_idx] {
                next_node.prev = prev;
            }
        } else {
            self.tail = prev;
        }
    }
}

/// A thread-safe bounded LRU cache with `u64` keys.
pub struct LruCache<V> {
    inner: Mutex<LruInner<V>>,
    stats: Arc<CacheStats>,
}

impl<V: Clone> LruCache<V> {
    /// Create a new cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruInner::new(capacity.max(1))),
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Get a value from the cache, marking it most recently used.
    pub fn get(&self, key: u64) -> Option<V> {
        let result = self.inner.lock().get(key);

        if result.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }

        result
    }

    /// Insert a value, evicting the least recently used entry when full.
    pub fn insert(&self, key: u64, value: V) {
        self.inner.lock().insert(key, value);
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Get cache statistics.
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }
}
