//! Block cache for segment file blocks.
//!
//! Caches fully written, immutable 32KB blocks to avoid repeated disk reads.
//! The block a segment is currently appending to is never admitted; it would
//! otherwise serve stale snapshots of a still-growing block.

use std::sync::Arc;

use bytes::Bytes;

use crate::BLOCK_SIZE;

use super::lru::{CacheStats, LruCache};

/// Pack a segment id and block number into a single cache key.
#[inline]
fn cache_key(segment_id: u32, block_number: u32) -> u64 {
    ((segment_id as u64) << 32) | block_number as u64
}

/// An LRU cache over immutable segment blocks, keyed by
/// `(segment_id, block_number)` packed into a `u64`.
pub struct BlockCache {
    cache: LruCache<Bytes>,
}

impl BlockCache {
    /// Create a cache from a byte budget. The entry capacity is the number of
    /// whole blocks that fit, rounded up.
    pub fn with_byte_capacity(bytes: u32) -> Self {
        let capacity = (bytes as usize + BLOCK_SIZE - 1) / BLOCK_SIZE;
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// Look up a block.
    pub fn get(&self, segment_id: u32, block_number: u32) -> Option<Bytes> {
        self.cache.get(cache_key(segment_id, block_number))
    }

    /// Admit a block. Callers must only pass fully written, immutable blocks.
    pub fn insert(&self, segment_id: u32, block_number: u32, block: Bytes) {
        debug_assert_eq!(block.len(), BLOCK_SIZE);
        self.cache.insert(cache_key(segment_id, block_number), block);
    }

    /// Drop every cached block.
    pub fn purge(&self) {
        self.cache.clear();
    }

    /// Number of cached blocks.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> Arc<CacheStats> {
        self.cache.stats()
    }
}
