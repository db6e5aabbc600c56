//! Process-wide pool of reusable byte buffers.
//!
//! The write path rents one scratch buffer per chunk (at most a block plus a
//! header), serializes the frame into it, appends it to the segment file, and
//! returns it. The read path rents block-sized buffers for positional reads.
//! Pooling keeps the hot paths free of per-call allocations.

use std::sync::OnceLock;

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::{BLOCK_SIZE, CHUNK_HEADER_SIZE};

/// Maximum number of buffers retained by the pool.
const MAX_POOLED: usize = 64;

/// Buffers that grew beyond this capacity are dropped instead of retained.
const MAX_RETAINED_CAPACITY: usize = BLOCK_SIZE + CHUNK_HEADER_SIZE;

/// A bounded pool of `BytesMut` scratch buffers.
pub(crate) struct BufferPool {
    buffers: Mutex<Vec<BytesMut>>,
}

impl BufferPool {
    fn new() -> Self {
        Self {
            buffers: Mutex::new(Vec::with_capacity(MAX_POOLED)),
        }
    }

    /// Rent a cleared buffer with at least one block of capacity.
    pub fn get(&self) -> BytesMut {
        if let Some(buf) = self.buffers.lock().pop() {
            return buf;
        }
        BytesMut::with_capacity(MAX_RETAINED_CAPACITY)
    }

    /// Return a buffer to the pool.
    pub fn put(&self, mut buf: BytesMut) {
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        buf.clear();

        let mut buffers = self.buffers.lock();
        if buffers.len() < MAX_POOLED {
            buffers.push(buf);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.buffers.lock().len()
    }
}

/// The process-wide pool instance.
pub(crate) fn pool() -> &'static BufferPool {
    static POOL: OnceLock<BufferPool> = OnceLock::new();
    POOL.get_or_init(BufferPool::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rent_and_return() {
        let pool = BufferPool::new();

        let mut buf = pool.get();
        buf.extend_from_slice(b"scratch");
        pool.put(buf);
        assert_eq!(pool.len(), 1);

        // The returned buffer comes back cleared.
        let buf = pool.get();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= BLOCK_SIZE);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn test_oversized_buffers_are_dropped() {
        let pool = BufferPool::new();
        pool.put(BytesMut::with_capacity(MAX_RETAINED_CAPACITY * 4));
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn test_pool_depth_is_bounded() {
        let pool = BufferPool::new();
        for _ in 0..MAX_POOLED * 2 {
            pool.put(BytesMut::with_capacity(16));
        }
        assert_eq!(pool.len(), MAX_POOLED);
    }

    #[test]
    fn test_concurrent_access() {
        let pool = pool();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let mut buf = pool.get();
                        buf.extend_from_slice(&[0u8; 64]);
                        pool.put(buf);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
