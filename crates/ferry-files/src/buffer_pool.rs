//! Lock-free pool of fixed-size chunk buffers.
//!
//! Reduces per-chunk allocation overhead when a [`crate::splitter::ChunkCursor`]
//! reads the same chunk size repeatedly; pool exhaustion falls back to a
//! fresh allocation rather than blocking.

use crossbeam_queue::ArrayQueue;
use std::sync::Arc;

/// A lock-free pool of pre-allocated, fixed-size buffers.
///
/// Cheap to clone: clones share the same underlying queue via `Arc`.
pub struct BufferPool {
    pool: Arc<ArrayQueue<Vec<u8>>>,
    buffer_size: usize,
}

impl BufferPool {
    /// Pre-allocate `pool_size` buffers of `buffer_size` bytes each.
    #[must_use]
    pub fn new(buffer_size: usize, pool_size: usize) -> Self {
        let pool = Arc::new(ArrayQueue::new(pool_size));
        for _ in 0..pool_size {
            let _ = pool.push(vec![0u8; buffer_size]);
        }
        Self { pool, buffer_size }
    }

    /// Take a buffer from the pool, allocating a fresh one if it is empty.
    #[must_use]
    pub fn acquire(&self) -> Vec<u8> {
        self.pool
            .pop()
            .unwrap_or_else(|| vec![0u8; self.buffer_size])
    }

    /// Return a buffer to the pool. Cleared and resized to `buffer_size`
    /// first; dropped if the pool is already full.
    pub fn release(&self, mut buffer: Vec<u8>) {
        buffer.clear();
        buffer.resize(self.buffer_size, 0);
        let _ = self.pool.push(buffer);
    }

    /// Buffers currently available for `acquire()`.
    #[must_use]
    pub fn available(&self) -> usize {
        self.pool.len()
    }

    /// Fixed size of every buffer this pool manages.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Maximum number of buffers the pool can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }
}

impl Clone for BufferPool {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            buffer_size: self.buffer_size,
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("buffer_size", &self.buffer_size)
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release_roundtrip() {
        let pool = BufferPool::new(1024, 10);
        assert_eq!(pool.available(), 10);

        let buf = pool.acquire();
        assert_eq!(buf.len(), 1024);
        assert_eq!(pool.available(), 9);

        pool.release(buf);
        assert_eq!(pool.available(), 10);
    }

    #[test]
    fn exhaustion_falls_back_to_allocation() {
        let pool = BufferPool::new(1024, 2);
        let _a = pool.acquire();
        let _b = pool.acquire();
        assert_eq!(pool.available(), 0);

        let c = pool.acquire();
        assert_eq!(c.len(), 1024);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn release_clears_and_resizes() {
        let pool = BufferPool::new(1024, 10);
        let mut buf = pool.acquire();
        buf[0] = 42;
        buf.resize(2048, 99);
        pool.release(buf);

        let buf2 = pool.acquire();
        assert_eq!(buf2.len(), 1024);
        assert_eq!(buf2[0], 0);
    }

    #[test]
    fn full_pool_drops_excess_releases() {
        let pool = BufferPool::new(1024, 2);
        pool.release(vec![0u8; 1024]);
        pool.release(vec![0u8; 1024]);
        assert_eq!(pool.available(), 2);
        pool.release(vec![0u8; 1024]);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn concurrent_acquire_release_converges() {
        use std::thread;

        let pool = Arc::new(BufferPool::new(1024, 100));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let buf = pool.acquire();
                        pool.release(buf);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pool.available(), 100);
    }
}
