//! Reusable scratch buffers for entry reads.
//!
//! Reading an entry needs a temporary buffer for its compressed bytes.  Under
//! a high read rate those buffers are drawn from here instead of being
//! allocated per read.  Buffers are handed out as [`PooledBuffer`] guards
//! that go back to their pool on `Drop`, so an early `?` return or a panic
//! in the decompressor still returns them.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// Size classes and per-class caps.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_small_buffers:       usize,
    pub max_medium_buffers:      usize,
    pub max_large_buffers:       usize,
    pub small_buffer_threshold:  usize,
    pub medium_buffer_threshold: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_small_buffers:       32,
            max_medium_buffers:      8,
            max_large_buffers:       2,
            small_buffer_threshold:  64 * 1024,
            medium_buffer_threshold: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub small_buffers:  usize,
    pub medium_buffers: usize,
    pub large_buffers:  usize,
}

#[derive(Debug, Default)]
pub struct BufferPool {
    small:  Mutex<VecDeque<Vec<u8>>>,
    medium: Mutex<VecDeque<Vec<u8>>>,
    large:  Mutex<VecDeque<Vec<u8>>>,
    config: PoolConfig,
    closed: AtomicBool,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            small:  Mutex::new(VecDeque::new()),
            medium: Mutex::new(VecDeque::new()),
            large:  Mutex::new(VecDeque::new()),
            config,
            closed: AtomicBool::new(false),
        }
    }

    fn class_for(&self, size: usize) -> (&Mutex<VecDeque<Vec<u8>>>, usize) {
        if size <= self.config.small_buffer_threshold {
            (&self.small, self.config.max_small_buffers)
        } else if size <= self.config.medium_buffer_threshold {
            (&self.medium, self.config.max_medium_buffers)
        } else {
            (&self.large, self.config.max_large_buffers)
        }
    }

    /// A zero-filled buffer of exactly `len` bytes.
    pub fn acquire(&self, len: usize) -> PooledBuffer<'_> {
        let (class, _) = self.class_for(len);
        let mut data = class.lock().pop_front().unwrap_or_default();
        data.clear();
        data.resize(len, 0);
        PooledBuffer { data: Some(data), pool: self }
    }

    fn give_back(&self, data: Vec<u8>) {
        let (class, max) = self.class_for(data.capacity());
        let mut buffers = class.lock();
        // Checked under the class lock so a concurrent `close` cannot miss it.
        if !self.closed.load(Ordering::Acquire) && buffers.len() < max {
            buffers.push_back(data);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            small_buffers:  self.small.lock().len(),
            medium_buffers: self.medium.lock().len(),
            large_buffers:  self.large.lock().len(),
        }
    }

    /// Drop every pooled buffer.
    pub fn clear(&self) {
        self.small.lock().clear();
        self.medium.lock().clear();
        self.large.lock().clear();
    }

    /// Empty the pool and stop taking buffers back.  Loans still outstanding
    /// are freed when dropped instead of being pooled.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.clear();
    }
}

/// Scoped loan from a [`BufferPool`].
pub struct PooledBuffer<'a> {
    data: Option<Vec<u8>>,
    pool: &'a BufferPool,
}

impl Deref for PooledBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.give_back(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_return_on_drop() {
        let pool = BufferPool::new();
        {
            let mut buf = pool.acquire(1024);
            assert_eq!(buf.len(), 1024);
            buf[0] = 7;
        }
        assert_eq!(pool.stats().small_buffers, 1);

        // Reused buffers come back zeroed and resized.
        let buf = pool.acquire(16);
        assert_eq!(&buf[..], &[0u8; 16]);
        assert_eq!(pool.stats().small_buffers, 0);
    }

    #[test]
    fn buffers_return_on_error_paths() {
        let pool = BufferPool::new();
        let failing = || -> Result<(), ()> {
            let _buf = pool.acquire(200 * 1024);
            Err(())
        };
        assert!(failing().is_err());
        assert_eq!(pool.stats().medium_buffers, 1);
    }

    #[test]
    fn closed_pool_drops_late_returns() {
        let pool = BufferPool::new();
        let in_flight = pool.acquire(4096);
        drop(pool.acquire(16));
        pool.close();
        assert_eq!(pool.stats(), PoolStats::default());

        drop(in_flight);
        assert_eq!(pool.stats(), PoolStats::default());
        assert_eq!(pool.acquire(8).len(), 8);
    }

    #[test]
    fn classes_respect_caps() {
        let pool = BufferPool::with_config(PoolConfig {
            max_small_buffers: 1,
            ..PoolConfig::default()
        });
        let a = pool.acquire(10);
        let b = pool.acquire(10);
        drop(a);
        drop(b);
        assert_eq!(pool.stats().small_buffers, 1);
        pool.clear();
        assert_eq!(pool.stats(), PoolStats::default());
    }
}
