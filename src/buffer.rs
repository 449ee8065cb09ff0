//! Pooled byte buffers shared by every request.
//!
//! Source bytes, encoder output and cache payloads all live in buffers rented
//! from one [`BufferPool`]. A [`PooledBuffer`] hands its storage back on drop,
//! so release happens exactly once on every exit path, including errors and
//! responses whose body is dropped by the server after sending.

use bytes::Bytes;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Buffers above this capacity are freed instead of retained.
const MAX_RETAINED_CAPACITY: usize = 16 * 1024 * 1024;

pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    retain: usize,
    rented: AtomicU64,
    returned: AtomicU64,
}

impl BufferPool {
    /// Create a pool that keeps at most `retain` idle buffers around.
    pub fn new(retain: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::with_capacity(retain)),
            retain,
            rented: AtomicU64::new(0),
            returned: AtomicU64::new(0),
        })
    }

    /// Rent an empty buffer with at least `capacity` bytes reserved.
    pub fn rent(self: &Arc<Self>, capacity: usize) -> PooledBuffer {
        let mut buf = self.free.lock().pop().unwrap_or_default();
        buf.reserve(capacity);
        self.rented.fetch_add(1, Ordering::Relaxed);
        PooledBuffer { buf, pool: Arc::clone(self) }
    }

    fn give_back(&self, mut buf: Vec<u8>) {
        self.returned.fetch_add(1, Ordering::Relaxed);
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < self.retain {
            free.push(buf);
        }
    }

    pub fn rented(&self) -> u64 {
        self.rented.load(Ordering::Relaxed)
    }

    pub fn returned(&self) -> u64 {
        self.returned.load(Ordering::Relaxed)
    }

    /// Buffers currently out on loan.
    pub fn outstanding(&self) -> u64 {
        self.rented().saturating_sub(self.returned())
    }

    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

/// A rented buffer. Dereferences to the underlying `Vec<u8>`.
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl PooledBuffer {
    /// Turn the buffer into a response body; storage goes back to the pool
    /// once the last `Bytes` handle is dropped.
    pub fn into_bytes(self) -> Bytes {
        Bytes::from_owner(self)
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.buf));
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer").field("len", &self.buf.len()).finish()
    }
}
