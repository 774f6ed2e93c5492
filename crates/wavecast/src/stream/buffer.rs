//! Bounded audio ring buffer
//!
//! Byte FIFO shared between the network context (producer) and the playback
//! context (consumer). All operations are non-blocking: `put` truncates when
//! the buffer is full and reports how much was accepted, `get` returns what
//! is available. One internal mutex serializes index and count mutation; no
//! other state is shared between the two contexts.

use std::sync::{Mutex, PoisonError};

use crate::error::{RadioError, Result};

/// Storage and indices, present only between `init` and `destroy`
struct Ring {
    buf: Box<[u8]>,
    count: usize,
    head: usize,
    tail: usize,
    max_count: usize,
}

/// Shared byte queue with a runtime `init`/`destroy` lifecycle.
///
/// Every operation on an uninitialized or destroyed buffer fails with
/// `NotReady`, mirroring how the playback context must tolerate the
/// controller tearing the stream down underneath it.
pub struct RingBuffer {
    inner: Mutex<Option<Ring>>,
}

impl RingBuffer {
    /// Create an uninitialized buffer; call `init` before use.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Ring>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate storage. Fails with `AlreadyInitialized` on a second call
    /// and `OutOfMemory` if the allocation cannot be satisfied.
    pub fn init(&self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(RadioError::Config("ring capacity must be non-zero".into()));
        }
        let mut inner = self.lock();
        if inner.is_some() {
            return Err(RadioError::AlreadyInitialized);
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| RadioError::OutOfMemory(format!("{capacity} bytes")))?;
        buf.resize(capacity, 0);
        *inner = Some(Ring {
            buf: buf.into_boxed_slice(),
            count: 0,
            head: 0,
            tail: 0,
            max_count: 0,
        });
        Ok(())
    }

    /// Release storage; subsequent operations fail with `NotReady`.
    pub fn destroy(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.is_none() {
            return Err(RadioError::NotReady);
        }
        *inner = None;
        Ok(())
    }

    /// Reset to empty. Used when a stream is discarded; safe to call while
    /// the playback context is draining.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.lock();
        let ring = inner.as_mut().ok_or(RadioError::NotReady)?;
        ring.count = 0;
        ring.head = 0;
        ring.tail = 0;
        ring.max_count = 0;
        Ok(())
    }

    /// Copy in as much of `data` as fits; returns the number of bytes
    /// accepted. Excess bytes are dropped, the caller retries the remainder.
    pub fn put(&self, data: &[u8]) -> Result<usize> {
        let mut inner = self.lock();
        let ring = inner.as_mut().ok_or(RadioError::NotReady)?;
        let cap = ring.buf.len();
        let accept = data.len().min(cap - ring.count);
        let first = accept.min(cap - ring.head);
        ring.buf[ring.head..ring.head + first].copy_from_slice(&data[..first]);
        if accept > first {
            ring.buf[..accept - first].copy_from_slice(&data[first..accept]);
        }
        ring.head = (ring.head + accept) % cap;
        ring.count += accept;
        if ring.max_count < ring.count {
            ring.max_count = ring.count;
        }
        Ok(accept)
    }

    /// Copy out up to `out.len()` bytes in FIFO order; returns the number of
    /// bytes written into `out`. Returns 0 when empty.
    pub fn get(&self, out: &mut [u8]) -> Result<usize> {
        let mut inner = self.lock();
        let ring = inner.as_mut().ok_or(RadioError::NotReady)?;
        let cap = ring.buf.len();
        let take = out.len().min(ring.count);
        let first = take.min(cap - ring.tail);
        out[..first].copy_from_slice(&ring.buf[ring.tail..ring.tail + first]);
        if take > first {
            out[first..take].copy_from_slice(&ring.buf[..take - first]);
        }
        ring.tail = (ring.tail + take) % cap;
        ring.count -= take;
        Ok(take)
    }

    /// Fill level 0..=100 with integer truncation
    pub fn percentage_fill(&self) -> Result<u8> {
        let inner = self.lock();
        let ring = inner.as_ref().ok_or(RadioError::NotReady)?;
        Ok((ring.count * 100 / ring.buf.len()) as u8)
    }

    /// Highest fill in bytes since `init` or the last `clear`
    pub fn high_water_mark(&self) -> Result<usize> {
        let inner = self.lock();
        let ring = inner.as_ref().ok_or(RadioError::NotReady)?;
        Ok(ring.max_count)
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}
