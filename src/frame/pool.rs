// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-count ring of reusable backing buffers.
//!
//! `acquire`/`release` never block the caller more than briefly (a short
//! `Mutex` critical section), matching the concurrency model's resource
//! section. Buffers grow on demand up to the kind's cap but never shrink.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::types::FrameKind;

struct Shared {
    free: Mutex<VecDeque<Vec<u8>>>,
    cap: usize,
    count: usize,
    growable: bool,
    disposed: std::sync::atomic::AtomicBool,
}

/// A fixed-count pool of reusable byte buffers for one frame kind.
///
/// Created with `(count, initial_size, growable)`. `acquire` reuses the
/// oldest returned buffer; if none is free and `count` buffers are already
/// outstanding, it returns `None` and the caller (the channel) bumps
/// `frames_dropped`.
#[derive(Clone)]
pub struct FramePool(Arc<Shared>);

/// A buffer checked out of a [`FramePool`].
///
/// Returning it to the pool is explicit via [`FramePool::release`]; `Drop`
/// is a safety net that still returns the backing storage (so a buffer lost
/// to an early return or a panic unwind doesn't shrink the pool), keeping
/// the "pooled buffers never leak" invariant even on unhappy paths.
pub struct PooledBuffer {
    pool: Arc<Shared>,
    buf: Vec<u8>,
}

impl PooledBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Grows the buffer's length to `len`, filling with zero bytes, up to
    /// the pool's cap. Never shrinks.
    pub fn ensure_len(&mut self, len: usize) -> Result<(), crate::Error> {
        if len > self.pool.cap {
            return Err(crate::Error::wire_decode(format!(
                "frame of {len} bytes exceeds pool cap of {}",
                self.pool.cap
            )));
        }
        if self.buf.len() < len {
            self.buf.resize(len, 0);
        }
        Ok(())
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.return_buf(buf);
    }
}

impl Shared {
    fn return_buf(&self, mut buf: Vec<u8>) {
        if self.disposed.load(std::sync::atomic::Ordering::Acquire) {
            return;
        }
        buf.clear();
        let mut free = self.free.lock().unwrap();
        // Bound the free list by `count`; a buffer returned after a config
        // change that shrank `count` is just dropped.
        if free.len() < self.count {
            free.push_back(buf);
        }
    }
}

impl FramePool {
    pub fn new(count: usize, initial_size: usize, growable: bool) -> Self {
        let mut free = VecDeque::with_capacity(count);
        for _ in 0..count {
            free.push_back(Vec::with_capacity(initial_size));
        }
        FramePool(Arc::new(Shared {
            free: Mutex::new(free),
            cap: if growable {
                usize::MAX
            } else {
                initial_size
            },
            count,
            growable,
            disposed: std::sync::atomic::AtomicBool::new(false),
        }))
    }

    /// A pool whose buffers may grow past `initial_size` up to `hard_cap`
    /// bytes (the per-kind payload cap from the wire-format invariants).
    pub fn with_cap(count: usize, initial_size: usize, hard_cap: usize) -> Self {
        FramePool(Arc::new(Shared {
            free: Mutex::new((0..count).map(|_| Vec::with_capacity(initial_size)).collect()),
            cap: hard_cap,
            count,
            growable: true,
            disposed: std::sync::atomic::AtomicBool::new(false),
        }))
    }

    /// Checks out the oldest returned buffer, or `None` if `count` buffers
    /// are already outstanding.
    pub fn acquire(&self) -> Option<PooledBuffer> {
        if self.0.disposed.load(std::sync::atomic::Ordering::Acquire) {
            return None;
        }
        let mut free = self.0.free.lock().unwrap();
        let buf = free.pop_front()?;
        drop(free);
        Some(PooledBuffer {
            pool: self.0.clone(),
            buf,
        })
    }

    /// Explicitly returns a buffer. Equivalent to dropping it; provided for
    /// parity with the pool's operation list and to make call sites read
    /// clearly at the point a frame is done being consumed.
    pub fn release(&self, buf: PooledBuffer) {
        drop(buf);
    }

    /// Drops all free buffers and marks the pool closed: subsequent
    /// `acquire` calls return `None`, and buffers returned after this call
    /// are discarded rather than recycled.
    pub fn dispose(&self) {
        self.0.disposed.store(true, std::sync::atomic::Ordering::Release);
        self.0.free.lock().unwrap().clear();
    }

    pub fn cap(&self) -> usize {
        self.0.cap
    }

    #[cfg(test)]
    fn free_count(&self) -> usize {
        self.0.free.lock().unwrap().len()
    }
}

/// Three independently bounded pools, one per frame kind, so video, audio,
/// and metadata traffic never compete for the same buffers — each kind gets
/// its own count and cap (spec's "separate caps and counts for video vs.
/// audio vs. metadata").
#[derive(Clone)]
pub struct FramePools {
    video: FramePool,
    audio: FramePool,
    metadata: FramePool,
}

impl FramePools {
    pub fn new(video: FramePool, audio: FramePool, metadata: FramePool) -> Self {
        FramePools { video, audio, metadata }
    }

    /// The pool backing frames of `kind`.
    pub fn for_kind(&self, kind: FrameKind) -> &FramePool {
        match kind {
            FrameKind::Video => &self.video,
            FrameKind::Audio => &self.audio,
            FrameKind::Metadata => &self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_exhausts_then_release_recycles() {
        let pool = FramePool::new(2, 64, false);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        drop(a);
        let c = pool.acquire().unwrap();
        drop(b);
        drop(c);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn dispose_stops_future_acquire() {
        let pool = FramePool::new(1, 16, false);
        let buf = pool.acquire().unwrap();
        pool.dispose();
        drop(buf);
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn ensure_len_respects_cap() {
        let pool = FramePool::with_cap(1, 16, 32);
        let mut buf = pool.acquire().unwrap();
        buf.ensure_len(32).unwrap();
        assert_eq!(buf.len(), 32);
        assert!(buf.ensure_len(33).is_err());
    }

    #[test]
    fn exhausting_one_kind_does_not_affect_others() {
        let pools = FramePools::new(
            FramePool::new(1, 16, false),
            FramePool::new(1, 16, false),
            FramePool::new(1, 16, false),
        );
        let _video = pools.for_kind(FrameKind::Video).acquire().unwrap();
        assert!(pools.for_kind(FrameKind::Video).acquire().is_none());
        assert!(pools.for_kind(FrameKind::Audio).acquire().is_some());
        assert!(pools.for_kind(FrameKind::Metadata).acquire().is_some());
    }
}
