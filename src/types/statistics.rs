// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters for one channel, plus deltas since the last
/// [`Statistics::read`]. Cumulative counters only grow; reading snapshots
/// and resets the `*_since_last` fields atomically (property 8 in the
/// testable-properties list).
#[derive(Debug, Default)]
pub(crate) struct Counters {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,

    frames_sent_base: AtomicU64,
    frames_received_base: AtomicU64,
    frames_dropped_base: AtomicU64,
    bytes_sent_base: AtomicU64,
    bytes_received_base: AtomicU64,
}

impl Counters {
    pub(crate) fn add_frame_sent(&self, bytes: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn add_frame_received(&self, bytes: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn add_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshots the cumulative counters and resets the delta bases; returns
    /// a point-in-time [`Statistics`].
    pub(crate) fn read(&self) -> Statistics {
        let frames_sent = self.frames_sent.load(Ordering::Relaxed);
        let frames_received = self.frames_received.load(Ordering::Relaxed);
        let frames_dropped = self.frames_dropped.load(Ordering::Relaxed);
        let bytes_sent = self.bytes_sent.load(Ordering::Relaxed);
        let bytes_received = self.bytes_received.load(Ordering::Relaxed);

        let frames_sent_since_last = frames_sent - self.frames_sent_base.swap(frames_sent, Ordering::Relaxed);
        let frames_received_since_last =
            frames_received - self.frames_received_base.swap(frames_received, Ordering::Relaxed);
        let frames_dropped_since_last =
            frames_dropped - self.frames_dropped_base.swap(frames_dropped, Ordering::Relaxed);
        let bytes_sent_since_last = bytes_sent - self.bytes_sent_base.swap(bytes_sent, Ordering::Relaxed);
        let bytes_received_since_last =
            bytes_received - self.bytes_received_base.swap(bytes_received, Ordering::Relaxed);

        Statistics {
            frames_sent,
            frames_received,
            frames_dropped,
            bytes_sent,
            bytes_received,
            frames_sent_since_last,
            frames_received_since_last,
            frames_dropped_since_last,
            bytes_sent_since_last,
            bytes_received_since_last,
        }
    }
}

/// A point-in-time read of a channel's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,

    pub frames_sent_since_last: u64,
    pub frames_received_since_last: u64,
    pub frames_dropped_since_last: u64,
    pub bytes_sent_since_last: u64,
    pub bytes_received_since_last: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_resets_deltas_but_not_cumulative() {
        let c = Counters::default();
        c.add_frame_sent(100);
        c.add_frame_sent(50);
        let s1 = c.read();
        assert_eq!(s1.frames_sent, 2);
        assert_eq!(s1.frames_sent_since_last, 2);
        assert_eq!(s1.bytes_sent_since_last, 150);

        // A second read with no activity sees zero deltas, but cumulative
        // counters are unchanged.
        let s2 = c.read();
        assert_eq!(s2.frames_sent, 2);
        assert_eq!(s2.frames_sent_since_last, 0);
        assert_eq!(s2.bytes_sent_since_last, 0);

        c.add_frame_received(10);
        let s3 = c.read();
        assert_eq!(s3.frames_sent, 2);
        assert_eq!(s3.frames_received, 1);
        assert_eq!(s3.frames_sent_since_last, 0);
        assert_eq!(s3.frames_received_since_last, 1);
    }
}
