// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time sources and the per-kind outbound timestamp stamper.
//!
//! A [`TimeSource`] exposes a 100ns-resolution clock that may be
//! PTP-disciplined; [`ClockAdapter`] turns readings from one into
//! non-decreasing, evenly-spaced timestamps per frame kind, and
//! [`extend_timestamp`] widens a 32-bit wire timestamp back out using a
//! reference full-resolution time, the way an RTP timestamp gets its epoch
//! reattached once a session has a timeline to anchor it to.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use once_cell::sync::OnceCell;

use crate::ptp::PtpFollower;

/// Exposes the current time in 100ns units, plus synchronization status.
/// Implementations must be `Send + Sync`: the same source is shared across
/// every channel and the sender's `ClockAdapter`s.
pub trait TimeSource: Send + Sync {
    fn now_100ns(&self) -> i64;
    fn elapsed_ms(&self) -> i64;
    fn is_synchronized(&self) -> bool;
    fn offset_microseconds(&self) -> f64;
    fn reset(&self);
}

/// A monotonic steady clock since construction, undisciplined by any
/// network time source.
pub struct LocalClock {
    epoch: OnceCell<Instant>,
}

impl LocalClock {
    pub fn new() -> Self {
        let clock = LocalClock {
            epoch: OnceCell::new(),
        };
        let _ = clock.epoch.set(Instant::now());
        clock
    }

    fn epoch(&self) -> Instant {
        *self.epoch.get_or_init(Instant::now)
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for LocalClock {
    fn now_100ns(&self) -> i64 {
        self.epoch().elapsed().as_nanos() as i64 / 100
    }

    fn elapsed_ms(&self) -> i64 {
        self.epoch().elapsed().as_millis() as i64
    }

    fn is_synchronized(&self) -> bool {
        false
    }

    fn offset_microseconds(&self) -> f64 {
        0.0
    }

    fn reset(&self) {
        // A local clock has no external reference to re-anchor to; resetting
        // it would only discard its own monotonic guarantee, so this is a
        // deliberate no-op.
    }
}

/// The local clock minus the PTP follower's accumulated `clock_correction`,
/// tracking the grandmaster.
pub struct PtpDisciplinedClock {
    local: LocalClock,
    ptp: std::sync::Arc<PtpFollower>,
}

impl PtpDisciplinedClock {
    pub fn new(ptp: std::sync::Arc<PtpFollower>) -> Self {
        PtpDisciplinedClock {
            local: LocalClock::new(),
            ptp,
        }
    }
}

impl TimeSource for PtpDisciplinedClock {
    fn now_100ns(&self) -> i64 {
        self.local.now_100ns() - self.ptp.clock_correction()
    }

    fn elapsed_ms(&self) -> i64 {
        self.local.elapsed_ms()
    }

    fn is_synchronized(&self) -> bool {
        self.ptp.is_locked()
    }

    fn offset_microseconds(&self) -> f64 {
        self.ptp.clock_correction() as f64 / 10.0
    }

    fn reset(&self) {
        self.local.reset();
    }
}

/// Stamps outbound frames of one kind with timestamps that never decrease,
/// nominally spaced by the kind's nominal sample interval, derived from a
/// shared [`TimeSource`]. Guards against the source stepping backwards (a
/// PTP step correction) by clamping to `last + 1`.
pub struct ClockAdapter {
    last: AtomicI64,
}

impl ClockAdapter {
    pub fn new() -> Self {
        ClockAdapter {
            last: AtomicI64::new(i64::MIN),
        }
    }

    /// Returns the next timestamp to stamp on an outbound frame, given the
    /// time source's current reading. Never decreases across calls.
    pub fn next_timestamp(&self, source: &dyn TimeSource) -> i64 {
        let now = source.now_100ns();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

impl Default for ClockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Widens a 32-bit wire timestamp back to a full 100ns-resolution value,
/// given a `reference` full-resolution time believed to be close to the
/// frame's true timestamp (e.g. the channel's last full timestamp, or the
/// local clock at receipt). Picks the candidate nearest `reference` among
/// the wraps adjacent to it, the same "nearest epoch" trick an RTP
/// timestamp extender uses for its 32-bit clock.
pub fn extend_timestamp(wire: u32, reference: i64) -> i64 {
    let span = 1i64 << 32;
    let base = reference & !(span - 1);
    let candidates = [base - span, base, base + span];
    candidates
        .into_iter()
        .map(|c| c + wire as i64)
        .min_by_key(|candidate| (candidate - reference).abs())
        .expect("three candidates always present")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(AtomicI64);

    impl TimeSource for FixedSource {
        fn now_100ns(&self) -> i64 {
            self.0.load(Ordering::Relaxed)
        }
        fn elapsed_ms(&self) -> i64 {
            0
        }
        fn is_synchronized(&self) -> bool {
            true
        }
        fn offset_microseconds(&self) -> f64 {
            0.0
        }
        fn reset(&self) {}
    }

    #[test]
    fn clock_adapter_never_decreases() {
        let adapter = ClockAdapter::new();
        let source = FixedSource(AtomicI64::new(1000));
        let a = adapter.next_timestamp(&source);
        source.0.store(500, Ordering::Relaxed); // source stepped backwards
        let b = adapter.next_timestamp(&source);
        assert!(b > a);
    }

    #[test]
    fn extend_timestamp_picks_nearest_epoch() {
        let reference = (1i64 << 32) + 100;
        let wire = 50u32; // wrapped just past the 32-bit boundary
        let extended = extend_timestamp(wire, reference);
        assert_eq!(extended, (1i64 << 32) + 50);
    }
}
