// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Sync/FollowUp/DelayReq/DelayResp exchange: tracks `t1..t4` for one
//! measurement cycle and turns them into a raw offset and path delay.

use super::message::{Header, PortIdentity};

/// `raw_offset = ((t2-t1) - (t4-t3)) / 2`, `path_delay = max(0, ((t2-t1) +
/// (t4-t3)) / 2)`, both in 100 ns units.
pub fn compute(t1: i64, t2: i64, t3: i64, t4: i64) -> (i64, i64) {
    let master_to_follower = t2 - t1;
    let follower_to_master = t4 - t3;
    let raw_offset = (master_to_follower - follower_to_master) / 2;
    let path_delay = ((master_to_follower + follower_to_master) / 2).max(0);
    (raw_offset, path_delay)
}

/// Per-cycle exchange state plus the one piece of state that outlives every
/// cycle: `epoch_baseline`, fixed from the very first completed sample.
pub struct ExchangeState {
    domain: u8,
    our_port_identity: PortIdentity,
    master_identity: Option<PortIdentity>,
    sequence: Option<u16>,
    t1: Option<i64>,
    t2: Option<i64>,
    t3: Option<i64>,
    t4: Option<i64>,
    epoch_baseline: Option<i64>,
    last_path_delay: i64,
}

impl ExchangeState {
    pub fn new(domain: u8, our_port_identity: PortIdentity) -> Self {
        ExchangeState {
            domain,
            our_port_identity,
            master_identity: None,
            sequence: None,
            t1: None,
            t2: None,
            t3: None,
            t4: None,
            epoch_baseline: None,
            last_path_delay: 0,
        }
    }

    pub fn last_path_delay(&self) -> i64 {
        self.last_path_delay
    }

    fn accepts(&self, header: &Header) -> bool {
        header.domain == self.domain
    }

    /// `Sync`. `origin_timestamp` is `Some` only for a one-step Sync
    /// (carries its own origin timestamp); for two-step, `t1` instead comes
    /// from the matching `FollowUp`.
    pub fn on_sync(&mut self, header: &Header, origin_timestamp: Option<i64>, local_receipt: i64) {
        if !self.accepts(header) {
            return;
        }
        self.t2 = Some(local_receipt);
        self.sequence = Some(header.sequence_id);
        self.master_identity = Some(header.source_port_identity);
        if !header.two_step() {
            self.t1 = origin_timestamp;
        }
    }

    pub fn on_followup(&mut self, header: &Header, precise_origin_timestamp: i64) {
        if !self.accepts(header) || self.sequence != Some(header.sequence_id) {
            return;
        }
        self.t1 = Some(precise_origin_timestamp + header.correction_100ns());
    }

    /// Whether both `t1` and `t2` are known and a `DelayReq` should be sent.
    pub fn ready_to_send_delay_req(&self) -> bool {
        self.t1.is_some() && self.t2.is_some() && self.t3.is_none()
    }

    pub fn on_delay_req_sent(&mut self, local_transmit: i64) {
        self.t3 = Some(local_transmit);
    }

    /// `DelayResp`. `requesting_port_identity` is the body field the
    /// follower matches against its own port identity to recognize the
    /// response as its own.
    pub fn on_delay_resp(&mut self, header: &Header, receive_timestamp: i64, requesting_port_identity: PortIdentity) {
        if !self.accepts(header) || requesting_port_identity != self.our_port_identity {
            return;
        }
        self.t4 = Some(receive_timestamp);
    }

    /// If all four timestamps are known, computes drift (feedable to the
    /// servo) and resets the cycle. `epoch_baseline` is set once, from the
    /// first completed cycle ever, and never adjusted afterward — a known
    /// limitation: a single glitchy first sample permanently biases it.
    pub fn take_drift_sample(&mut self) -> Option<i64> {
        let (t1, t2, t3, t4) = (self.t1?, self.t2?, self.t3?, self.t4?);
        let (raw_offset, path_delay) = compute(t1, t2, t3, t4);
        self.last_path_delay = path_delay;
        self.t1 = None;
        self.t2 = None;
        self.t3 = None;
        self.t4 = None;
        self.sequence = None;
        Some(match self.epoch_baseline {
            None => {
                self.epoch_baseline = Some(raw_offset);
                0
            }
            Some(baseline) => raw_offset - baseline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_worked_example() {
        let (raw_offset, path_delay) = compute(1000, 1100, 1200, 1250);
        assert_eq!(raw_offset, 25);
        assert_eq!(path_delay, 75);
    }

    #[test]
    fn first_sample_sets_baseline_and_reports_zero_drift() {
        let mut state = ExchangeState::new(0, [0u8; 10]);
        state.t1 = Some(1000);
        state.t2 = Some(1100);
        state.t3 = Some(1200);
        state.t4 = Some(1250);
        let drift = state.take_drift_sample().unwrap();
        assert_eq!(drift, 0);
        assert_eq!(state.epoch_baseline, Some(25));
    }
}
