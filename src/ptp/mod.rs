// SPDX-License-Identifier: MIT OR Apache-2.0

//! IEEE 1588-2008 PTP follower: message parsing, the Sync/FollowUp/
//! DelayReq/DelayResp exchange, and the PI servo that disciplines
//! [`crate::clock::PtpDisciplinedClock`].

mod exchange;
mod follower;
mod message;
mod port_identity;
mod servo;

pub use follower::{PtpConfig, PtpFollower, EVENT_PORT, GENERAL_PORT, MULTICAST_GROUP};
pub use servo::{Servo, ServoGains, ServoState};
