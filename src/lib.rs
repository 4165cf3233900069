// SPDX-License-Identifier: MIT OR Apache-2.0

//! A low-latency professional media transport: wire framing, a typed
//! metadata container, a per-connection channel state machine, and PTP
//! clock discipline, carried over QUIC.
//!
//! The top-level surfaces are [`Sender`] (accepts connections, broadcasts
//! frames) and [`Receiver`] (dials out, subscribes, decodes); [`Channel`]
//! is the per-connection primitive both are built on.

pub mod channel;
pub mod clock;
pub mod codec;
pub mod error;
pub mod frame;
pub mod metadata;
pub mod ptp;
pub mod receiver;
pub mod sender;
pub mod transport;
pub mod types;

pub use channel::{Channel, ChannelEvent};
pub use clock::{ClockAdapter, LocalClock, PtpDisciplinedClock, TimeSource};
pub use error::Error;
pub use frame::{Frame, FramePool, FramePools, OutboundFrame};
pub use ptp::{PtpConfig, PtpFollower};
pub use receiver::{MediaFrame, Receiver};
pub use sender::Sender;
pub use types::{CodecId, ColorSpace, FrameKind, Quality, SenderInfo, Statistics, SubscriptionMask, Tally, VideoFlags};
