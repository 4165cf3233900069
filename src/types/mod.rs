// SPDX-License-Identifier: MIT OR Apache-2.0

//! Small shared enums and value types used across the wire format, the
//! channel state machine, and the sender/receiver surfaces.

mod quality;
mod sender_info;
pub(crate) mod statistics;
mod tally;

pub use quality::Quality;
pub use sender_info::SenderInfo;
pub use statistics::Statistics;
pub use tally::Tally;

/// The closed set of frame kinds. Tags both the wire header and a bit in the
/// subscription mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    Video = 1,
    Audio = 2,
    Metadata = 3,
}

impl FrameKind {
    pub(crate) fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(FrameKind::Video),
            2 => Some(FrameKind::Audio),
            3 => Some(FrameKind::Metadata),
            _ => None,
        }
    }

    pub(crate) fn wire_tag(self) -> u8 {
        self as u8
    }

    /// Index into small per-kind arrays (pools, caps, statistics).
    pub(crate) fn index(self) -> usize {
        match self {
            FrameKind::Video => 0,
            FrameKind::Audio => 1,
            FrameKind::Metadata => 2,
        }
    }

    pub(crate) const COUNT: usize = 3;
}

/// A set over `{Video, Audio, Metadata}`, kept per channel on the sending
/// side. Metadata frames bypass this mask entirely (see [`SubscriptionMask::allows`]).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionMask(u8);

impl SubscriptionMask {
    pub const EMPTY: Self = SubscriptionMask(0);

    pub fn insert(&mut self, kind: FrameKind) {
        self.0 |= 1 << kind.wire_tag();
    }

    pub fn contains(&self, kind: FrameKind) -> bool {
        self.0 & (1 << kind.wire_tag()) != 0
    }

    /// A frame is sent to a channel iff its kind is in the mask; Metadata is
    /// always allowed regardless of mask state (it's the protocol's own
    /// control plane).
    pub fn allows(&self, kind: FrameKind) -> bool {
        kind == FrameKind::Metadata || self.contains(kind)
    }
}

/// The fixed codec identifier carried on the wire. Codec negotiation beyond
/// this enum is out of scope; actual encode/decode is an external
/// collaborator (see [`crate::codec`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CodecId {
    /// Uncompressed / passthrough planar-float or packed samples.
    Uncompressed = 0,
    Vmx1 = 1,
    Av1 = 2,
    Opus = 3,
}

impl CodecId {
    pub(crate) fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(CodecId::Uncompressed),
            1 => Some(CodecId::Vmx1),
            2 => Some(CodecId::Av1),
            3 => Some(CodecId::Opus),
            _ => None,
        }
    }

    pub(crate) fn wire_tag(self) -> u8 {
        self as u8
    }

    /// Whether this codec's wire payload is compressed, i.e. the sender
    /// must invoke a [`crate::codec::VideoEncoder`]/[`crate::codec::AudioEncoder`]
    /// on the raw input rather than passing it through unchanged.
    pub fn is_compressed(self) -> bool {
        !matches!(self, CodecId::Uncompressed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ColorSpace {
    Bt601 = 0,
    Bt709 = 1,
    Bt2020 = 2,
}

impl ColorSpace {
    pub(crate) fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ColorSpace::Bt601),
            1 => Some(ColorSpace::Bt709),
            2 => Some(ColorSpace::Bt2020),
            _ => None,
        }
    }

    pub(crate) fn wire_tag(self) -> u8 {
        self as u8
    }
}

bitflags::bitflags! {
    /// Video extended-header flag bitset.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct VideoFlags: u8 {
        const ALPHA          = 0b0000_0001;
        const INTERLACED     = 0b0000_0010;
        const HIGH_BIT_DEPTH = 0b0000_0100;
        const PREVIEW        = 0b0000_1000;
    }
}
