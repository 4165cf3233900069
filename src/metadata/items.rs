// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured payload layouts for the reserved typed-metadata item IDs.
//! Each type's `to_bytes`/`from_bytes` pair matches the worked wire examples
//! exactly: multi-byte fields are little-endian, confirmed by the SCTE-104
//! vector (`op=0, event=0xDEADBEEF, pts=0x00010000` encodes as
//! `00 EF BE AD DE 00 00 01 00 01`).

use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameRateIndex {
    Fps24 = 0,
    Fps25 = 1,
    Fps30 = 2,
    Fps60 = 3,
}

impl FrameRateIndex {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => FrameRateIndex::Fps24,
            1 => FrameRateIndex::Fps25,
            2 => FrameRateIndex::Fps30,
            _ => FrameRateIndex::Fps60,
        }
    }
}

/// SMPTE-style timecode: type ID `0x0001`, 5-byte payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timecode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
    pub drop_frame: bool,
    pub color_frame: bool,
    pub field_mark: bool,
    pub frame_rate: FrameRateIndex,
}

impl Timecode {
    pub fn to_bytes(&self) -> [u8; 5] {
        let mut flags = 0u8;
        flags |= self.drop_frame as u8;
        flags |= (self.color_frame as u8) << 1;
        flags |= (self.field_mark as u8) << 2;
        flags |= (self.frame_rate as u8) << 3;
        [self.hours, self.minutes, self.seconds, self.frames, flags]
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, Error> {
        if b.len() != 5 {
            return Err(Error::wire_decode("timecode item must be 5 bytes"));
        }
        let flags = b[4];
        Ok(Timecode {
            hours: b[0],
            minutes: b[1],
            seconds: b[2],
            frames: b[3],
            drop_frame: flags & 0b1 != 0,
            color_frame: flags & 0b10 != 0,
            field_mark: flags & 0b100 != 0,
            frame_rate: FrameRateIndex::from_bits(flags >> 3),
        })
    }
}

/// SCTE-104 splice command: type ID `0x0004`, 10-byte payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scte104 {
    pub op: u8,
    pub splice_event_id: u32,
    pub pts_offset: u32,
    pub auto_return: u8,
}

impl Scte104 {
    pub fn to_bytes(&self) -> [u8; 10] {
        let mut buf = [0u8; 10];
        buf[0] = self.op;
        buf[1..5].copy_from_slice(&self.splice_event_id.to_le_bytes());
        buf[5..9].copy_from_slice(&self.pts_offset.to_le_bytes());
        buf[9] = self.auto_return;
        buf
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, Error> {
        if b.len() != 10 {
            return Err(Error::wire_decode("scte-104 item must be 10 bytes"));
        }
        Ok(Scte104 {
            op: b[0],
            splice_event_id: u32::from_le_bytes([b[1], b[2], b[3], b[4]]),
            pts_offset: u32::from_le_bytes([b[5], b[6], b[7], b[8]]),
            auto_return: b[9],
        })
    }
}

/// Active Format Description + bar data: type ID `0x0005`, 6-byte payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AfdBar {
    pub afd: u8,
    pub aspect: u8,
    pub bar_top: u16,
    pub bar_bottom: u16,
}

impl AfdBar {
    pub fn to_bytes(&self) -> [u8; 6] {
        let mut buf = [0u8; 6];
        buf[0] = self.afd;
        buf[1] = self.aspect;
        buf[2..4].copy_from_slice(&self.bar_top.to_le_bytes());
        buf[4..6].copy_from_slice(&self.bar_bottom.to_le_bytes());
        buf
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, Error> {
        if b.len() != 6 {
            return Err(Error::wire_decode("afd+bar item must be 6 bytes"));
        }
        Ok(AfdBar {
            afd: b[0],
            aspect: b[1],
            bar_top: u16::from_le_bytes([b[2], b[3]]),
            bar_bottom: u16::from_le_bytes([b[4], b[5]]),
        })
    }
}

/// Per-item tally state: type ID `0x0006`, 2-byte payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tally {
    pub preview: bool,
    pub program: bool,
}

impl Tally {
    pub fn to_bytes(&self) -> [u8; 2] {
        [self.preview as u8, self.program as u8]
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, Error> {
        if b.len() != 2 {
            return Err(Error::wire_decode("tally item must be 2 bytes"));
        }
        Ok(Tally {
            preview: b[0] != 0,
            program: b[1] != 0,
        })
    }
}
