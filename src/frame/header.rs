// SPDX-License-Identifier: MIT OR Apache-2.0

//! The 16-byte common frame header and the three kind-specific extended
//! headers. All multi-byte integers are little-endian on the wire; the
//! codec here is purely functional over a caller-owned buffer, allocating
//! nothing (testable property 1: header round-trip; property 2: length
//! invariant `buffer_length = 16 + E + P`).

use bytes::{Buf, BufMut};

use crate::types::{CodecId, ColorSpace, FrameKind, VideoFlags};
use crate::Error;

/// Identifies OMT framing at the start of every common header.
pub const MAGIC: [u8; 2] = [0x4F, 0x4D];

/// Size of the common header, before any extended header or payload.
pub const HEADER_LEN: usize = 16;

pub const VIDEO_EXTENDED_LEN: usize = 19;
pub const AUDIO_EXTENDED_LEN: usize = 14;

/// Per-kind payload+extended-header cap; a declared length exceeding this
/// is a `LengthOverflow` protocol error.
pub const VIDEO_PAYLOAD_CAP: usize = 64 * 1024 * 1024;
pub const AUDIO_PAYLOAD_CAP: usize = 4 * 1024 * 1024;
pub const METADATA_PAYLOAD_CAP: usize = 256 * 1024;

pub(crate) fn payload_cap(kind: FrameKind) -> usize {
    match kind {
        FrameKind::Video => VIDEO_PAYLOAD_CAP,
        FrameKind::Audio => AUDIO_PAYLOAD_CAP,
        FrameKind::Metadata => METADATA_PAYLOAD_CAP,
    }
}

/// The parsed common header: everything needed to know how many more bytes
/// to read and how to interpret them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommonHeader {
    pub kind: FrameKind,
    pub codec: CodecId,
    pub extended_len: u16,
    pub payload_len: u32,
    pub preview: bool,
    /// Low 32 bits of the frame's 100ns timestamp, as carried on the wire.
    pub timestamp_low: u32,
}

impl CommonHeader {
    /// Total on-wire length of this frame: `16 + E + P`.
    pub fn total_len(&self) -> usize {
        HEADER_LEN + self.extended_len as usize + self.payload_len as usize
    }
}

/// Writes the 16-byte common header into `buf[offset..offset+16]`. `buf`
/// must have at least that much room; the caller owns the offset.
pub fn write_common_header(buf: &mut [u8], offset: usize, header: &CommonHeader) {
    let mut w = &mut buf[offset..offset + HEADER_LEN];
    w.put_slice(&MAGIC);
    w.put_u8(header.kind.wire_tag());
    w.put_u8(header.codec.wire_tag());
    w.put_u16_le(header.extended_len);
    w.put_u32_le(header.payload_len);
    w.put_u8(header.preview as u8);
    w.put_u8(0); // reserved
    w.put_u32_le(header.timestamp_low);
}

/// Reads and validates the 16-byte common header at `buf[offset..]`.
pub fn read_common_header(buf: &[u8], offset: usize) -> Result<CommonHeader, Error> {
    if buf.len() < offset + HEADER_LEN {
        return Err(Error::wire_decode("buffer too short for common header"));
    }
    let mut r = &buf[offset..offset + HEADER_LEN];
    let mut magic = [0u8; 2];
    r.copy_to_slice(&mut magic);
    if magic != MAGIC {
        return Err(Error::wire_decode(format!(
            "bad magic {magic:02x?}, expected {MAGIC:02x?}"
        )));
    }
    let kind_tag = r.get_u8();
    let kind = FrameKind::from_wire(kind_tag)
        .ok_or_else(|| Error::wire_decode(format!("unknown frame kind tag {kind_tag}")))?;
    let codec_tag = r.get_u8();
    let codec = CodecId::from_wire(codec_tag)
        .ok_or_else(|| Error::wire_decode(format!("unknown codec tag {codec_tag}")))?;
    let extended_len = r.get_u16_le();
    let payload_len = r.get_u32_le();
    let preview = r.get_u8() != 0;
    let _reserved = r.get_u8();
    let timestamp_low = r.get_u32_le();

    let header = CommonHeader {
        kind,
        codec,
        extended_len,
        payload_len,
        preview,
        timestamp_low,
    };
    let cap = payload_cap(kind);
    if (header.extended_len as usize) + (header.payload_len as usize) > cap {
        return Err(Error::wire_decode(format!(
            "declared length {} exceeds {kind:?} cap of {cap}",
            header.extended_len as usize + header.payload_len as usize
        )));
    }
    Ok(header)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoExtendedHeader {
    pub width: u16,
    pub height: u16,
    pub fps_numerator: u32,
    pub fps_denominator: u32,
    pub aspect_ratio_numerator: u16,
    pub aspect_ratio_denominator: u16,
    pub flags: VideoFlags,
    pub colorspace: ColorSpace,
    pub codec: CodecId,
}

impl VideoExtendedHeader {
    pub fn write(&self, buf: &mut [u8], offset: usize) {
        let mut w = &mut buf[offset..offset + VIDEO_EXTENDED_LEN];
        w.put_u16_le(self.width);
        w.put_u16_le(self.height);
        w.put_u32_le(self.fps_numerator);
        w.put_u32_le(self.fps_denominator);
        w.put_u16_le(self.aspect_ratio_numerator);
        w.put_u16_le(self.aspect_ratio_denominator);
        w.put_u8(self.flags.bits());
        w.put_u8(self.colorspace.wire_tag());
        w.put_u8(self.codec.wire_tag());
    }

    pub fn read(buf: &[u8], offset: usize) -> Result<Self, Error> {
        if buf.len() < offset + VIDEO_EXTENDED_LEN {
            return Err(Error::wire_decode("buffer too short for video extended header"));
        }
        let mut r = &buf[offset..offset + VIDEO_EXTENDED_LEN];
        let width = r.get_u16_le();
        let height = r.get_u16_le();
        let fps_numerator = r.get_u32_le();
        let fps_denominator = r.get_u32_le();
        let aspect_ratio_numerator = r.get_u16_le();
        let aspect_ratio_denominator = r.get_u16_le();
        let flags_bits = r.get_u8();
        let flags = VideoFlags::from_bits_truncate(flags_bits);
        let colorspace_tag = r.get_u8();
        let colorspace = ColorSpace::from_wire(colorspace_tag)
            .ok_or_else(|| Error::wire_decode(format!("unknown colorspace tag {colorspace_tag}")))?;
        let codec_tag = r.get_u8();
        let codec = CodecId::from_wire(codec_tag)
            .ok_or_else(|| Error::wire_decode(format!("unknown codec tag {codec_tag}")))?;
        Ok(VideoExtendedHeader {
            width,
            height,
            fps_numerator,
            fps_denominator,
            aspect_ratio_numerator,
            aspect_ratio_denominator,
            flags,
            colorspace,
            codec,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioExtendedHeader {
    pub sample_rate: u32,
    pub channels: u8,
    pub samples_per_channel: u32,
    pub active_channel_mask: u32,
    pub codec: CodecId,
}

impl AudioExtendedHeader {
    pub fn write(&self, buf: &mut [u8], offset: usize) {
        let mut w = &mut buf[offset..offset + AUDIO_EXTENDED_LEN];
        w.put_u32_le(self.sample_rate);
        w.put_u8(self.channels);
        w.put_u32_le(self.samples_per_channel);
        w.put_u32_le(self.active_channel_mask);
        w.put_u8(self.codec.wire_tag());
    }

    pub fn read(buf: &[u8], offset: usize) -> Result<Self, Error> {
        if buf.len() < offset + AUDIO_EXTENDED_LEN {
            return Err(Error::wire_decode("buffer too short for audio extended header"));
        }
        let mut r = &buf[offset..offset + AUDIO_EXTENDED_LEN];
        let sample_rate = r.get_u32_le();
        let channels = r.get_u8();
        let samples_per_channel = r.get_u32_le();
        let active_channel_mask = r.get_u32_le();
        let codec_tag = r.get_u8();
        let codec = CodecId::from_wire(codec_tag)
            .ok_or_else(|| Error::wire_decode(format!("unknown codec tag {codec_tag}")))?;
        Ok(AudioExtendedHeader {
            sample_rate,
            channels,
            samples_per_channel,
            active_channel_mask,
            codec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_header_round_trip() {
        let header = CommonHeader {
            kind: FrameKind::Video,
            codec: CodecId::Av1,
            extended_len: VIDEO_EXTENDED_LEN as u16,
            payload_len: 1234,
            preview: true,
            timestamp_low: 0xdead_beef,
        };
        let mut buf = [0u8; HEADER_LEN];
        write_common_header(&mut buf, 0, &header);
        let parsed = read_common_header(&buf, 0).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = 0;
        buf[1] = 0;
        assert!(read_common_header(&buf, 0).is_err());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..2].copy_from_slice(&MAGIC);
        buf[2] = 0xFF;
        assert!(read_common_header(&buf, 0).is_err());
    }

    #[test]
    fn length_overflow_is_rejected() {
        let header = CommonHeader {
            kind: FrameKind::Metadata,
            codec: CodecId::Uncompressed,
            extended_len: 0,
            payload_len: (METADATA_PAYLOAD_CAP as u32) + 1,
            preview: false,
            timestamp_low: 0,
        };
        let mut buf = [0u8; HEADER_LEN];
        write_common_header(&mut buf, 0, &header);
        assert!(read_common_header(&buf, 0).is_err());
    }

    #[test]
    fn video_extended_header_round_trip() {
        let h = VideoExtendedHeader {
            width: 1920,
            height: 1080,
            fps_numerator: 30000,
            fps_denominator: 1001,
            aspect_ratio_numerator: 16,
            aspect_ratio_denominator: 9,
            flags: VideoFlags::INTERLACED | VideoFlags::PREVIEW,
            colorspace: ColorSpace::Bt709,
            codec: CodecId::Vmx1,
        };
        let mut buf = [0u8; VIDEO_EXTENDED_LEN];
        h.write(&mut buf, 0);
        assert_eq!(VideoExtendedHeader::read(&buf, 0).unwrap(), h);
    }

    #[test]
    fn audio_extended_header_round_trip() {
        let h = AudioExtendedHeader {
            sample_rate: 48_000,
            channels: 2,
            samples_per_channel: 960,
            active_channel_mask: 0b11,
            codec: CodecId::Opus,
        };
        let mut buf = [0u8; AUDIO_EXTENDED_LEN];
        h.write(&mut buf, 0);
        assert_eq!(AudioExtendedHeader::read(&buf, 0).unwrap(), h);
    }
}
