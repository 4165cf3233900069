// SPDX-License-Identifier: MIT OR Apache-2.0

//! Frame assembly: ties the common/extended header codec (`header`) and the
//! receive-side buffer pool (`pool`) together into the `Frame` type that
//! flows between `Channel`, `Sender`, and `Receiver`.

pub mod header;
pub mod pool;

use bytes::{Bytes, BytesMut};

pub use header::{AudioExtendedHeader, VideoExtendedHeader, AUDIO_EXTENDED_LEN, VIDEO_EXTENDED_LEN};
pub use pool::{FramePool, FramePools, PooledBuffer};

use crate::types::{CodecId, FrameKind};
use crate::Error;
use header::{read_common_header, write_common_header, CommonHeader, HEADER_LEN};

/// Kind-specific extended header, or nothing for Metadata frames.
#[derive(Clone, Debug, PartialEq)]
pub enum ExtendedHeader {
    Video(VideoExtendedHeader),
    Audio(AudioExtendedHeader),
    Metadata,
}

impl ExtendedHeader {
    pub fn wire_len(&self) -> u16 {
        match self {
            ExtendedHeader::Video(_) => VIDEO_EXTENDED_LEN as u16,
            ExtendedHeader::Audio(_) => AUDIO_EXTENDED_LEN as u16,
            ExtendedHeader::Metadata => 0,
        }
    }

    fn write(&self, buf: &mut [u8], offset: usize) {
        match self {
            ExtendedHeader::Video(v) => v.write(buf, offset),
            ExtendedHeader::Audio(a) => a.write(buf, offset),
            ExtendedHeader::Metadata => {}
        }
    }

    fn kind(&self) -> FrameKind {
        match self {
            ExtendedHeader::Video(_) => FrameKind::Video,
            ExtendedHeader::Audio(_) => FrameKind::Audio,
            ExtendedHeader::Metadata => FrameKind::Metadata,
        }
    }
}

/// A fully assembled frame: common header fields, kind-specific extended
/// header, and payload. This is what `Channel` enqueues on receive and what
/// `Sender`/`Channel::send` serialize on transmit.
#[derive(Clone, Debug)]
pub struct Frame {
    pub codec: CodecId,
    pub preview: bool,
    /// Full-resolution 100ns timestamp. Only the low 32 bits travel on the
    /// wire; `Channel`'s receive loop widens them back out (see
    /// `crate::clock::extend_timestamp`).
    pub timestamp: i64,
    pub extended: ExtendedHeader,
    pub payload: Bytes,
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        self.extended.kind()
    }

    fn common_header(&self) -> CommonHeader {
        CommonHeader {
            kind: self.kind(),
            codec: self.codec,
            extended_len: self.extended.wire_len(),
            payload_len: self.payload.len() as u32,
            preview: self.preview,
            timestamp_low: self.timestamp as u64 as u32,
        }
    }

    /// Total on-wire length: `16 + E + P`.
    pub fn total_len(&self) -> usize {
        HEADER_LEN + self.extended.wire_len() as usize + self.payload.len()
    }

    /// Writes the 16-byte common header plus the extended header into
    /// `buf[offset..]`. Does not touch the payload; pairs with
    /// [`Frame::write_payload`]. Neither call allocates.
    pub fn write_header(&self, buf: &mut [u8], offset: usize) {
        write_common_header(buf, offset, &self.common_header());
        self.extended.write(buf, offset + HEADER_LEN);
    }

    /// Copies `length` payload bytes into `buf[dst_offset..]`.
    pub fn write_payload(&self, buf: &mut [u8], dst_offset: usize, length: usize) {
        buf[dst_offset..dst_offset + length].copy_from_slice(&self.payload[..length]);
    }

    /// Serializes header and payload into one contiguous buffer, suitable
    /// for a single logical write on the transport stream.
    pub fn encode(&self) -> BytesMut {
        let total = self.total_len();
        let mut buf = BytesMut::zeroed(total);
        self.write_header(&mut buf, 0);
        let body_offset = HEADER_LEN + self.extended.wire_len() as usize;
        self.write_payload(&mut buf, body_offset, self.payload.len());
        buf
    }

    /// Reads just the 16-byte common header at `buf[offset..offset+16]`.
    pub fn read_header(buf: &[u8], offset: usize) -> Result<CommonHeader, Error> {
        read_common_header(buf, offset)
    }

    /// Parses the extended header and payload following a common header
    /// already read at `buf[offset..offset+16]`, producing a fully owned
    /// `Frame`. Copies the payload out of `buf` (the one allocation in this
    /// path); header parsing itself does not allocate.
    pub fn read_extended_and_payload(
        buf: &[u8],
        offset: usize,
        header: &CommonHeader,
    ) -> Result<Frame, Error> {
        let ext_offset = offset + HEADER_LEN;
        let extended = match header.kind {
            FrameKind::Video => {
                ExtendedHeader::Video(VideoExtendedHeader::read(buf, ext_offset)?)
            }
            FrameKind::Audio => {
                ExtendedHeader::Audio(AudioExtendedHeader::read(buf, ext_offset)?)
            }
            FrameKind::Metadata => ExtendedHeader::Metadata,
        };
        let payload_offset = ext_offset + header.extended_len as usize;
        let payload_end = payload_offset + header.payload_len as usize;
        if buf.len() < payload_end {
            return Err(Error::wire_decode("buffer too short for declared payload length"));
        }
        Ok(Frame {
            codec: header.codec,
            preview: header.preview,
            timestamp: header.timestamp_low as i64,
            extended,
            payload: Bytes::copy_from_slice(&buf[payload_offset..payload_end]),
        })
    }

    /// Splits `payload` into `(codec_data, frame_metadata)` using the
    /// trailing 4-byte little-endian length the sender records (see
    /// `Frame::with_frame_metadata`). Frames with no trailing metadata have
    /// a zero trailer and `frame_metadata` is empty.
    pub fn split_frame_metadata(&self) -> (&[u8], &[u8]) {
        let payload = &self.payload[..];
        if payload.len() < 4 {
            return (payload, &[]);
        }
        let (data, trailer) = payload.split_at(payload.len() - 4);
        let meta_len = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]) as usize;
        if meta_len > data.len() {
            // A corrupt or absent trailer; treat the whole payload as codec data.
            return (payload, &[]);
        }
        let (codec_data, rest) = data.split_at(data.len() - meta_len);
        (codec_data, rest)
    }

    /// Appends `frame_metadata` to `codec_data` with the trailing length the
    /// receiver uses to split them back apart.
    pub fn with_frame_metadata(codec_data: &[u8], frame_metadata: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(codec_data.len() + frame_metadata.len() + 4);
        buf.extend_from_slice(codec_data);
        buf.extend_from_slice(frame_metadata);
        buf.extend_from_slice(&(frame_metadata.len() as u32).to_le_bytes());
        buf.freeze()
    }
}

/// A frame as handed to [`crate::sender::Sender::send`] by the producer,
/// before encoding/timestamping/fan-out.
#[derive(Clone, Debug)]
pub enum OutboundFrame {
    Video {
        width: u16,
        height: u16,
        fps_numerator: u32,
        fps_denominator: u32,
        aspect_ratio_numerator: u16,
        aspect_ratio_denominator: u16,
        flags: crate::types::VideoFlags,
        colorspace: crate::types::ColorSpace,
        codec: CodecId,
        /// Always raw pixel data in the producer's native layout. The
        /// sender selects and invokes a [`crate::codec::VideoEncoder`] when
        /// `codec.is_compressed()`; `Uncompressed` passes it through as-is.
        data: Bytes,
        /// Row stride of `data`, in bytes, as the producer laid it out.
        src_stride: u32,
        frame_metadata: Bytes,
    },
    Audio {
        sample_rate: u32,
        channels: u8,
        samples_per_channel: u32,
        active_channel_mask: u32,
        codec: CodecId,
        /// Always raw samples; the sender invokes a
        /// [`crate::codec::AudioEncoder`] when `codec.is_compressed()`.
        data: Bytes,
        frame_metadata: Bytes,
    },
    Metadata {
        data: Bytes,
    },
}

impl OutboundFrame {
    pub fn kind(&self) -> FrameKind {
        match self {
            OutboundFrame::Video { .. } => FrameKind::Video,
            OutboundFrame::Audio { .. } => FrameKind::Audio,
            OutboundFrame::Metadata { .. } => FrameKind::Metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColorSpace, VideoFlags};

    #[test]
    fn frame_encode_matches_total_len() {
        let f = Frame {
            codec: CodecId::Uncompressed,
            preview: false,
            timestamp: 42,
            extended: ExtendedHeader::Video(VideoExtendedHeader {
                width: 4,
                height: 2,
                fps_numerator: 25,
                fps_denominator: 1,
                aspect_ratio_numerator: 1,
                aspect_ratio_denominator: 1,
                flags: VideoFlags::empty(),
                colorspace: ColorSpace::Bt709,
                codec: CodecId::Uncompressed,
            }),
            payload: Bytes::from_static(b"hello"),
        };
        let encoded = f.encode();
        assert_eq!(encoded.len(), f.total_len());

        let header = Frame::read_header(&encoded, 0).unwrap();
        assert_eq!(header.payload_len as usize, 5);
        let parsed = Frame::read_extended_and_payload(&encoded, 0, &header).unwrap();
        assert_eq!(&parsed.payload[..], b"hello");
    }

    #[test]
    fn frame_metadata_trailer_round_trips() {
        let combined = Frame::with_frame_metadata(b"compressed-bytes", b"tc:00:00:00:00");
        let f = Frame {
            codec: CodecId::Vmx1,
            preview: false,
            timestamp: 0,
            extended: ExtendedHeader::Metadata,
            payload: combined,
        };
        let (data, meta) = f.split_frame_metadata();
        assert_eq!(data, b"compressed-bytes");
        assert_eq!(meta, b"tc:00:00:00:00");
    }
}
