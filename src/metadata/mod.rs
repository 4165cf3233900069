// SPDX-License-Identifier: MIT OR Apache-2.0

//! The typed-metadata item stream embedded in Metadata-frame payloads
//! (distinct from UTF-8 XML control documents, which start with `<`).
//!
//! The first payload byte is `0xFD`; each subsequent item is
//! `[u16 type][u16 len][bytes payload]`, all little-endian. See the
//! concrete wire examples in the testable-properties section for the
//! canonical byte sequences this module is tested against.

pub mod control;
pub mod items;

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub use items::{AfdBar, Scte104, Tally as TallyItem, Timecode};

/// Distinguishes a typed-metadata item stream from a UTF-8 XML document.
pub const MAGIC: u8 = 0xFD;

/// A single typed-metadata item as read off (or about to be written to) the
/// wire: a 2-byte type ID and an opaque payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub item_type: u16,
    pub payload: Bytes,
}

pub mod item_type {
    pub const TIMECODE: u16 = 0x0001;
    pub const CEA_608: u16 = 0x0002;
    pub const CEA_708: u16 = 0x0003;
    pub const SCTE_104: u16 = 0x0004;
    pub const AFD_BAR: u16 = 0x0005;
    pub const TALLY: u16 = 0x0006;
    pub const CUSTOM_XML: u16 = 0xFFFF;
}

/// Appends typed-metadata items to a buffer, starting a fresh magic-prefixed
/// buffer or appending onto one known to already begin with the magic byte.
pub struct Writer {
    buf: BytesMut,
}

impl Writer {
    /// Starts a new buffer: writes the `0xFD` magic byte up front.
    pub fn new() -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(MAGIC);
        Writer { buf }
    }

    /// Wraps an existing buffer that's already known to begin with the
    /// magic byte, appending further items onto it without writing magic
    /// again.
    pub fn append_to(buf: BytesMut) -> Self {
        debug_assert_eq!(buf.first().copied(), Some(MAGIC));
        Writer { buf }
    }

    pub fn write_item(&mut self, item_type: u16, payload: &[u8]) -> &mut Self {
        self.buf.put_u16_le(item_type);
        self.buf.put_u16_le(payload.len() as u16);
        self.buf.put_slice(payload);
        self
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a typed-metadata item stream (a Metadata-frame payload beginning
/// with `0xFD`).
pub struct Reader<'a> {
    rest: &'a [u8],
}

impl<'a> Reader<'a> {
    /// Returns `None` if `payload` doesn't begin with the typed-metadata
    /// magic byte (i.e. it's a UTF-8 XML metadata frame instead).
    pub fn new(payload: &'a [u8]) -> Option<Self> {
        if payload.first().copied() != Some(MAGIC) {
            return None;
        }
        Some(Reader {
            rest: &payload[1..],
        })
    }

    /// Returns the payload of the first item of type `item_type`
    /// encountered in wire order, per the "readers accept the first item of
    /// a requested type" rule.
    pub fn find_first(payload: &'a [u8], item_type: u16) -> Option<Bytes> {
        Reader::new(payload)?.find_map(|item| (item.item_type == item_type).then_some(item.payload))
    }
}

impl Iterator for Reader<'_> {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        if self.rest.len() < 4 {
            return None;
        }
        let mut header = &self.rest[..4];
        let item_type = header.get_u16_le();
        let len = header.get_u16_le() as usize;
        if self.rest.len() < 4 + len {
            // Malformed stream: an item's 2+2+len doesn't fit in what's left.
            self.rest = &[];
            return None;
        }
        let payload = Bytes::copy_from_slice(&self.rest[4..4 + len]);
        self.rest = &self.rest[4 + len..];
        Some(Item { item_type, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timecode_wire_vector() {
        let tc = Timecode {
            hours: 10,
            minutes: 20,
            seconds: 30,
            frames: 15,
            drop_frame: true,
            color_frame: false,
            field_mark: false,
            frame_rate: items::FrameRateIndex::Fps30,
        };
        let mut w = Writer::new();
        w.write_item(item_type::TIMECODE, &tc.to_bytes());
        let wire = w.finish();
        assert_eq!(
            &wire[..],
            &[0xFD, 0x01, 0x00, 0x05, 0x00, 0x0A, 0x14, 0x1E, 0x0F, 0x11]
        );

        let parsed = Timecode::from_bytes(Reader::new(&wire).unwrap().next().unwrap().payload.as_ref())
            .unwrap();
        assert_eq!(parsed, tc);
    }

    #[test]
    fn tally_wire_vector() {
        let tally = TallyItem {
            preview: true,
            program: false,
        };
        let mut w = Writer::new();
        w.write_item(item_type::TALLY, &tally.to_bytes());
        let wire = w.finish();
        assert_eq!(&wire[..], &[0xFD, 0x06, 0x00, 0x02, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn scte104_wire_vector() {
        let scte = Scte104 {
            op: 0,
            splice_event_id: 0xDEAD_BEEF,
            pts_offset: 0x0001_0000,
            auto_return: 1,
        };
        let bytes = scte.to_bytes();
        assert_eq!(
            &bytes[..],
            &[0x00, 0xEF, 0xBE, 0xAD, 0xDE, 0x00, 0x00, 0x01, 0x00, 0x01]
        );
        assert_eq!(Scte104::from_bytes(&bytes).unwrap(), scte);
    }

    #[test]
    fn round_trip_sequence_in_order() {
        let mut w = Writer::new();
        w.write_item(item_type::TIMECODE, &[1, 2, 3, 4, 5]);
        w.write_item(item_type::TALLY, &[1, 0]);
        w.write_item(0x0101, b"user-item");
        let wire = w.finish();

        let items: Vec<Item> = Reader::new(&wire).unwrap().collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].item_type, item_type::TIMECODE);
        assert_eq!(&items[0].payload[..], &[1, 2, 3, 4, 5]);
        assert_eq!(items[1].item_type, item_type::TALLY);
        assert_eq!(items[2].item_type, 0x0101);
        assert_eq!(&items[2].payload[..], b"user-item");
    }

    #[test]
    fn truncated_item_ends_iteration() {
        // magic + a 4-byte item header claiming 10 bytes of payload but
        // only 2 are present.
        let wire = [0xFDu8, 0x01, 0x00, 0x0A, 0x00, 0x01, 0x02];
        let items: Vec<Item> = Reader::new(&wire).unwrap().collect();
        assert!(items.is_empty());
    }

    #[test]
    fn non_magic_payload_is_not_a_typed_stream() {
        assert!(Reader::new(b"<SubscribeVideo/>").is_none());
    }
}
