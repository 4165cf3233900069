// SPDX-License-Identifier: MIT OR Apache-2.0

//! The codec interface consumed by [`crate::sender::Sender`] and
//! [`crate::receiver::Receiver`] but implemented externally (§6): actual
//! pixel/sample encode and decode is out of scope here. These traits exist
//! so an application can plug in a concrete encoder/decoder (hardware or
//! software) without either side of the transport depending on which one.

use bytes::Bytes;

use crate::types::{ColorSpace, Quality};
use crate::Error;

/// A decoded video image, already converted to the caller's preferred
/// pixel format.
#[derive(Clone, Debug)]
pub struct DecodedVideo {
    pub width: u16,
    pub height: u16,
    pub stride: u32,
    pub colorspace: ColorSpace,
    pub data: Bytes,
}

/// A decoded block of planar-float (or the decoder's native) audio samples.
#[derive(Clone, Debug)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: u8,
    pub samples_per_channel: u32,
    pub data: Bytes,
}

/// Constructed once per `(codec, width, height, profile, colorspace)` and
/// reused across frames; `set_quality` reacts to a `SuggestedQuality`
/// control document without rebuilding the encoder.
pub trait VideoEncoder: Send {
    fn encode(&mut self, image: &[u8], src_stride: u32, interlaced: bool) -> Result<Bytes, Error>;
    fn set_quality(&mut self, quality: Quality);
    /// Length of the encoded preview the encoder would currently produce,
    /// if it maintains one; `None` if previews aren't supported.
    fn encoded_preview_length(&self) -> Option<usize>;
}

/// Cached per `(codec, width, height)` on the receive side.
pub trait VideoDecoder: Send {
    fn decode(&mut self, data: &[u8]) -> Result<DecodedVideo, Error>;
}

/// Constructed once per `(codec, sample_rate, channels)`.
pub trait AudioEncoder: Send {
    fn encode(&mut self, samples: &[u8]) -> Result<Bytes, Error>;
}

/// Cached per `(codec, sample_rate, channels)`.
pub trait AudioDecoder: Send {
    fn decode(&mut self, data: &[u8]) -> Result<DecodedAudio, Error>;
}

/// A pool of pinned memory a codec implementation may use to avoid a copy
/// into device memory. Left as a trait rather than a concrete type since
/// the pinning strategy is tied to whichever hardware encoder/decoder is
/// plugged in.
pub trait PinnedBufferPool: Send + Sync {
    fn acquire(&self, len: usize) -> Bytes;
}
