// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared by every subsystem.
//!
//! Mirrors the two-layer shape used elsewhere in the ecosystem: a small
//! `Copy`-ish public [`Error`] that's cheap to clone across channel/task
//! boundaries, wrapping a private, non-exhaustive [`ErrorInt`] enum that
//! carries the actual detail. Call sites use [`bail!`]/[`wrap!`] to attach
//! context without repeating `Error::from(...)` everywhere.

use std::fmt;
use std::sync::Arc;

use crate::types::FrameKind;

/// An error from this crate.
///
/// Cheap to clone: internally an `Arc` around the detailed [`ErrorInt`].
#[derive(Clone)]
pub struct Error(pub(crate) Arc<ErrorInt>);

impl Error {
    pub(crate) fn wire_decode(description: impl Into<String>) -> Self {
        wrap!(ErrorInt::WireDecode {
            description: description.into(),
        })
    }

    pub(crate) fn configuration(description: impl Into<String>) -> Self {
        wrap!(ErrorInt::Configuration {
            description: description.into(),
        })
    }

    /// Constructs a codec error. Exposed so an externally implemented
    /// [`crate::codec::VideoEncoder`]/[`crate::codec::VideoDecoder`] (and
    /// their audio analogues) can report an encode/decode failure through
    /// this crate's error type.
    pub fn codec(description: impl Into<String>) -> Self {
        wrap!(ErrorInt::Codec {
            description: description.into(),
        })
    }

    /// True for errors that are fatal to the channel/connection that raised them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            &*self.0,
            ErrorInt::WireDecode { .. } | ErrorInt::Transport { .. } | ErrorInt::Configuration { .. }
        )
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&*self.0)
    }
}

impl From<ErrorInt> for Error {
    fn from(e: ErrorInt) -> Self {
        Error(Arc::new(e))
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        wrap!(ErrorInt::Io { source })
    }
}

impl From<quinn::ConnectionError> for Error {
    fn from(source: quinn::ConnectionError) -> Self {
        wrap!(ErrorInt::Transport {
            description: source.to_string(),
        })
    }
}

impl From<quinn::ConnectError> for Error {
    fn from(source: quinn::ConnectError) -> Self {
        wrap!(ErrorInt::Transport {
            description: source.to_string(),
        })
    }
}

/// The error taxonomy from the error-handling design: each row names a
/// recovery strategy that the owning subsystem (channel, sender, PTP
/// follower) is responsible for applying; `Error` itself just carries detail.
#[derive(thiserror::Error, Debug)]
pub(crate) enum ErrorInt {
    /// Bad magic, unknown frame kind, or a declared length overflowing the
    /// kind's cap. Fatal to the affected channel.
    #[error("wire decode error: {description}")]
    WireDecode { description: String },

    /// A stream read/write/reset. Fatal to the affected channel; other
    /// channels on the same sender/receiver continue.
    #[error("transport error: {description}")]
    Transport { description: String },

    /// The frame pool for `kind` had no free buffers. Local to one frame;
    /// the caller bumps `frames_dropped` and continues.
    #[error("frame pool exhausted for {kind:?}")]
    PoolExhausted { kind: FrameKind },

    /// Encoder/decoder construction or a single encode/decode call failed.
    /// Local to one frame.
    #[error("codec error: {description}")]
    Codec { description: String },

    /// A malformed PTP message, wrong domain, or a sanity check failure.
    /// Local; the sample is ignored.
    #[error("ptp error: {description}")]
    Ptp { description: String },

    /// Port range exhausted, bad interface name, or similar. Fatal to
    /// construction; surfaced to the caller immediately.
    #[error("configuration error: {description}")]
    Configuration { description: String },

    #[error("I/O error")]
    Io {
        #[source]
        source: std::io::Error,
    },
}

/// Constructs an [`Error`] from an [`ErrorInt`] variant expression.
macro_rules! wrap {
    ($e:expr) => {
        $crate::error::Error::from($e)
    };
}

/// Returns early with an [`Error`] built from an [`ErrorInt`] variant expression.
macro_rules! bail {
    ($e:expr) => {
        return Err(wrap!($e))
    };
}

pub(crate) use bail;
pub(crate) use wrap;
