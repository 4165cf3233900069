// SPDX-License-Identifier: MIT OR Apache-2.0

//! The sender: accepts incoming QUIC connections, turns each accepted
//! bidirectional stream into a [`Channel`], and fans outbound frames out to
//! every channel whose subscription mask allows the frame's kind.
//!
//! Encoding is an external collaborator (§6's codec interface) in the sense
//! that the actual pixel/sample codec is supplied by the caller as an
//! encoder factory, but the sender itself owns invoking it: it picks the
//! encoder for `(codec, width, height)`, applies the highest
//! [`crate::types::Quality`] hint currently advertised by any connected
//! channel, and encodes raw input before framing it — `OutboundFrame::data`
//! is always raw.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::channel::{Channel, ChannelEvent};
use crate::clock::{ClockAdapter, TimeSource};
use crate::codec::{AudioEncoder, VideoEncoder};
use crate::frame::{ExtendedHeader, Frame, FramePool, FramePools, OutboundFrame};
use crate::transport;
use crate::types::{CodecId, Quality, VideoFlags};
use crate::Error;

/// Caps the number of bidirectional streams accepted on a single QUIC
/// connection; a sender only ever needs one per channel the protocol
/// defines (video+metadata, audio), so anything beyond this is refused.
const MAX_CHANNELS_PER_CONNECTION: usize = 8;

/// Identifies one accepted connection's channel for bookkeeping (removal on
/// disconnect).
type ChannelId = u64;

type VideoEncoderFactory =
    Arc<dyn Fn(CodecId, u16, u16) -> Result<Box<dyn VideoEncoder>, Error> + Send + Sync>;
type AudioEncoderFactory =
    Arc<dyn Fn(CodecId, u32, u8) -> Result<Box<dyn AudioEncoder>, Error> + Send + Sync>;

/// Construction-time settings for [`Sender::bind`]. Pool counts are
/// per-kind: video, audio, and metadata frames never compete for the same
/// buffers.
pub struct SenderConfig {
    /// `None` scans [`transport::PORT_SCAN_RANGE`] for a free port.
    pub port: Option<u16>,
    /// `None` generates a fresh self-signed certificate.
    pub cert: Option<transport::SelfSignedCert>,
    pub video_pool_count: usize,
    pub audio_pool_count: usize,
    pub metadata_pool_count: usize,
    pub pool_initial_size: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            port: None,
            cert: None,
            video_pool_count: 16,
            audio_pool_count: 16,
            metadata_pool_count: 16,
            pool_initial_size: 4096,
        }
    }
}

/// Wraps a QUIC bidirectional stream's send/recv halves as one
/// `AsyncRead + AsyncWrite` type, the shape [`Channel`] is generic over.
pub struct QuicBidiStream {
    send: quinn::SendStream,
    recv: quinn::RecvStream,
}

impl tokio::io::AsyncRead for QuicBidiStream {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.get_mut().recv).poll_read(cx, buf)
    }
}

impl tokio::io::AsyncWrite for QuicBidiStream {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::pin::Pin::new(&mut self.get_mut().send).poll_write(cx, buf)
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.get_mut().send).poll_flush(cx)
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.get_mut().send).poll_shutdown(cx)
    }
}

/// Accepts QUIC connections and broadcasts outbound frames to every
/// subscribed channel.
pub struct Sender {
    endpoint: quinn::Endpoint,
    pools: FramePools,
    channels: Mutex<HashMap<ChannelId, Arc<Channel<QuicBidiStream>>>>,
    next_channel_id: AtomicU64,
    frame_ready: Arc<Notify>,
    metadata_ready: Arc<Notify>,
    video_clock: ClockAdapter,
    audio_clock: ClockAdapter,
    video_encoder: Mutex<Option<(CodecId, u16, u16, Box<dyn VideoEncoder>)>>,
    audio_encoder: Mutex<Option<(CodecId, u32, u8, Box<dyn AudioEncoder>)>>,
    video_encoder_factory: VideoEncoderFactory,
    audio_encoder_factory: AudioEncoderFactory,
    cancel: CancellationToken,
}

impl Sender {
    /// Binds the QUIC listener per `config` and starts the accept loop.
    /// `video_encoder_factory`/`audio_encoder_factory` construct a fresh
    /// encoder whenever the outgoing `(codec, width, height)` or
    /// `(codec, sample_rate, channels)` changes; the sender applies the
    /// current highest [`Quality`] hint to the cached encoder on every
    /// compressed frame.
    pub fn bind(
        config: SenderConfig,
        video_encoder_factory: VideoEncoderFactory,
        audio_encoder_factory: AudioEncoderFactory,
    ) -> Result<Arc<Self>, Error> {
        let server_config = transport::server_config(config.cert)?;
        let endpoint = transport::bind_server_endpoint(server_config, config.port)?;
        let sender = Arc::new(Sender {
            endpoint,
            pools: FramePools::new(
                FramePool::with_cap(config.video_pool_count, config.pool_initial_size, usize::MAX),
                FramePool::with_cap(config.audio_pool_count, config.pool_initial_size, usize::MAX),
                FramePool::with_cap(config.metadata_pool_count, config.pool_initial_size, usize::MAX),
            ),
            channels: Mutex::new(HashMap::new()),
            next_channel_id: AtomicU64::new(0),
            frame_ready: Arc::new(Notify::new()),
            metadata_ready: Arc::new(Notify::new()),
            video_clock: ClockAdapter::new(),
            audio_clock: ClockAdapter::new(),
            video_encoder: Mutex::new(None),
            audio_encoder: Mutex::new(None),
            video_encoder_factory,
            audio_encoder_factory,
            cancel: CancellationToken::new(),
        });
        let accept_sender = sender.clone();
        tokio::spawn(async move {
            accept_sender.accept_loop().await;
        });
        Ok(sender)
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, Error> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Cancels the accept loop and every live channel's inbound task, and
    /// closes the endpoint with the protocol's connection-close code.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.endpoint
            .close(transport::CONN_CLOSE_CODE.into(), b"sender shutting down");
    }

    async fn accept_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("sender accept loop cancelled");
                    return;
                }
                incoming = self.endpoint.accept() => {
                    let Some(incoming) = incoming else {
                        debug!("sender endpoint closed");
                        return;
                    };
                    let this = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = this.handle_connection(incoming).await {
                            warn!("connection handling ended: {e}");
                        }
                    });
                }
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, incoming: quinn::Incoming) -> Result<(), Error> {
        let connection = incoming.await?;
        info!("accepted connection from {}", connection.remote_address());
        let mut channel_count = 0usize;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                accepted = connection.accept_bi() => {
                    let (mut send, mut recv) = accepted?;
                    channel_count += 1;
                    if channel_count > MAX_CHANNELS_PER_CONNECTION {
                        warn!(
                            "connection {} opened more than {MAX_CHANNELS_PER_CONNECTION} streams; aborting the extra one",
                            connection.remote_address()
                        );
                        let _ = send.reset(transport::STREAM_ABORT_CODE.into());
                        let _ = recv.stop(transport::STREAM_ABORT_CODE.into());
                        continue;
                    }
                    self.spawn_channel(QuicBidiStream { send, recv }).await;
                }
            }
        }
    }

    async fn spawn_channel(self: &Arc<Self>, stream: QuicBidiStream) {
        let id = self.next_channel_id.fetch_add(1, Ordering::Relaxed);
        let (channel, mut events) = Channel::spawn(
            stream,
            self.pools.clone(),
            self.frame_ready.clone(),
            self.metadata_ready.clone(),
        );
        self.channels.lock().await.insert(id, channel);

        let this = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if event == ChannelEvent::Disconnected {
                    this.channels.lock().await.remove(&id);
                    return;
                }
            }
        });
    }

    /// Dispatches one outbound frame by kind: encodes it if its codec is
    /// compressed, stamps a timestamp from the shared clock, frames the
    /// payload, and fans it out to every currently connected channel (each
    /// gated independently by its subscription mask — see
    /// [`Channel::send`]).
    pub async fn send(&self, frame: OutboundFrame, time_source: &dyn TimeSource) -> Result<(), Error> {
        let frame = self.prepare(frame, time_source).await?;
        let channels: Vec<_> = self.channels.lock().await.values().cloned().collect();
        for channel in channels {
            channel.send(frame.clone()).await?;
        }
        Ok(())
    }

    /// The highest [`Quality`] hint currently advertised by any connected
    /// channel (`Quality::default()`, the lowest variant, if none is
    /// connected or none has suggested one).
    async fn max_quality(&self) -> Quality {
        self.channels
            .lock()
            .await
            .values()
            .map(|c| c.quality())
            .max()
            .unwrap_or_default()
    }

    async fn prepare(&self, frame: OutboundFrame, time_source: &dyn TimeSource) -> Result<Frame, Error> {
        let quality = self.max_quality().await;
        match frame {
            OutboundFrame::Video {
                width,
                height,
                fps_numerator,
                fps_denominator,
                aspect_ratio_numerator,
                aspect_ratio_denominator,
                flags,
                colorspace,
                codec,
                data,
                src_stride,
                frame_metadata,
            } => {
                let encoded = self.encode_video(codec, width, height, src_stride, flags, quality, &data).await?;
                Ok(Frame {
                    codec,
                    preview: false,
                    timestamp: self.video_clock.next_timestamp(time_source),
                    extended: ExtendedHeader::Video(crate::frame::VideoExtendedHeader {
                        width,
                        height,
                        fps_numerator,
                        fps_denominator,
                        aspect_ratio_numerator,
                        aspect_ratio_denominator,
                        flags,
                        colorspace,
                        codec,
                    }),
                    payload: Frame::with_frame_metadata(&encoded, &frame_metadata),
                })
            }
            OutboundFrame::Audio {
                sample_rate,
                channels,
                samples_per_channel,
                active_channel_mask,
                codec,
                data,
                frame_metadata,
            } => {
                let encoded = self.encode_audio(codec, sample_rate, channels, &data).await?;
                Ok(Frame {
                    codec,
                    preview: false,
                    timestamp: self.audio_clock.next_timestamp(time_source),
                    extended: ExtendedHeader::Audio(crate::frame::AudioExtendedHeader {
                        sample_rate,
                        channels,
                        samples_per_channel,
                        active_channel_mask,
                        codec,
                    }),
                    payload: Frame::with_frame_metadata(&encoded, &frame_metadata),
                })
            }
            OutboundFrame::Metadata { data } => Ok(Frame {
                codec: CodecId::Uncompressed,
                preview: false,
                timestamp: self.video_clock.next_timestamp(time_source),
                extended: ExtendedHeader::Metadata,
                payload: data,
            }),
        }
    }

    async fn encode_video(
        &self,
        codec: CodecId,
        width: u16,
        height: u16,
        src_stride: u32,
        flags: VideoFlags,
        quality: Quality,
        data: &[u8],
    ) -> Result<bytes::Bytes, Error> {
        if !codec.is_compressed() {
            return Ok(bytes::Bytes::copy_from_slice(data));
        }
        let mut slot = self.video_encoder.lock().await;
        let stale = match &*slot {
            Some((c, w, h, _)) => *c != codec || *w != width || *h != height,
            None => true,
        };
        if stale {
            let encoder = (self.video_encoder_factory)(codec, width, height)?;
            *slot = Some((codec, width, height, encoder));
        }
        let (_, _, _, encoder) = slot.as_mut().unwrap();
        encoder.set_quality(quality);
        encoder.encode(data, src_stride, flags.contains(VideoFlags::INTERLACED))
    }

    async fn encode_audio(
        &self,
        codec: CodecId,
        sample_rate: u32,
        channels: u8,
        data: &[u8],
    ) -> Result<bytes::Bytes, Error> {
        if !codec.is_compressed() {
            return Ok(bytes::Bytes::copy_from_slice(data));
        }
        let mut slot = self.audio_encoder.lock().await;
        let stale = match &*slot {
            Some((c, sr, ch, _)) => *c != codec || *sr != sample_rate || *ch != channels,
            None => true,
        };
        if stale {
            let encoder = (self.audio_encoder_factory)(codec, sample_rate, channels)?;
            *slot = Some((codec, sample_rate, channels, encoder));
        }
        let (_, _, _, encoder) = slot.as_mut().unwrap();
        encoder.encode(data)
    }
}
