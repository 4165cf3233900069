// SPDX-License-Identifier: MIT OR Apache-2.0

//! The receiver: dials a sender, opens the video+metadata and audio
//! streams, subscribes, and exposes a single `receive(timeout)` surface
//! that polls both channels in priority order.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::info;
use tokio::sync::Notify;

use crate::channel::Channel;
use crate::codec::{AudioDecoder, DecodedAudio, DecodedVideo, VideoDecoder};
use crate::frame::{Frame, FramePool, FramePools};
use crate::transport;
use crate::Error;

/// Construction-time settings for [`Receiver::connect`]. Pool counts are
/// per-kind, mirroring [`crate::sender::SenderConfig`].
pub struct ReceiverConfig {
    pub addr: std::net::SocketAddr,
    pub server_name: String,
    /// Pins to an exact self-signed certificate (the common case); `None`
    /// falls back to the Mozilla root store for a CA-signed deployment.
    pub pinned_cert_der: Option<rustls::pki_types::CertificateDer<'static>>,
    /// Sends `PreviewVideoOn` on connect.
    pub preview: bool,
    pub video_pool_count: usize,
    pub audio_pool_count: usize,
    pub metadata_pool_count: usize,
    pub pool_initial_size: usize,
}

impl ReceiverConfig {
    /// A config with the default pool sizing, no pinned certificate, and no
    /// preview subscription.
    pub fn new(addr: std::net::SocketAddr, server_name: impl Into<String>) -> Self {
        ReceiverConfig {
            addr,
            server_name: server_name.into(),
            pinned_cert_der: None,
            preview: false,
            video_pool_count: 16,
            audio_pool_count: 16,
            metadata_pool_count: 16,
            pool_initial_size: 4096,
        }
    }
}

/// Wraps a QUIC bidirectional stream's halves, mirroring
/// [`crate::sender::QuicBidiStream`] for the dial-out side.
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

/// A decoded frame as handed back to the receiver's caller.
#[derive(Clone, Debug)]
pub enum MediaFrame {
    Video(DecodedVideo),
    Audio(DecodedAudio),
    Metadata(Bytes),
}

/// Connects to a sender at `addr`, opening the video+metadata stream (with
/// `SubscribeVideo`+`SubscribeMetadata`, and `PreviewVideoOn` if
/// `want_preview`) and a separate audio stream (`SubscribeAudio`).
pub struct Receiver {
    video_channel: Arc<Channel<QuicBidiStream>>,
    audio_channel: Arc<Channel<QuicBidiStream>>,
    frame_ready: Arc<Notify>,
    metadata_ready: Arc<Notify>,
    video_decoder: tokio::sync::Mutex<Option<(crate::types::CodecId, u16, u16, Box<dyn VideoDecoder>)>>,
    audio_decoder: tokio::sync::Mutex<Option<(crate::types::CodecId, u32, u8, Box<dyn AudioDecoder>)>>,
    video_decoder_factory: VideoDecoderFactory,
    audio_decoder_factory: AudioDecoderFactory,
}

type VideoDecoderFactory = Arc<dyn Fn(crate::types::CodecId, u16, u16) -> Result<Box<dyn VideoDecoder>, Error> + Send + Sync>;
type AudioDecoderFactory = Arc<dyn Fn(crate::types::CodecId, u32, u8) -> Result<Box<dyn AudioDecoder>, Error> + Send + Sync>;

impl Receiver {
    /// Dials `config.addr`, pinning the server certificate if
    /// `config.pinned_cert_der` is supplied (the common case for a
    /// self-signed sender), and subscribes both streams.
    pub async fn connect(
        config: ReceiverConfig,
        video_decoder_factory: VideoDecoderFactory,
        audio_decoder_factory: AudioDecoderFactory,
    ) -> Result<Arc<Self>, Error> {
        let client_config = transport::client_config(config.pinned_cert_der)?;
        let endpoint = transport::bind_client_endpoint(client_config)?;
        let connection = endpoint.connect(config.addr, &config.server_name)?.await?;
        info!("connected to sender at {}", config.addr);

        let pools = FramePools::new(
            FramePool::with_cap(config.video_pool_count, config.pool_initial_size, usize::MAX),
            FramePool::with_cap(config.audio_pool_count, config.pool_initial_size, usize::MAX),
            FramePool::with_cap(config.metadata_pool_count, config.pool_initial_size, usize::MAX),
        );
        let frame_ready = Arc::new(Notify::new());
        let metadata_ready = Arc::new(Notify::new());

        let (video_send, video_recv) = connection.open_bi().await?;
        let (video_channel, _video_events) = Channel::spawn(
            QuicBidiStream { send: video_send, recv: video_recv },
            pools.clone(),
            frame_ready.clone(),
            metadata_ready.clone(),
        );
        video_channel.send(subscribe_frame(b"<SubscribeVideo/>")).await?;
        video_channel.send(subscribe_frame(b"<SubscribeMetadata/>")).await?;
        if config.preview {
            video_channel.send(subscribe_frame(b"<PreviewVideoOn/>")).await?;
        }

        let (audio_send, audio_recv) = connection.open_bi().await?;
        let (audio_channel, _audio_events) = Channel::spawn(
            QuicBidiStream { send: audio_send, recv: audio_recv },
            pools,
            frame_ready.clone(),
            metadata_ready.clone(),
        );
        audio_channel.send(subscribe_frame(b"<SubscribeAudio/>")).await?;

        Ok(Arc::new(Receiver {
            video_channel,
            audio_channel,
            frame_ready,
            metadata_ready,
            video_decoder: tokio::sync::Mutex::new(None),
            audio_decoder: tokio::sync::Mutex::new(None),
            video_decoder_factory,
            audio_decoder_factory,
        }))
    }

    pub fn redirect(&self) -> Option<String> {
        self.video_channel.redirect()
    }

    pub fn sender_info(&self) -> Option<crate::types::SenderInfo> {
        self.video_channel.sender_info()
    }

    /// Polls video, then audio, then metadata ready queues; if none has a
    /// frame, waits up to `timeout` on whichever becomes ready first.
    pub async fn receive(&self, timeout: Duration) -> Result<Option<MediaFrame>, Error> {
        if let Some(frame) = self.try_dequeue().await? {
            return Ok(Some(frame));
        }
        let wait = async {
            tokio::select! {
                _ = self.frame_ready.notified() => {}
                _ = self.metadata_ready.notified() => {}
            }
        };
        if tokio::time::timeout(timeout, wait).await.is_err() {
            return Ok(None);
        }
        self.try_dequeue().await
    }

    async fn try_dequeue(&self) -> Result<Option<MediaFrame>, Error> {
        if let Some(frame) = self.video_channel.try_recv_frame() {
            return Ok(Some(self.decode_video(frame).await?));
        }
        if let Some(frame) = self.audio_channel.try_recv_frame() {
            return Ok(Some(self.decode_audio(frame).await?));
        }
        if let Some(frame) = self.video_channel.try_recv_metadata() {
            return Ok(Some(MediaFrame::Metadata(frame.payload)));
        }
        if let Some(frame) = self.audio_channel.try_recv_metadata() {
            return Ok(Some(MediaFrame::Metadata(frame.payload)));
        }
        Ok(None)
    }

    async fn decode_video(&self, frame: Frame) -> Result<MediaFrame, Error> {
        let (data, _frame_metadata) = frame.split_frame_metadata();
        let crate::frame::ExtendedHeader::Video(ext) = &frame.extended else {
            return Err(Error::wire_decode("video frame missing video extended header"));
        };
        let mut slot = self.video_decoder.lock().await;
        let stale = match &*slot {
            Some((codec, width, height, _)) => *codec != frame.codec || *width != ext.width || *height != ext.height,
            None => true,
        };
        if stale {
            let decoder = (self.video_decoder_factory)(frame.codec, ext.width, ext.height)?;
            *slot = Some((frame.codec, ext.width, ext.height, decoder));
        }
        let decoded = slot.as_mut().unwrap().3.decode(data)?;
        Ok(MediaFrame::Video(decoded))
    }

    async fn decode_audio(&self, frame: Frame) -> Result<MediaFrame, Error> {
        let (data, _frame_metadata) = frame.split_frame_metadata();
        let crate::frame::ExtendedHeader::Audio(ext) = &frame.extended else {
            return Err(Error::wire_decode("audio frame missing audio extended header"));
        };
        let mut slot = self.audio_decoder.lock().await;
        let stale = match &*slot {
            Some((codec, sample_rate, channels, _)) => {
                *codec != frame.codec || *sample_rate != ext.sample_rate || *channels != ext.channels
            }
            None => true,
        };
        if stale {
            let decoder = (self.audio_decoder_factory)(frame.codec, ext.sample_rate, ext.channels)?;
            *slot = Some((frame.codec, ext.sample_rate, ext.channels, decoder));
        }
        let decoded = slot.as_mut().unwrap().3.decode(data)?;
        Ok(MediaFrame::Audio(decoded))
    }
}

fn subscribe_frame(control_xml: &'static [u8]) -> Frame {
    Frame {
        codec: crate::types::CodecId::Uncompressed,
        preview: false,
        timestamp: 0,
        extended: crate::frame::ExtendedHeader::Metadata,
        payload: Bytes::from_static(control_xml),
    }
}
