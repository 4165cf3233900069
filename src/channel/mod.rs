// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-connection state machine: one [`Channel`] per transport stream,
//! owning outbound serialization, the inbound receive loop, subscription
//! gating, tally/quality/redirect state, and statistics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::error::{bail, ErrorInt};
use crate::frame::header::{payload_cap, HEADER_LEN};
use crate::frame::{Frame, FramePools};
use crate::metadata::control::{self, ControlDocument};
use crate::types::{FrameKind, Quality, SenderInfo, Statistics, SubscriptionMask, Tally};
use crate::Error;

/// Oldest-drop cap on the metadata-for-consumer ready queue.
const METADATA_QUEUE_CAP: usize = 128;

/// Events the channel raises to its owner: a `Changed` callback turned into
/// an unbounded SPSC message-passing channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    TallyChanged,
    RedirectChanged,
    Disconnected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ControlOutcome {
    Absorbed,
    NotControl,
}

/// State mutated by both the outbound `send` caller and the inbound receive
/// loop, each guarded by its own short critical section per the
/// concurrency model.
struct Shared {
    pools: FramePools,
    /// Last widened receive-side timestamp, the reference `extend_timestamp`
    /// anchors the next wire timestamp's nearest epoch to.
    last_timestamp: AtomicI64,
    ready: Mutex<VecDeque<Frame>>,
    metadata_ready: Mutex<VecDeque<Frame>>,
    subscription: Mutex<SubscriptionMask>,
    tally: Mutex<Tally>,
    preview: AtomicBool,
    quality: Mutex<Quality>,
    sender_info: Mutex<Option<SenderInfo>>,
    redirect: Mutex<Option<String>>,
    stats: crate::types::statistics::Counters,
    frame_ready: Arc<Notify>,
    metadata_ready_signal: Arc<Notify>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    cancel: CancellationToken,
}

impl Shared {
    fn emit(&self, event: ChannelEvent) {
        // The owner may have dropped its receiver; a channel tearing down
        // after the owner is gone is not itself an error.
        let _ = self.events.send(event);
    }

    fn apply_control(&self, doc: ControlDocument) {
        match doc {
            ControlDocument::SubscribeVideo => {
                self.subscription.lock().unwrap().insert(FrameKind::Video);
            }
            ControlDocument::SubscribeAudio => {
                self.subscription.lock().unwrap().insert(FrameKind::Audio);
            }
            ControlDocument::SubscribeMetadata => {
                self.subscription.lock().unwrap().insert(FrameKind::Metadata);
            }
            ControlDocument::TallyPreviewProgram => self.set_tally(Tally::PREVIEW_PROGRAM),
            ControlDocument::TallyProgram => self.set_tally(Tally::PROGRAM),
            ControlDocument::TallyPreview => self.set_tally(Tally::PREVIEW),
            ControlDocument::TallyNone => self.set_tally(Tally::NONE),
            ControlDocument::PreviewVideoOn => self.preview.store(true, Ordering::Relaxed),
            ControlDocument::PreviewVideoOff => self.preview.store(false, Ordering::Relaxed),
            ControlDocument::SuggestedQuality(q) => *self.quality.lock().unwrap() = q,
            ControlDocument::SenderInfo(info) => *self.sender_info.lock().unwrap() = Some(info),
            ControlDocument::Redirect { address } => {
                *self.redirect.lock().unwrap() = Some(address);
                self.emit(ChannelEvent::RedirectChanged);
            }
        }
    }

    fn set_tally(&self, new: Tally) {
        let mut tally = self.tally.lock().unwrap();
        if *tally != new {
            *tally = new;
            self.emit(ChannelEvent::TallyChanged);
        }
    }

    fn push_metadata_ready(&self, frame: Frame) {
        let mut q = self.metadata_ready.lock().unwrap();
        if q.len() >= METADATA_QUEUE_CAP {
            q.pop_front();
        }
        q.push_back(frame);
        drop(q);
        self.metadata_ready_signal.notify_one();
    }

    fn push_ready(&self, frame: Frame) {
        self.ready.lock().unwrap().push_back(frame);
        self.frame_ready.notify_one();
    }
}

/// One end of a logical channel: a QUIC (or any `AsyncRead + AsyncWrite`)
/// bidirectional stream, plus the state machine described in the channel
/// design. `S` is generic so tests can drive it over `tokio::io::duplex`.
pub struct Channel<S> {
    shared: Arc<Shared>,
    write_half: AsyncMutex<WriteHalf<S>>,
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Splits `stream`, spawns the inbound receive loop, and returns the
    /// channel plus the owner's event receiver. `frame_ready` and
    /// `metadata_ready` are the two signal handles the owner polls or awaits
    /// on; they're supplied by the caller so a `Receiver` can share one pair
    /// across several channels if it wants to.
    pub fn spawn(
        stream: S,
        pools: FramePools,
        frame_ready: Arc<Notify>,
        metadata_ready: Arc<Notify>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (read_half, write_half) = tokio::io::split(stream);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            pools,
            last_timestamp: AtomicI64::new(0),
            ready: Mutex::new(VecDeque::new()),
            metadata_ready: Mutex::new(VecDeque::new()),
            subscription: Mutex::new(SubscriptionMask::EMPTY),
            tally: Mutex::new(Tally::NONE),
            preview: AtomicBool::new(false),
            quality: Mutex::new(Quality::default()),
            sender_info: Mutex::new(None),
            redirect: Mutex::new(None),
            stats: crate::types::statistics::Counters::default(),
            frame_ready,
            metadata_ready_signal: metadata_ready,
            events: events_tx,
            cancel: CancellationToken::new(),
        });
        let channel = Arc::new(Channel {
            shared: shared.clone(),
            write_half: AsyncMutex::new(write_half),
        });
        tokio::spawn(receive_loop(shared, read_half));
        (channel, events_rx)
    }

    /// Requests cancellation of the inbound loop. Idempotent.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    pub fn subscription(&self) -> SubscriptionMask {
        *self.shared.subscription.lock().unwrap()
    }

    pub fn set_subscription(&self, mask: SubscriptionMask) {
        *self.shared.subscription.lock().unwrap() = mask;
    }

    pub fn tally(&self) -> Tally {
        *self.shared.tally.lock().unwrap()
    }

    pub fn preview(&self) -> bool {
        self.shared.preview.load(Ordering::Relaxed)
    }

    pub fn quality(&self) -> Quality {
        *self.shared.quality.lock().unwrap()
    }

    pub fn sender_info(&self) -> Option<SenderInfo> {
        self.shared.sender_info.lock().unwrap().clone()
    }

    pub fn redirect(&self) -> Option<String> {
        self.shared.redirect.lock().unwrap().clone()
    }

    pub fn statistics(&self) -> Statistics {
        self.shared.stats.read()
    }

    /// Pops the oldest completed Video/Audio frame, if any.
    pub fn try_recv_frame(&self) -> Option<Frame> {
        self.shared.ready.lock().unwrap().pop_front()
    }

    /// Pops the oldest Metadata frame not absorbed as a control document.
    pub fn try_recv_metadata(&self) -> Option<Frame> {
        self.shared.metadata_ready.lock().unwrap().pop_front()
    }

    /// Outbound `send(Frame)`. Returns the number of bytes written, or `0`
    /// if the frame was rejected by the subscription mask or the kind's
    /// length cap (both bump `frames_dropped` rather than erroring, except
    /// the mask rejection, which is silent by design — see the subscription
    /// gating property).
    pub async fn send(&self, mut frame: Frame) -> Result<usize, Error> {
        let kind = frame.kind();
        if kind != FrameKind::Metadata {
            let mask = *self.shared.subscription.lock().unwrap();
            if !mask.allows(kind) {
                return Ok(0);
            }
        }
        frame.preview = self.preview();

        let total = frame.extended.wire_len() as usize + frame.payload.len();
        if total > payload_cap(kind) {
            self.shared.stats.add_frame_dropped();
            return Ok(0);
        }

        let encoded = frame.encode();
        let len = encoded.len();
        {
            let mut w = self.write_half.lock().await;
            w.write_all(&encoded).await?;
        }
        self.shared.stats.add_frame_sent(len as u64);
        Ok(len)
    }
}

/// Reads exactly `buf.len()` bytes, returning `Ok(false)` for a clean EOF
/// (zero bytes read before the first byte) and an error for an EOF in the
/// middle of a frame.
async fn read_exact_or_eof<R: AsyncRead + Unpin>(r: &mut R, buf: &mut [u8]) -> Result<bool, Error> {
    let mut read = 0;
    while read < buf.len() {
        let n = r.read(&mut buf[read..]).await?;
        if n == 0 {
            if read == 0 {
                return Ok(false);
            }
            bail!(ErrorInt::Transport {
                description: "EOF mid-header".to_string(),
            });
        }
        read += n;
    }
    Ok(true)
}

/// Discards exactly `len` bytes from `r` without storing them, used to stay
/// in sync with the stream after a frame body can't be buffered (pool
/// exhaustion).
async fn drain_exact<R: AsyncRead + Unpin>(r: &mut R, mut len: usize) -> Result<(), Error> {
    let mut scratch = [0u8; 4096];
    while len > 0 {
        let n = r.read(&mut scratch[..len.min(scratch.len())]).await?;
        if n == 0 {
            bail!(ErrorInt::Transport {
                description: "EOF while draining an unbuffered frame body".to_string(),
            });
        }
        len -= n;
    }
    Ok(())
}

/// The inbound receive loop: one cooperative task per channel, per the
/// concurrency model. Owns all mutation of receive-side state; runs until
/// cancellation or stream EOF, raising exactly one `Disconnected` event on
/// any error path.
async fn receive_loop<S>(shared: Arc<Shared>, mut read_half: ReadHalf<S>)
where
    S: AsyncRead + Unpin,
{
    let result = receive_loop_inner(&shared, &mut read_half).await;
    if let Err(e) = result {
        warn!("channel receive loop ending: {e}");
        shared.emit(ChannelEvent::Disconnected);
    }
}

async fn receive_loop_inner<S>(shared: &Arc<Shared>, read_half: &mut ReadHalf<S>) -> Result<(), Error>
where
    S: AsyncRead + Unpin,
{
    loop {
        let mut header_buf = [0u8; HEADER_LEN];
        let got = tokio::select! {
            _ = shared.cancel.cancelled() => {
                debug!("channel receive loop cancelled");
                return Ok(());
            }
            r = read_exact_or_eof(read_half, &mut header_buf) => r?,
        };
        if !got {
            debug!("channel receive loop saw clean EOF");
            return Ok(());
        }

        let header = match Frame::read_header(&header_buf, 0) {
            Ok(h) => h,
            Err(e) => {
                info!("channel closing on malformed header: {e}");
                return Err(e);
            }
        };

        let rest = header.extended_len as usize + header.payload_len as usize;
        let Some(mut pooled) = shared.pools.for_kind(header.kind).acquire() else {
            let err = Error::from(ErrorInt::PoolExhausted { kind: header.kind });
            debug!("{err}");
            shared.stats.add_frame_dropped();
            drain_exact(read_half, rest).await?;
            continue;
        };
        pooled.ensure_len(HEADER_LEN + rest)?;
        pooled.as_mut_vec()[..HEADER_LEN].copy_from_slice(&header_buf);
        read_half
            .read_exact(&mut pooled.as_mut_vec()[HEADER_LEN..HEADER_LEN + rest])
            .await?;

        let mut frame = Frame::read_extended_and_payload(pooled.as_slice(), 0, &header)?;
        drop(pooled);
        let reference = shared.last_timestamp.load(Ordering::Relaxed);
        frame.timestamp = crate::clock::extend_timestamp(header.timestamp_low, reference);
        shared.last_timestamp.store(frame.timestamp, Ordering::Relaxed);
        shared.stats.add_frame_received(frame.total_len() as u64);

        match process_control(shared, &frame)? {
            ControlOutcome::Absorbed => continue,
            ControlOutcome::NotControl => {
                if frame.kind() == FrameKind::Metadata {
                    shared.push_metadata_ready(frame);
                } else {
                    shared.push_ready(frame);
                }
            }
        }
    }
}

/// Recognizes and applies control-XML documents carried by Metadata frames.
/// An empty payload or one starting with a literal `0x00` byte is treated as
/// invalid rather than as an opaque metadata frame — a known, deliberately
/// preserved quirk rather than an oversight.
fn process_control(shared: &Arc<Shared>, frame: &Frame) -> Result<ControlOutcome, Error> {
    if frame.kind() != FrameKind::Metadata {
        return Ok(ControlOutcome::NotControl);
    }
    let payload = &frame.payload;
    if payload.is_empty() || payload[0] == 0 {
        bail!(ErrorInt::WireDecode {
            description: "empty or invalid metadata payload".to_string(),
        });
    }
    if let Some(doc) = control::parse(payload) {
        shared.apply_control(doc);
        return Ok(ControlOutcome::Absorbed);
    }
    Ok(ControlOutcome::NotControl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{AudioExtendedHeader, ExtendedHeader, FramePool};
    use crate::types::CodecId;
    use bytes::Bytes;

    fn test_pools() -> FramePools {
        FramePools::new(
            FramePool::with_cap(4, 256, 1 << 20),
            FramePool::with_cap(4, 256, 1 << 20),
            FramePool::with_cap(4, 256, 1 << 20),
        )
    }

    fn video_frame(payload: &'static [u8]) -> Frame {
        Frame {
            codec: CodecId::Uncompressed,
            preview: false,
            timestamp: 0,
            extended: ExtendedHeader::Audio(AudioExtendedHeader {
                sample_rate: 48_000,
                channels: 2,
                samples_per_channel: 10,
                active_channel_mask: 0b11,
                codec: CodecId::Uncompressed,
            }),
            payload: Bytes::from_static(payload),
        }
    }

    #[tokio::test]
    async fn subscription_gating_blocks_then_allows() {
        let (client, server) = tokio::io::duplex(4096);
        let frame_ready = Arc::new(Notify::new());
        let metadata_ready = Arc::new(Notify::new());
        let (channel, _events) = Channel::spawn(client, test_pools(), frame_ready, metadata_ready);
        drop(server);

        let written = channel.send(video_frame(b"abc")).await.unwrap();
        assert_eq!(written, 0);
        assert_eq!(channel.statistics().frames_sent, 0);

        channel.set_subscription({
            let mut m = SubscriptionMask::EMPTY;
            m.insert(FrameKind::Audio);
            m
        });
        let frame = video_frame(b"abc");
        let expected_len = frame.total_len();
        let written = channel.send(frame).await.unwrap();
        assert_eq!(written, expected_len);
        assert_eq!(channel.statistics().frames_sent, 1);
    }

    #[tokio::test]
    async fn inbound_subscribe_video_then_frame_is_delivered() {
        let (mut client, server) = tokio::io::duplex(1 << 20);
        let frame_ready = Arc::new(Notify::new());
        let metadata_ready = Arc::new(Notify::new());
        let (channel, mut events) = Channel::spawn(server, test_pools(), frame_ready.clone(), metadata_ready);

        let control = Frame {
            codec: CodecId::Uncompressed,
            preview: false,
            timestamp: 0,
            extended: ExtendedHeader::Metadata,
            payload: Bytes::from_static(b"<SubscribeAudio/>"),
        };
        client.write_all(&control.encode()).await.unwrap();

        let tally_doc = Frame {
            codec: CodecId::Uncompressed,
            preview: false,
            timestamp: 0,
            extended: ExtendedHeader::Metadata,
            payload: Bytes::from_static(b"<TallyPreviewProgram/>"),
        };
        client.write_all(&tally_doc.encode()).await.unwrap();

        // Give the spawned task a chance to process both frames.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(channel.subscription().contains(FrameKind::Audio));
        assert_eq!(channel.tally(), Tally::PREVIEW_PROGRAM);
        assert_eq!(events.recv().await, Some(ChannelEvent::TallyChanged));

        channel.cancel();
    }

    #[tokio::test]
    async fn invalid_metadata_payload_disconnects() {
        let (mut client, server) = tokio::io::duplex(4096);
        let frame_ready = Arc::new(Notify::new());
        let metadata_ready = Arc::new(Notify::new());
        let (_channel, mut events) = Channel::spawn(server, test_pools(), frame_ready, metadata_ready);

        let bad = Frame {
            codec: CodecId::Uncompressed,
            preview: false,
            timestamp: 0,
            extended: ExtendedHeader::Metadata,
            payload: Bytes::new(),
        };
        client.write_all(&bad.encode()).await.unwrap();

        assert_eq!(events.recv().await, Some(ChannelEvent::Disconnected));
    }
}
