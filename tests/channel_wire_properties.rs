// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end property tests driving two [`omt::Channel`]s wired together
//! over an in-memory duplex stream, exercising the public crate surface the
//! way a real sender/receiver pair would rather than reaching into any
//! module's private state.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use omt::frame::{AudioExtendedHeader, ExtendedHeader};
use omt::types::{CodecId, FrameKind, SubscriptionMask, Tally};
use omt::{Channel, Frame, FramePool, FramePools};
use tokio::sync::Notify;

fn test_pools() -> FramePools {
    FramePools::new(
        FramePool::with_cap(4, 4096, 1 << 20),
        FramePool::with_cap(4, 4096, 1 << 20),
        FramePool::with_cap(4, 4096, 1 << 20),
    )
}

fn audio_frame(timestamp: i64, payload: &'static [u8]) -> Frame {
    Frame {
        codec: CodecId::Uncompressed,
        preview: false,
        timestamp,
        extended: ExtendedHeader::Audio(AudioExtendedHeader {
            sample_rate: 48_000,
            channels: 2,
            samples_per_channel: 4,
            active_channel_mask: 0b11,
            codec: CodecId::Uncompressed,
        }),
        payload: Bytes::from_static(payload),
    }
}

fn control_frame(xml: &'static [u8]) -> Frame {
    Frame {
        codec: CodecId::Uncompressed,
        preview: false,
        timestamp: 0,
        extended: ExtendedHeader::Metadata,
        payload: Bytes::from_static(xml),
    }
}

/// A frame sent before the peer subscribes is silently dropped (not written
/// to the wire, not counted as sent); the identical frame sent after
/// subscribing is delivered and counted. Property 5.
#[tokio::test]
async fn subscription_gating_is_end_to_end() {
    let (sender_stream, receiver_stream) = tokio::io::duplex(1 << 16);
    let sender_frame_ready = Arc::new(Notify::new());
    let sender_metadata_ready = Arc::new(Notify::new());
    let (sender_channel, _sender_events) = Channel::spawn(
        sender_stream,
        test_pools(),
        sender_frame_ready,
        sender_metadata_ready,
    );

    let receiver_frame_ready = Arc::new(Notify::new());
    let receiver_metadata_ready = Arc::new(Notify::new());
    let (receiver_channel, _receiver_events) = Channel::spawn(
        receiver_stream,
        test_pools(),
        receiver_frame_ready.clone(),
        receiver_metadata_ready,
    );

    // No subscription yet: the frame never reaches the wire.
    sender_channel.send(audio_frame(1, b"unsubscribed")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(receiver_channel.try_recv_frame().is_none());
    assert_eq!(sender_channel.statistics().frames_sent, 0);

    // The receiver subscribes by writing a control document on its own
    // half of the duplex; the sender's receive loop absorbs it.
    receiver_channel.send(control_frame(b"<SubscribeAudio/>")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(sender_channel.subscription().contains(FrameKind::Audio));

    sender_channel.send(audio_frame(2, b"subscribed")).await.unwrap();
    receiver_frame_ready.notified().await;
    let delivered = receiver_channel.try_recv_frame().expect("frame delivered after subscribing");
    assert_eq!(&delivered.payload[..], b"subscribed");
    assert_eq!(sender_channel.statistics().frames_sent, 1);
}

/// A tally control document changes the sender-side channel's tally and
/// raises exactly one `TallyChanged` event; sending it again with the same
/// value is a no-op (Shared::set_tally only emits on an actual change).
#[tokio::test]
async fn tally_control_document_updates_and_is_idempotent() {
    let (sender_stream, mut receiver_stream) = tokio::io::duplex(4096);
    let frame_ready = Arc::new(Notify::new());
    let metadata_ready = Arc::new(Notify::new());
    let (sender_channel, mut events) = Channel::spawn(sender_stream, test_pools(), frame_ready, metadata_ready);

    use tokio::io::AsyncWriteExt;
    receiver_stream
        .write_all(&control_frame(b"<TallyProgram/>").encode())
        .await
        .unwrap();
    assert_eq!(events.recv().await, Some(omt::ChannelEvent::TallyChanged));
    assert_eq!(sender_channel.tally(), Tally::PROGRAM);

    // Same tally again: no second event should be raised for it.
    receiver_stream
        .write_all(&control_frame(b"<TallyProgram/>").encode())
        .await
        .unwrap();
    assert!(
        tokio::time::timeout(Duration::from_millis(50), events.recv()).await.is_err(),
        "repeating the same tally must not raise a second TallyChanged event"
    );
    assert_eq!(sender_channel.tally(), Tally::PROGRAM);

    receiver_stream
        .write_all(&control_frame(b"<TallyPreview/>").encode())
        .await
        .unwrap();
    assert_eq!(events.recv().await, Some(omt::ChannelEvent::TallyChanged));
    assert_eq!(sender_channel.tally(), Tally::PREVIEW);
}

/// Property 6: with `count` buffers in a pool, at most `count` can be
/// outstanding at once, regardless of how many concurrent tasks race to
/// acquire one — the bound holds under real concurrency, not just the
/// single-threaded case.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_outstanding_count_is_bounded_under_concurrency() {
    const COUNT: usize = 8;
    let pool = FramePool::with_cap(COUNT, 64, 1 << 16);
    let outstanding = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let peak = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..COUNT * 4 {
        let pool = pool.clone();
        let outstanding = outstanding.clone();
        let peak = peak.clone();
        tasks.push(tokio::spawn(async move {
            let Some(mut buf) = pool.acquire() else {
                return;
            };
            buf.ensure_len(16).unwrap();
            let now = outstanding.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            peak.fetch_max(now, std::sync::atomic::Ordering::SeqCst);
            // Hold it briefly so acquires genuinely overlap.
            tokio::time::sleep(Duration::from_millis(5)).await;
            outstanding.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            drop(buf);
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    assert!(
        peak.load(std::sync::atomic::Ordering::SeqCst) <= COUNT,
        "more than the pool's capacity was outstanding at once"
    );
}

/// SubscriptionMask.allows: Metadata always passes regardless of mask
/// state, matching the wire-level behavior exercised above.
#[test]
fn metadata_always_allowed_regardless_of_mask() {
    let mask = SubscriptionMask::EMPTY;
    assert!(mask.allows(FrameKind::Metadata));
    assert!(!mask.allows(FrameKind::Video));
    assert!(!mask.allows(FrameKind::Audio));
}
