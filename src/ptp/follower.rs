// SPDX-License-Identifier: MIT OR Apache-2.0

//! The PTP follower: a background worker joining the PTP multicast group,
//! running the Sync/FollowUp/DelayReq/DelayResp exchange, and feeding
//! drift samples to the [`Servo`].

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::exchange::ExchangeState;
use super::message::{self, MessageType, PortIdentity};
use super::port_identity;
use super::servo::{Servo, ServoGains, ServoState};
use crate::Error;

pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 1, 129);
pub const EVENT_PORT: u16 = 319;
pub const GENERAL_PORT: u16 = 320;

/// Configuration for one [`PtpFollower`] instance.
#[derive(Clone, Debug)]
pub struct PtpConfig {
    pub domain: u8,
    pub interface_mac: Option<[u8; 6]>,
    pub bind_interface: Ipv4Addr,
    pub gains: ServoGains,
}

impl Default for PtpConfig {
    fn default() -> Self {
        PtpConfig {
            domain: 0,
            interface_mac: None,
            bind_interface: Ipv4Addr::UNSPECIFIED,
            gains: ServoGains::default(),
        }
    }
}

/// A background PTP follower. Exposes the accumulated `clock_correction`
/// for [`crate::clock::PtpDisciplinedClock`] to subtract from local time.
pub struct PtpFollower {
    clock_correction: AtomicI64,
    locked: AtomicBool,
    cancel: CancellationToken,
}

impl PtpFollower {
    pub fn clock_correction(&self) -> i64 {
        self.clock_correction.load(Ordering::Relaxed)
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Binds the event/general sockets, joins the multicast group, and
    /// spawns the worker task. Returns the follower handle and its join
    /// handle, so the owner can `join(2s)`-then-abort per the shutdown
    /// design.
    pub async fn spawn(config: PtpConfig) -> Result<(Arc<Self>, tokio::task::JoinHandle<()>), Error> {
        let event_sock = bind_multicast(EVENT_PORT, config.bind_interface).await?;
        let general_sock = bind_multicast(GENERAL_PORT, config.bind_interface).await?;

        let our_port_identity = config
            .interface_mac
            .map(port_identity::from_mac)
            .unwrap_or_else(port_identity::random_fallback);

        let shared = Arc::new(PtpFollower {
            clock_correction: AtomicI64::new(0),
            locked: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });
        let exchange = ExchangeState::new(config.domain, our_port_identity);
        let servo = Servo::new(config.gains);

        let worker_shared = shared.clone();
        let cancel = shared.cancel.clone();
        let domain = config.domain;
        let handle = tokio::spawn(async move {
            run(
                worker_shared,
                exchange,
                servo,
                event_sock,
                general_sock,
                our_port_identity,
                domain,
                cancel,
            )
            .await;
        });
        Ok((shared, handle))
    }

    /// Requests the worker to stop. The caller is responsible for joining
    /// the handle returned by [`PtpFollower::spawn`] with a 2s timeout and
    /// treating a timeout as "close the sockets anyway".
    pub fn request_shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn bind_multicast(port: u16, interface: Ipv4Addr) -> Result<UdpSocket, Error> {
    let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    sock.join_multicast_v4(MULTICAST_GROUP, interface)?;
    Ok(sock)
}

async fn run(
    shared: Arc<PtpFollower>,
    mut exchange: ExchangeState,
    mut servo: Servo,
    event_sock: UdpSocket,
    general_sock: UdpSocket,
    our_port_identity: PortIdentity,
    domain: u8,
    cancel: CancellationToken,
) {
    let mut sequence_counter: u16 = 0;
    let mut event_buf = [0u8; 256];
    let mut general_buf = [0u8; 256];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("ptp follower shutting down");
                return;
            }
            res = event_sock.recv(&mut event_buf) => {
                match res {
                    Ok(n) => handle_event_message(
                        &shared, &mut exchange, &mut servo, &event_sock,
                        &mut sequence_counter, our_port_identity, domain, &event_buf[..n],
                    ).await,
                    Err(e) => warn!("ptp event socket error: {e}"),
                }
            }
            res = general_sock.recv(&mut general_buf) => {
                match res {
                    Ok(n) => handle_general_message(
                        &shared, &mut exchange, &mut servo, &event_sock,
                        &mut sequence_counter, our_port_identity, domain, &general_buf[..n],
                    ).await,
                    Err(e) => warn!("ptp general socket error: {e}"),
                }
            }
        }
    }
}

async fn handle_event_message(
    shared: &Arc<PtpFollower>,
    exchange: &mut ExchangeState,
    servo: &mut Servo,
    event_sock: &UdpSocket,
    sequence_counter: &mut u16,
    our_port_identity: PortIdentity,
    domain: u8,
    buf: &[u8],
) {
    let header = match message::parse_header(buf) {
        Ok(h) => h,
        Err(e) => {
            debug!("ignoring malformed PTP event message: {e}");
            return;
        }
    };
    if header.message_type != MessageType::Sync {
        return;
    }
    let origin_timestamp = if header.two_step() {
        None
    } else {
        message::parse_timestamp(&buf[message::COMMON_HEADER_LEN..]).ok()
    };
    exchange.on_sync(&header, origin_timestamp, now_100ns());
    maybe_send_delay_req(exchange, event_sock, sequence_counter, our_port_identity, domain).await;
    maybe_take_sample(shared, exchange, servo);
}

async fn handle_general_message(
    shared: &Arc<PtpFollower>,
    exchange: &mut ExchangeState,
    servo: &mut Servo,
    event_sock: &UdpSocket,
    sequence_counter: &mut u16,
    our_port_identity: PortIdentity,
    domain: u8,
    buf: &[u8],
) {
    let header = match message::parse_header(buf) {
        Ok(h) => h,
        Err(e) => {
            debug!("ignoring malformed PTP general message: {e}");
            return;
        }
    };
    let body = &buf[message::COMMON_HEADER_LEN..];
    match header.message_type {
        MessageType::FollowUp => {
            let Ok(precise_origin) = message::parse_timestamp(body) else {
                return;
            };
            exchange.on_followup(&header, precise_origin);
            maybe_send_delay_req(exchange, event_sock, sequence_counter, our_port_identity, domain).await;
            maybe_take_sample(shared, exchange, servo);
        }
        MessageType::DelayResp => {
            if body.len() < message::TIMESTAMP_LEN + message::PORT_IDENTITY_LEN {
                return;
            }
            let Ok(receive_timestamp) = message::parse_timestamp(body) else {
                return;
            };
            let mut requesting = [0u8; message::PORT_IDENTITY_LEN];
            requesting.copy_from_slice(
                &body[message::TIMESTAMP_LEN..message::TIMESTAMP_LEN + message::PORT_IDENTITY_LEN],
            );
            exchange.on_delay_resp(&header, receive_timestamp, requesting);
            maybe_take_sample(shared, exchange, servo);
        }
        MessageType::Announce => {
            // Master identity is already tracked from Sync; nothing further
            // to extract from Announce for this follower's purposes.
        }
        _ => {}
    }
}

async fn maybe_send_delay_req(
    exchange: &mut ExchangeState,
    event_sock: &UdpSocket,
    sequence_counter: &mut u16,
    our_port_identity: PortIdentity,
    domain: u8,
) {
    if !exchange.ready_to_send_delay_req() {
        return;
    }
    let seq = *sequence_counter;
    *sequence_counter = sequence_counter.wrapping_add(1);
    let packet = encode_delay_req(seq, our_port_identity, domain);
    let t3 = now_100ns();
    if let Err(e) = event_sock.send_to(&packet, (MULTICAST_GROUP, EVENT_PORT)).await {
        warn!("failed to send PTP DelayReq: {e}");
        return;
    }
    exchange.on_delay_req_sent(t3);
}

fn maybe_take_sample(shared: &Arc<PtpFollower>, exchange: &mut ExchangeState, servo: &mut Servo) {
    let Some(drift) = exchange.take_drift_sample() else {
        return;
    };
    let correction = servo.process_sample(drift);
    shared.clock_correction.fetch_add(correction, Ordering::Relaxed);
    shared
        .locked
        .store(servo.state() == ServoState::Locked, Ordering::Relaxed);
}

/// Builds a minimal DelayReq: the 34-byte common header plus a 10-byte
/// origin-timestamp field stamped with our local send time. The master
/// doesn't need this value to be accurate (`t3` is recorded locally
/// instead), but a real clock records one here rather than leaving it zero.
fn encode_delay_req(
    sequence_id: u16,
    our_port_identity: PortIdentity,
    domain: u8,
) -> [u8; message::COMMON_HEADER_LEN + message::TIMESTAMP_LEN] {
    let mut buf = [0u8; message::COMMON_HEADER_LEN + message::TIMESTAMP_LEN];
    buf[0] = 0x1; // DelayReq message type, transportSpecific = 0
    buf[1] = 0x02; // version 2
    buf[2..4].copy_from_slice(&(message::COMMON_HEADER_LEN as u16 + message::TIMESTAMP_LEN as u16).to_be_bytes());
    buf[4] = domain;
    buf[20..30].copy_from_slice(&our_port_identity);
    buf[30..32].copy_from_slice(&sequence_id.to_be_bytes());
    buf[32] = 0x1; // controlField: DELAY_REQ
    let mut origin_timestamp = [0u8; message::TIMESTAMP_LEN];
    message::write_timestamp(&mut origin_timestamp, now_100ns());
    buf[message::COMMON_HEADER_LEN..].copy_from_slice(&origin_timestamp);
    buf
}

fn now_100ns() -> i64 {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    dur.as_secs() as i64 * 10_000_000 + (dur.subsec_nanos() / 100) as i64
}
