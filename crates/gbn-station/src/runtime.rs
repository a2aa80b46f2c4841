use crate::config::StationConfig;
use crate::traffic::{DeliveryCheck, PacketSource, TrafficError};
use anyhow::{Context, bail};
use bytes::Bytes;
use gbn_abstract::{
    DataLinkProtocol, LinkContext, LinkDriver, LinkEvent, OUTSTANDING_METRIC, Seq, StationId,
    TimerKey,
};
use gbn_core::MAX_FRAME_LEN;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::runtime::Runtime;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

/// Counters reported once a station shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationSummary {
    pub sent: u32,
    pub received: u32,
    pub events: u64,
    pub elapsed: Duration,
}

/// A Go-Back-N endpoint talking to its peer over UDP.
///
/// The station owns a current-thread tokio runtime and only enters it inside
/// `wait_for_event` and when handing a frame to the socket, so the protocol
/// itself runs synchronously.
pub struct UdpStation {
    id: StationId,
    rt: Runtime,
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    ber: f64,
    rng: StdRng,
    source: PacketSource,
    check: DeliveryCheck,
    expected: u32,
    fault: Option<TrafficError>,
    events: VecDeque<LinkEvent>,
    inbound: VecDeque<Bytes>,
    network_enabled: bool,
    timers: HashMap<TimerKey, Instant>,
    outstanding: usize,
    started: Instant,
    linger: Duration,
    idle_since: Option<Instant>,
}

impl UdpStation {
    pub fn bind(id: StationId, addr: SocketAddr, config: &StationConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build tokio runtime")?;
        let socket = rt
            .block_on(UdpSocket::bind(addr))
            .with_context(|| format!("Failed to bind {addr}"))?;
        Ok(Self {
            id,
            rt,
            socket,
            peer: None,
            ber: config.ber,
            rng: StdRng::seed_from_u64(config.seed),
            source: PacketSource::new(config.packets, config.payload_len),
            check: DeliveryCheck::new(),
            expected: config.expected(),
            fault: None,
            // The wire starts idle.
            events: VecDeque::from([LinkEvent::PhysicalLayerReady]),
            inbound: VecDeque::new(),
            network_enabled: false,
            timers: HashMap::new(),
            outstanding: 0,
            started: Instant::now(),
            linger: Duration::from_millis(config.linger_ms),
            idle_since: None,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = Some(peer);
    }

    /// Run `protocol` until all traffic is exchanged and the linger period passes.
    ///
    /// The station only knows frames are still unacknowledged through the
    /// protocol's [`OUTSTANDING_METRIC`] samples. A protocol that never reports
    /// it is treated as always drained, and the station may shut down while
    /// the peer still waits for acknowledgments.
    pub fn run(mut self, protocol: &mut dyn DataLinkProtocol) -> anyhow::Result<StationSummary> {
        info!(station = %self.id, peer = ?self.peer, "station starting");
        let events = gbn_core::run(protocol, &mut self);
        if let Some(fault) = self.fault {
            bail!("station {}: {}", self.id, fault);
        }
        let summary = StationSummary {
            sent: self.source.sent(),
            received: self.check.received(),
            events,
            elapsed: self.started.elapsed(),
        };
        info!(station = %self.id, ?summary, "station finished");
        Ok(summary)
    }

    /// Flip each bit with probability `ber`.
    fn add_noise(&mut self, frame: Bytes) -> Bytes {
        if self.ber <= 0.0 {
            return frame;
        }
        let mut bytes = frame.to_vec();
        let mut flipped = 0;
        for byte in bytes.iter_mut() {
            for bit in 0..8 {
                if self.rng.random_bool(self.ber) {
                    *byte ^= 1 << bit;
                    flipped += 1;
                }
            }
        }
        if flipped > 0 {
            debug!(station = %self.id, flipped, "channel noise");
        }
        Bytes::from(bytes)
    }

    fn expired_timer(&self, now: Instant) -> Option<TimerKey> {
        self.timers
            .iter()
            .filter(|&(_, &deadline)| deadline <= now)
            .min_by_key(|&(_, &deadline)| deadline)
            .map(|(&key, _)| key)
    }

    /// True once everything is sent, acknowledged and received, and the
    /// station has lingered long enough for the peer's last retransmissions.
    fn finished(&mut self, now: Instant) -> bool {
        let idle = !self.source.has_next()
            && self.outstanding == 0
            && self.check.received() >= self.expected;
        if !idle {
            self.idle_since = None;
            return false;
        }
        let since = *self.idle_since.get_or_insert(now);
        now >= since + self.linger
    }

    fn next_deadline(&self, now: Instant) -> Instant {
        let linger = self.idle_since.map(|since| since + self.linger);
        self.timers
            .values()
            .copied()
            .chain(linger)
            .min()
            .unwrap_or(now + Duration::from_secs(3600))
    }
}

impl LinkContext for UdpStation {
    fn next_packet(&mut self) -> Option<Bytes> {
        self.source.next_packet()
    }

    fn deliver_packet(&mut self, packet: &[u8]) {
        if self.fault.is_some() {
            return;
        }
        if let Err(err) = self.check.on_delivery(packet) {
            error!(station = %self.id, %err, "delivery check failed");
            self.fault = Some(err);
        }
    }

    fn transmit(&mut self, frame: Bytes) {
        self.events.push_back(LinkEvent::PhysicalLayerReady);
        let Some(peer) = self.peer else {
            warn!(station = %self.id, "no peer configured, frame dropped");
            return;
        };
        let wire = self.add_noise(frame);
        if let Err(err) = self.rt.block_on(self.socket.send_to(&wire, peer)) {
            warn!(station = %self.id, %err, "send failed");
        }
    }

    fn receive_frame(&mut self) -> Option<Bytes> {
        self.inbound.pop_front()
    }

    fn start_timer(&mut self, seq: Seq, delay_ms: u64) {
        self.timers.insert(
            TimerKey::Data(seq),
            Instant::now() + Duration::from_millis(delay_ms),
        );
    }

    fn stop_timer(&mut self, seq: Seq) {
        self.timers.remove(&TimerKey::Data(seq));
    }

    fn start_ack_timer(&mut self, delay_ms: u64) {
        self.timers
            .entry(TimerKey::Ack)
            .or_insert_with(|| Instant::now() + Duration::from_millis(delay_ms));
    }

    fn stop_ack_timer(&mut self) {
        self.timers.remove(&TimerKey::Ack);
    }

    fn enable_network_layer(&mut self) {
        self.network_enabled = true;
    }

    fn disable_network_layer(&mut self) {
        self.network_enabled = false;
    }

    fn log(&mut self, message: &str) {
        debug!(station = %self.id, "{}", message);
    }

    fn now(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        if name == OUTSTANDING_METRIC {
            self.outstanding = value as usize;
        }
    }
}

impl LinkDriver for UdpStation {
    fn wait_for_event(&mut self) -> Option<LinkEvent> {
        let mut buf = vec![0u8; MAX_FRAME_LEN * 2];
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }
            if self.network_enabled && self.source.has_next() {
                return Some(LinkEvent::NetworkLayerReady);
            }

            let now = Instant::now();
            if let Some(key) = self.expired_timer(now) {
                self.timers.remove(&key);
                return Some(match key {
                    TimerKey::Data(seq) => LinkEvent::DataTimeout(seq),
                    TimerKey::Ack => LinkEvent::AckTimeout,
                });
            }
            if self.finished(now) {
                return None;
            }

            let deadline = self.next_deadline(now);
            let socket = &self.socket;
            let received = self.rt.block_on(async {
                tokio::select! {
                    r = socket.recv_from(&mut buf) => Some(r),
                    _ = sleep_until(deadline) => None,
                }
            });

            match received {
                Some(Ok((n, from))) => {
                    if self.peer.is_some_and(|peer| peer != from) {
                        debug!(station = %self.id, %from, "datagram from unknown sender ignored");
                        continue;
                    }
                    self.inbound.push_back(Bytes::copy_from_slice(&buf[..n]));
                    return Some(LinkEvent::FrameReceived);
                }
                Some(Err(err)) => warn!(station = %self.id, %err, "receive failed"),
                None => {}
            }
        }
    }
}
