use crate::trace::{SimulationReport, StationReport};
use bytes::Bytes;
use gbn_abstract::{DataLinkProtocol, LinkContext, LinkEvent, Seq, SimConfig, StationId, TimerKey};
use gbn_core::{Frame, FrameKind, GoBackN};
use rand::Rng;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use tracing::{debug, info};

#[derive(Debug)]
pub enum EventType {
    FrameArrival {
        to: StationId,
        frame: Bytes,
    },
    TransmitComplete {
        station: StationId,
    },
    TimerExpiry {
        station: StationId,
        key: TimerKey,
        generation: u64,
    },
    PacketOffered {
        station: StationId,
        packet: Bytes,
    },
    NetworkReady {
        station: StationId,
    },
}

#[derive(Debug)]
struct Event {
    time: u64,
    event_type: EventType,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for time: smallest time is Greater in BinaryHeap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// A compact textual summary of important link-layer events for visualization.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time: u64,
    pub description: String,
}

/// Per-station counters collected for reports and scenario assertions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StationStats {
    /// Packets handed to this station's network layer for sending.
    pub offered: Vec<Vec<u8>>,
    /// Packets this station delivered upward, in delivery order.
    pub delivered: Vec<Vec<u8>>,
    /// Packets the protocol pulled from the network layer.
    pub packets_taken: u32,
    pub data_frames: u32,
    pub ack_frames: u32,
    pub nak_frames: u32,
    /// Time-series recorded via `LinkContext::record_metric`.
    pub metrics: HashMap<String, Vec<(u64, f64)>>,
}

impl StationStats {
    pub fn frames_sent(&self) -> u32 {
        self.data_frames + self.ack_frames + self.nak_frames
    }

    /// Data frames sent beyond the first transmission of each packet.
    pub fn retransmissions(&self) -> u32 {
        self.data_frames.saturating_sub(self.packets_taken)
    }

    pub fn peak_metric(&self, name: &str) -> Option<f64> {
        self.metrics
            .get(name)?
            .iter()
            .map(|&(_, v)| v)
            .reduce(f64::max)
    }
}

#[derive(Debug, Clone, Copy)]
enum TimerOp {
    Start(TimerKey, u64),
    Stop(TimerKey),
}

/// Actions buffered during a protocol's event handler
#[derive(Default)]
struct ActionBuffer {
    transmitted: Vec<Bytes>,
    timer_ops: Vec<TimerOp>,
    logs: Vec<String>,
    delivered: Vec<Vec<u8>>,
    metrics: Vec<(String, f64)>,
    network_layer: Option<bool>,
    packets_taken: u32,
}

/// Context implementation passed to the protocol
struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    outbound: &'a mut VecDeque<Bytes>,
    inbound: &'a mut VecDeque<Bytes>,
    now: u64,
}

impl<'a> LinkContext for ScopedContext<'a> {
    fn next_packet(&mut self) -> Option<Bytes> {
        let packet = self.outbound.pop_front()?;
        self.buffer.packets_taken += 1;
        Some(packet)
    }

    fn deliver_packet(&mut self, packet: &[u8]) {
        self.buffer.delivered.push(packet.to_vec());
    }

    fn transmit(&mut self, frame: Bytes) {
        self.buffer.transmitted.push(frame);
    }

    fn receive_frame(&mut self) -> Option<Bytes> {
        self.inbound.pop_front()
    }

    fn start_timer(&mut self, seq: Seq, delay_ms: u64) {
        self.buffer
            .timer_ops
            .push(TimerOp::Start(TimerKey::Data(seq), delay_ms));
    }

    fn stop_timer(&mut self, seq: Seq) {
        self.buffer.timer_ops.push(TimerOp::Stop(TimerKey::Data(seq)));
    }

    fn start_ack_timer(&mut self, delay_ms: u64) {
        self.buffer
            .timer_ops
            .push(TimerOp::Start(TimerKey::Ack, delay_ms));
    }

    fn stop_ack_timer(&mut self) {
        self.buffer.timer_ops.push(TimerOp::Stop(TimerKey::Ack));
    }

    fn enable_network_layer(&mut self) {
        self.buffer.network_layer = Some(true);
    }

    fn disable_network_layer(&mut self) {
        self.buffer.network_layer = Some(false);
    }

    fn log(&mut self, message: &str) {
        self.buffer.logs.push(message.to_string());
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.buffer.metrics.push((name.to_string(), value));
    }
}

/// Generation counter per timer key. Restarting or stopping a timer bumps the
/// generation so that expiries already in the queue are ignored.
#[derive(Debug, Default, Clone, Copy)]
struct TimerSlot {
    generation: u64,
    running: bool,
}

struct Station {
    protocol: Box<dyn DataLinkProtocol>,
    /// Network-layer queue of packets waiting to be sent.
    outbound: VecDeque<Bytes>,
    /// Physical-layer queue of frames waiting for `receive_frame`.
    inbound: VecDeque<Bytes>,
    network_enabled: bool,
    network_ready_pending: bool,
    /// When the outgoing wire finishes serializing the last queued frame.
    tx_free_at: u64,
    /// Arrival time of the last frame sent toward the peer. The wire is FIFO.
    last_arrival: u64,
    timers: HashMap<TimerKey, TimerSlot>,
    stats: StationStats,
}

impl Station {
    fn new(protocol: Box<dyn DataLinkProtocol>) -> Self {
        Self {
            protocol,
            outbound: VecDeque::new(),
            inbound: VecDeque::new(),
            network_enabled: false,
            network_ready_pending: false,
            tx_free_at: 0,
            last_arrival: 0,
            timers: HashMap::new(),
            stats: StationStats::default(),
        }
    }
}

fn slot(id: StationId) -> usize {
    match id {
        StationId::A => 0,
        StationId::B => 1,
    }
}

fn describe(frame: &Bytes) -> String {
    match gbn_core::decode(frame) {
        Ok(Frame::Data { seq, ack, payload }) => {
            format!("DATA seq={seq} ack={ack} ({} bytes)", payload.len())
        }
        Ok(Frame::Ack { ack }) => format!("ACK {ack}"),
        Ok(Frame::Nak { ack }) => format!("NAK {ack}"),
        Err(err) => format!("<invalid: {err}>"),
    }
}

pub struct Simulator {
    time: u64,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,

    config: SimConfig,
    rng: rand::rngs::StdRng,

    stations: [Station; 2],

    // Deterministic fault injection, each rule fires once
    drop_data_once: Vec<(StationId, Seq)>,
    corrupt_data_once: Vec<(StationId, Seq)>,
    drop_ack_once: Vec<(StationId, Seq)>,

    /// Timeline of link events (drops, corruptions, sends, deliveries).
    pub link_events: Vec<LinkEventSummary>,
}

impl Simulator {
    pub fn new(
        config: SimConfig,
        station_a: Box<dyn DataLinkProtocol>,
        station_b: Box<dyn DataLinkProtocol>,
    ) -> Self {
        use rand::SeedableRng;
        let rng = rand::rngs::StdRng::seed_from_u64(config.seed);

        Self {
            time: 0,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            config,
            rng,
            stations: [Station::new(station_a), Station::new(station_b)],
            drop_data_once: Vec::new(),
            corrupt_data_once: Vec::new(),
            drop_ack_once: Vec::new(),
            link_events: Vec::new(),
        }
    }

    /// Both stations run Go-Back-N with the configured timings.
    pub fn go_back_n(config: SimConfig) -> Self {
        let protocol = config.protocol;
        Self::new(
            config,
            Box::new(GoBackN::new(protocol)),
            Box::new(GoBackN::new(protocol)),
        )
    }

    /// Drop the next data frame `station` sends with sequence number `seq`.
    pub fn add_drop_data_once(&mut self, station: StationId, seq: Seq) {
        self.drop_data_once.push((station, seq));
    }

    /// Corrupt the next data frame `station` sends with sequence number `seq`.
    pub fn add_corrupt_data_once(&mut self, station: StationId, seq: Seq) {
        self.corrupt_data_once.push((station, seq));
    }

    /// Drop the next standalone ACK `station` sends carrying `ack`.
    pub fn add_drop_ack_once(&mut self, station: StationId, ack: Seq) {
        self.drop_ack_once.push((station, ack));
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn stats(&self, station: StationId) -> &StationStats {
        &self.stations[slot(station)].stats
    }

    fn push_event(&mut self, time: u64, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    /// The network layer of `station` offers `data` at `time`.
    pub fn schedule_packet(&mut self, time: u64, station: StationId, data: Vec<u8>) {
        self.push_event(
            time,
            EventType::PacketOffered {
                station,
                packet: Bytes::from(data),
            },
        );
    }

    pub fn init(&mut self) {
        for id in [StationId::A, StationId::B] {
            let mut buffer = ActionBuffer::default();
            {
                let station = &mut self.stations[slot(id)];
                let mut ctx = ScopedContext {
                    buffer: &mut buffer,
                    outbound: &mut station.outbound,
                    inbound: &mut station.inbound,
                    now: self.time,
                };
                station.protocol.init(&mut ctx);
            }
            self.process_actions(id, buffer);
            // The wire starts idle.
            self.push_event(self.time, EventType::TransmitComplete { station: id });
        }
    }

    pub fn peek_next_event_time(&self) -> Option<u64> {
        self.event_queue.peek().map(|e| e.time)
    }

    pub fn current_time(&self) -> u64 {
        self.time
    }

    pub fn remaining_events(&self) -> usize {
        self.event_queue.len()
    }

    /// Process the next event. Returns true if an event was processed, false if queue is empty.
    pub fn step(&mut self) -> bool {
        let event = match self.event_queue.pop() {
            Some(e) => e,
            None => return false,
        };

        // Cancelled timers leave the clock where it is.
        if let EventType::TimerExpiry {
            station,
            key,
            generation,
        } = event.event_type
        {
            let timers = &mut self.stations[slot(station)].timers;
            match timers.get_mut(&key) {
                Some(timer) if timer.generation == generation && timer.running => {
                    timer.running = false;
                }
                _ => {
                    debug!("Skipping cancelled timer event for {:?}", key);
                    return true; // Event processed (by being ignored)
                }
            }
        }

        self.time = event.time;
        debug!("Processing event at {}: {:?}", self.time, event.event_type);

        match event.event_type {
            EventType::FrameArrival { to, frame } => {
                self.stations[slot(to)].inbound.push_back(frame);
                self.dispatch(to, LinkEvent::FrameReceived);
            }
            EventType::TransmitComplete { station } => {
                // Ready only once the whole transmit queue has drained.
                if self.stations[slot(station)].tx_free_at <= self.time {
                    self.dispatch(station, LinkEvent::PhysicalLayerReady);
                }
            }
            EventType::TimerExpiry { station, key, .. } => {
                let event = match key {
                    TimerKey::Data(seq) => LinkEvent::DataTimeout(seq),
                    TimerKey::Ack => LinkEvent::AckTimeout,
                };
                self.dispatch(station, event);
            }
            EventType::PacketOffered { station, packet } => {
                let st = &mut self.stations[slot(station)];
                st.stats.offered.push(packet.to_vec());
                st.outbound.push_back(packet);
                self.schedule_network_ready(station);
            }
            EventType::NetworkReady { station } => {
                let st = &mut self.stations[slot(station)];
                st.network_ready_pending = false;
                if st.network_enabled && !st.outbound.is_empty() {
                    self.dispatch(station, LinkEvent::NetworkLayerReady);
                }
            }
        }
        true
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        SimulationReport {
            config: self.config.clone(),
            duration_ms: self.time,
            stations: [StationId::A, StationId::B]
                .into_iter()
                .map(|id| StationReport::new(id, self.stats(id)))
                .collect(),
            link_events: self.link_events.clone(),
        }
    }

    pub fn run_until_complete(&mut self) {
        self.init();
        while self.step() {}
    }

    /// Step until the queue drains or simulated time passes `limit`.
    /// Returns false if the limit was hit first.
    pub fn run_until(&mut self, limit: u64) -> bool {
        while let Some(next) = self.peek_next_event_time() {
            if next > limit {
                return false;
            }
            self.step();
        }
        true
    }

    fn dispatch(&mut self, id: StationId, event: LinkEvent) {
        let mut buffer = ActionBuffer::default();
        {
            let station = &mut self.stations[slot(id)];
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                outbound: &mut station.outbound,
                inbound: &mut station.inbound,
                now: self.time,
            };
            station.protocol.on_event(&mut ctx, event);
        }
        self.process_actions(id, buffer);
    }

    fn schedule_network_ready(&mut self, id: StationId) {
        let st = &mut self.stations[slot(id)];
        if st.network_enabled && !st.outbound.is_empty() && !st.network_ready_pending {
            st.network_ready_pending = true;
            self.push_event(self.time, EventType::NetworkReady { station: id });
        }
    }

    fn transmit_time(&self, len: usize) -> u64 {
        if self.config.bits_per_ms == 0 {
            return 0;
        }
        (len as u64 * 8).div_ceil(self.config.bits_per_ms)
    }

    fn process_actions(&mut self, source: StationId, buffer: ActionBuffer) {
        let now = self.time;

        for log in buffer.logs {
            info!("[{}] {}", source, log);
        }

        {
            let st = &mut self.stations[slot(source)];
            for (name, value) in buffer.metrics {
                st.stats.metrics.entry(name).or_default().push((now, value));
            }
            st.stats.packets_taken += buffer.packets_taken;
            if let Some(enabled) = buffer.network_layer {
                st.network_enabled = enabled;
            }
        }

        for data in buffer.delivered {
            info!("[{}] DELIVERED DATA: {} bytes", source, data.len());
            self.link_events.push(LinkEventSummary {
                time: now,
                description: format!("[{}] DELIVERED {} bytes to network layer", source, data.len()),
            });
            self.stations[slot(source)].stats.delivered.push(data);
        }

        // Timer operations apply in the order the protocol issued them.
        let mut expiries = Vec::new();
        {
            let timers = &mut self.stations[slot(source)].timers;
            for op in buffer.timer_ops {
                match op {
                    TimerOp::Start(key, delay) => {
                        let timer = timers.entry(key).or_default();
                        if key == TimerKey::Ack && timer.running {
                            continue;
                        }
                        timer.generation += 1;
                        timer.running = true;
                        expiries.push((now + delay, key, timer.generation));
                    }
                    TimerOp::Stop(key) => {
                        if let Some(timer) = timers.get_mut(&key) {
                            timer.generation += 1;
                            timer.running = false;
                        }
                    }
                }
            }
        }
        for (time, key, generation) in expiries {
            self.push_event(
                time,
                EventType::TimerExpiry {
                    station: source,
                    key,
                    generation,
                },
            );
        }

        for frame in buffer.transmitted {
            self.put_on_wire(source, frame);
        }

        self.schedule_network_ready(source);
    }

    /// Physical-layer channel: serialize at link bandwidth, then lose, corrupt
    /// or delay the frame.
    fn put_on_wire(&mut self, source: StationId, mut frame: Bytes) {
        let target = source.peer();
        let decoded = gbn_core::decode(&frame).ok();
        let summary = describe(&frame);

        let tx_time = self.transmit_time(frame.len());
        let done = {
            let st = &mut self.stations[slot(source)];
            match decoded.as_ref().map(Frame::kind) {
                Some(FrameKind::Data) => st.stats.data_frames += 1,
                Some(FrameKind::Ack) => st.stats.ack_frames += 1,
                Some(FrameKind::Nak) => st.stats.nak_frames += 1,
                None => {}
            }
            let start = self.time.max(st.tx_free_at);
            st.tx_free_at = start + tx_time;
            st.tx_free_at
        };
        self.push_event(done, EventType::TransmitComplete { station: source });

        let data_seq = decoded.as_ref().and_then(Frame::seq);
        let ack_only = match decoded {
            Some(Frame::Ack { ack }) => Some(ack),
            _ => None,
        };

        if let Some(seq) = data_seq
            && take_rule(&mut self.drop_data_once, source, seq)
        {
            self.note(format!("[{source}->{target}] DROP (deterministic) {summary}"));
            debug!("Deterministically dropping data frame seq={}", seq);
            return;
        }
        if let Some(ack) = ack_only
            && take_rule(&mut self.drop_ack_once, source, ack)
        {
            self.note(format!("[{source}->{target}] DROP (deterministic) {summary}"));
            debug!("Deterministically dropping ACK {}", ack);
            return;
        }

        // 1. Check Loss
        if self.rng.random::<f64>() < self.config.loss_rate {
            self.note(format!("[{source}->{target}] DROP (random loss) {summary}"));
            debug!("Frame lost in channel");
            return;
        }

        // 2. Check Corruption
        let forced = data_seq.is_some_and(|seq| take_rule(&mut self.corrupt_data_once, source, seq));
        if (forced || self.rng.random::<f64>() < self.config.corrupt_rate) && !frame.is_empty() {
            self.note(format!("[{source}->{target}] CORRUPT {summary}"));
            debug!("Frame corrupted in channel");
            let mut bytes = frame.to_vec();
            let pos = self.rng.random_range(0..bytes.len());
            bytes[pos] ^= self.rng.random_range(1..=u8::MAX);
            frame = Bytes::from(bytes);
        }

        // 3. Calculate Latency, never letting a frame overtake the one before it
        let (lo, hi) = (self.config.min_latency, self.config.max_latency);
        let latency = self.rng.random_range(lo.min(hi)..=hi.max(lo));
        let arrival = {
            let st = &mut self.stations[slot(source)];
            st.last_arrival = st.last_arrival.max(done + latency);
            st.last_arrival
        };

        self.note(format!(
            "[{source}->{target}] SEND {summary} (arrives at {arrival}ms)"
        ));
        self.push_event(
            arrival,
            EventType::FrameArrival {
                to: target,
                frame,
            },
        );
    }

    fn note(&mut self, description: String) {
        self.link_events.push(LinkEventSummary {
            time: self.time,
            description,
        });
    }
}

fn take_rule(rules: &mut Vec<(StationId, Seq)>, station: StationId, value: Seq) -> bool {
    match rules.iter().position(|&rule| rule == (station, value)) {
        Some(pos) => {
            rules.remove(pos);
            true
        }
        None => false,
    }
}
