use crate::codec::{self, Frame};
use bytes::Bytes;
use gbn_abstract::{LinkContext, LinkDriver, LinkEvent, Seq};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOp {
    Start(Seq, u64),
    Stop(Seq),
    StartAck(u64),
    StopAck,
}

/// Records everything a protocol asks of its runtime.
#[derive(Default)]
pub struct RecordingContext {
    pub outbound: VecDeque<Bytes>,
    pub inbound: VecDeque<Bytes>,
    pub sent: Vec<Bytes>,
    pub delivered: Vec<Vec<u8>>,
    pub timer_ops: Vec<TimerOp>,
    pub ack_timer_armed: bool,
    pub network_enabled: Option<bool>,
    pub logs: Vec<String>,
    pub metrics: Vec<(String, f64)>,
    pub events: VecDeque<LinkEvent>,
}

impl RecordingContext {
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.sent
            .iter()
            .map(|raw| codec::decode(raw).expect("protocol sent an undecodable frame"))
            .collect()
    }

    pub fn clear(&mut self) {
        self.sent.clear();
        self.delivered.clear();
        self.timer_ops.clear();
        self.logs.clear();
        self.metrics.clear();
    }

    pub fn push_frame(&mut self, frame: &Frame) {
        self.inbound.push_back(codec::encode(frame));
    }
}

impl LinkContext for RecordingContext {
    fn next_packet(&mut self) -> Option<Bytes> {
        self.outbound.pop_front()
    }

    fn deliver_packet(&mut self, packet: &[u8]) {
        self.delivered.push(packet.to_vec());
    }

    fn transmit(&mut self, frame: Bytes) {
        self.sent.push(frame);
    }

    fn receive_frame(&mut self) -> Option<Bytes> {
        self.inbound.pop_front()
    }

    fn start_timer(&mut self, seq: Seq, delay_ms: u64) {
        self.timer_ops.push(TimerOp::Start(seq, delay_ms));
    }

    fn stop_timer(&mut self, seq: Seq) {
        self.timer_ops.push(TimerOp::Stop(seq));
    }

    fn start_ack_timer(&mut self, delay_ms: u64) {
        self.timer_ops.push(TimerOp::StartAck(delay_ms));
        self.ack_timer_armed = true;
    }

    fn stop_ack_timer(&mut self) {
        self.timer_ops.push(TimerOp::StopAck);
        self.ack_timer_armed = false;
    }

    fn enable_network_layer(&mut self) {
        self.network_enabled = Some(true);
    }

    fn disable_network_layer(&mut self) {
        self.network_enabled = Some(false);
    }

    fn log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn now(&self) -> u64 {
        0
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.metrics.push((name.to_string(), value));
    }
}

/// Replays a fixed list of events, then shuts down.
impl LinkDriver for RecordingContext {
    fn wait_for_event(&mut self) -> Option<LinkEvent> {
        self.events.pop_front()
    }
}
