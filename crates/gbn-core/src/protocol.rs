use crate::codec::{self, Frame};
use crate::link::Link;
use crate::receiver::{ReceiverSequencer, Reception};
use crate::sender::SenderWindow;
use gbn_abstract::{
    DataLinkProtocol, LinkContext, LinkEvent, OUTSTANDING_METRIC, ProtocolConfig, Seq, between,
};
use serde::Serialize;
use tracing::{debug, warn};

/// Snapshot of the full protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkState {
    pub ack_expected: Seq,
    pub next_frame_to_send: Seq,
    pub nbuffered: usize,
    pub frame_expected: Seq,
    pub no_nak: bool,
    pub phl_ready: bool,
}

/// Go-Back-N station: sender window, receiver sequencer and admission gating.
pub struct GoBackN {
    config: ProtocolConfig,
    sender: SenderWindow,
    receiver: ReceiverSequencer,
    phl_ready: bool,
}

impl Default for GoBackN {
    fn default() -> Self {
        Self::new(ProtocolConfig::default())
    }
}

impl GoBackN {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            config,
            sender: SenderWindow::new(),
            receiver: ReceiverSequencer::new(),
            phl_ready: false,
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn state(&self) -> LinkState {
        LinkState {
            ack_expected: self.sender.ack_expected(),
            next_frame_to_send: self.sender.next_frame_to_send(),
            nbuffered: self.sender.nbuffered(),
            frame_expected: self.receiver.frame_expected(),
            no_nak: self.receiver.no_nak(),
            phl_ready: self.phl_ready,
        }
    }

    /// Whether the network layer may hand over another packet.
    pub fn admits_packets(&self) -> bool {
        !self.sender.is_full() && self.phl_ready
    }

    fn on_network_layer_ready(&mut self, ctx: &mut dyn LinkContext) {
        let Some(packet) = ctx.next_packet() else {
            debug!("network layer signalled ready without a packet");
            return;
        };
        let len = packet.len();
        let ack = self.receiver.ack_value();
        let mut link = Link::new(ctx, &mut self.phl_ready);
        match self
            .sender
            .buffer_and_send(&mut link, packet, ack, self.config.data_timeout_ms)
        {
            Ok(seq) => link.log(&format!("send DATA {seq} ack {ack} ({len} bytes)")),
            Err(err) => warn!(%err, "dropping packet from network layer"),
        }
    }

    fn on_frame_received(&mut self, ctx: &mut dyn LinkContext) {
        let Some(raw) = ctx.receive_frame() else {
            debug!("frame event without a frame");
            return;
        };
        let mut link = Link::new(ctx, &mut self.phl_ready);

        let frame = match codec::decode(&raw) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(%err, len = raw.len(), "bad frame");
                if self.receiver.on_corrupt_frame(&mut link) {
                    link.log(&format!("bad frame ({err}), NAK sent"));
                }
                return;
            }
        };

        self.sender.on_ack(&mut link, frame.ack());

        match frame {
            Frame::Data { seq, payload, .. } => {
                let outcome =
                    self.receiver
                        .on_data_frame(&mut link, seq, &payload, self.config.ack_timeout_ms);
                if outcome == Reception::Accepted {
                    link.log(&format!("recv DATA {seq} ({} bytes)", payload.len()));
                }
            }
            Frame::Nak { ack } => {
                // The NAK names the frame after `ack`; only act if it is still outstanding.
                if between(
                    self.sender.ack_expected(),
                    ack.next(),
                    self.sender.next_frame_to_send(),
                ) {
                    let resent = self.sender.retransmit_all_outstanding(
                        &mut link,
                        self.receiver.ack_value(),
                        self.config.data_timeout_ms,
                    );
                    link.log(&format!("recv NAK {ack}, resent {resent} frames"));
                } else {
                    debug!(ack = %ack, "stale NAK ignored");
                }
            }
            Frame::Ack { ack } => debug!(ack = %ack, "recv ACK"),
        }
    }

    fn on_data_timeout(&mut self, ctx: &mut dyn LinkContext, seq: Seq) {
        let ack = self.receiver.ack_value();
        let mut link = Link::new(ctx, &mut self.phl_ready);
        let resent =
            self.sender
                .retransmit_all_outstanding(&mut link, ack, self.config.data_timeout_ms);
        link.log(&format!("DATA {seq} timeout, resent {resent} frames"));
    }

    fn on_ack_timeout(&mut self, ctx: &mut dyn LinkContext) {
        let ack = self.receiver.ack_value();
        let mut link = Link::new(ctx, &mut self.phl_ready);
        link.send(&Frame::Ack { ack });
        link.log(&format!("ACK timeout, send ACK {ack}"));
    }

    fn update_admission(&self, ctx: &mut dyn LinkContext) {
        if self.admits_packets() {
            ctx.enable_network_layer();
        } else {
            ctx.disable_network_layer();
        }
    }
}

impl DataLinkProtocol for GoBackN {
    fn init(&mut self, ctx: &mut dyn LinkContext) {
        ctx.log("Go-Back-N station ready");
        ctx.enable_network_layer();
    }

    fn on_event(&mut self, ctx: &mut dyn LinkContext, event: LinkEvent) {
        match event {
            LinkEvent::NetworkLayerReady => self.on_network_layer_ready(ctx),
            LinkEvent::PhysicalLayerReady => self.phl_ready = true,
            LinkEvent::FrameReceived => self.on_frame_received(ctx),
            LinkEvent::DataTimeout(seq) => self.on_data_timeout(ctx, seq),
            LinkEvent::AckTimeout => self.on_ack_timeout(ctx),
        }
        self.update_admission(ctx);
        ctx.record_metric(OUTSTANDING_METRIC, self.sender.nbuffered() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameKind;
    use crate::testing::{RecordingContext, TimerOp};
    use bytes::Bytes;
    use gbn_abstract::{MAX_SEQ, WINDOW_SIZE};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn s(v: u8) -> Seq {
        Seq::new(v).unwrap()
    }

    fn station() -> (GoBackN, RecordingContext) {
        let mut gbn = GoBackN::default();
        let mut ctx = RecordingContext::default();
        gbn.init(&mut ctx);
        (gbn, ctx)
    }

    /// Offer one packet with the physical layer free, as a runtime would.
    fn offer(gbn: &mut GoBackN, ctx: &mut RecordingContext, payload: &[u8]) {
        gbn.on_event(ctx, LinkEvent::PhysicalLayerReady);
        ctx.outbound.push_back(Bytes::copy_from_slice(payload));
        gbn.on_event(ctx, LinkEvent::NetworkLayerReady);
    }

    fn deliver(gbn: &mut GoBackN, ctx: &mut RecordingContext, frame: &Frame) {
        ctx.push_frame(frame);
        gbn.on_event(ctx, LinkEvent::FrameReceived);
    }

    fn assert_invariants(gbn: &GoBackN) {
        let st = gbn.state();
        assert!(st.nbuffered <= MAX_SEQ as usize);
        assert_eq!(st.next_frame_to_send, st.ack_expected.advance(st.nbuffered));
    }

    #[test]
    fn starts_idle_with_network_layer_enabled() {
        let (gbn, ctx) = station();
        assert_eq!(ctx.network_enabled, Some(true));
        assert_eq!(gbn.state(), LinkState {
            ack_expected: s(0),
            next_frame_to_send: s(0),
            nbuffered: 0,
            frame_expected: s(0),
            no_nak: true,
            phl_ready: false,
        });
    }

    #[test]
    fn sending_occupies_physical_layer() {
        let (mut gbn, mut ctx) = station();
        offer(&mut gbn, &mut ctx, b"one");
        assert!(!gbn.state().phl_ready);
        assert_eq!(ctx.network_enabled, Some(false));
        assert_eq!(ctx.sent_frames(), vec![Frame::Data {
            seq: s(0),
            ack: s(7),
            payload: Bytes::from_static(b"one"),
        }]);
        gbn.on_event(&mut ctx, LinkEvent::PhysicalLayerReady);
        assert_eq!(ctx.network_enabled, Some(true));
    }

    #[test]
    fn window_fill_then_cumulative_ack_reopens() {
        let (mut gbn, mut ctx) = station();
        for i in 0..WINDOW_SIZE {
            offer(&mut gbn, &mut ctx, &[i as u8]);
        }
        assert_eq!(gbn.state().nbuffered, 7);

        // channel free, but the window is full
        gbn.on_event(&mut ctx, LinkEvent::PhysicalLayerReady);
        assert_eq!(ctx.network_enabled, Some(false));

        deliver(&mut gbn, &mut ctx, &Frame::Ack { ack: s(2) });
        let st = gbn.state();
        assert_eq!(st.ack_expected, s(3));
        assert_eq!(st.nbuffered, 4);
        assert_eq!(ctx.network_enabled, Some(true));
        assert_invariants(&gbn);
    }

    #[test]
    fn out_of_order_frame_naks_once() {
        let (mut gbn, mut ctx) = station();
        for seq in 0..3 {
            deliver(&mut gbn, &mut ctx, &Frame::Data {
                seq: s(seq),
                ack: s(7),
                payload: Bytes::from(vec![seq]),
            });
        }
        assert_eq!(gbn.state().frame_expected, s(3));
        ctx.clear();

        let data = |seq| Frame::Data {
            seq: s(seq),
            ack: s(7),
            payload: Bytes::new(),
        };
        deliver(&mut gbn, &mut ctx, &data(5));
        deliver(&mut gbn, &mut ctx, &data(6));
        assert_eq!(ctx.sent_frames(), vec![Frame::Nak { ack: s(2) }]);
        assert!(ctx.delivered.is_empty());
    }

    #[test]
    fn timeout_resends_outstanding_frames() {
        let (mut gbn, mut ctx) = station();
        for i in 0..7 {
            offer(&mut gbn, &mut ctx, &[i]);
        }
        deliver(&mut gbn, &mut ctx, &Frame::Ack { ack: s(3) });
        assert_eq!(gbn.state().nbuffered, 3);
        ctx.clear();

        gbn.on_event(&mut ctx, LinkEvent::DataTimeout(s(4)));
        let frames = ctx.sent_frames();
        let seqs: Vec<u8> = frames.iter().filter_map(Frame::seq).map(Seq::get).collect();
        assert_eq!(seqs, vec![4, 5, 6]);
        assert_eq!(frames.len(), 3);
        let payloads: Vec<Vec<u8>> = frames
            .iter()
            .map(|f| match f {
                Frame::Data { payload, .. } => payload.to_vec(),
                other => panic!("expected data frame, got {other:?}"),
            })
            .collect();
        assert_eq!(payloads, vec![vec![4u8], vec![5], vec![6]]);
        assert_invariants(&gbn);
    }

    #[test]
    fn nak_within_window_triggers_go_back() {
        let (mut gbn, mut ctx) = station();
        for i in 0..5 {
            offer(&mut gbn, &mut ctx, &[i]);
        }
        ctx.clear();

        // receiver got 0 and 1, then lost 2
        deliver(&mut gbn, &mut ctx, &Frame::Nak { ack: s(1) });
        let seqs: Vec<u8> = ctx
            .sent_frames()
            .iter()
            .filter_map(Frame::seq)
            .map(Seq::get)
            .collect();
        assert_eq!(seqs, vec![2, 3, 4]);
        assert_eq!(gbn.state().ack_expected, s(2));
        assert_invariants(&gbn);
    }

    #[test]
    fn stale_nak_is_ignored() {
        let (mut gbn, mut ctx) = station();
        offer(&mut gbn, &mut ctx, b"x");
        deliver(&mut gbn, &mut ctx, &Frame::Ack { ack: s(0) });
        ctx.clear();

        // everything acknowledged; a late NAK for 0 names nothing outstanding
        deliver(&mut gbn, &mut ctx, &Frame::Nak { ack: s(7) });
        assert!(ctx.sent_frames().is_empty());
    }

    #[test]
    fn corrupted_frame_naks_until_good_frame() {
        let (mut gbn, mut ctx) = station();
        let mut raw = codec::encode(&Frame::Ack { ack: s(0) }).to_vec();
        raw[1] ^= 0x40;
        ctx.inbound.push_back(Bytes::from(raw.clone()));
        gbn.on_event(&mut ctx, LinkEvent::FrameReceived);
        ctx.inbound.push_back(Bytes::from(raw));
        gbn.on_event(&mut ctx, LinkEvent::FrameReceived);

        assert_eq!(ctx.sent_frames(), vec![Frame::Nak { ack: s(7) }]);
        assert!(!gbn.state().no_nak);

        deliver(&mut gbn, &mut ctx, &Frame::Data {
            seq: s(0),
            ack: s(7),
            payload: Bytes::from_static(b"ok"),
        });
        assert!(gbn.state().no_nak);
        assert_eq!(ctx.delivered, vec![b"ok".to_vec()]);
    }

    #[test]
    fn ack_timeout_sends_standalone_ack() {
        let (mut gbn, mut ctx) = station();
        deliver(&mut gbn, &mut ctx, &Frame::Data {
            seq: s(0),
            ack: s(7),
            payload: Bytes::from_static(b"a"),
        });
        assert!(ctx.ack_timer_armed);
        gbn.on_event(&mut ctx, LinkEvent::AckTimeout);
        assert_eq!(ctx.sent_frames(), vec![Frame::Ack { ack: s(0) }]);
        assert!(!ctx.ack_timer_armed);
    }

    #[test]
    fn data_frame_piggybacks_and_cancels_ack_timer() {
        let (mut gbn, mut ctx) = station();
        deliver(&mut gbn, &mut ctx, &Frame::Data {
            seq: s(0),
            ack: s(7),
            payload: Bytes::from_static(b"in"),
        });
        offer(&mut gbn, &mut ctx, b"out");
        assert!(!ctx.ack_timer_armed);
        let frames = ctx.sent_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind(), FrameKind::Data);
        assert_eq!(frames[0].ack(), s(0));
    }

    #[test]
    fn oversubscribed_network_layer_is_refused() {
        let (mut gbn, mut ctx) = station();
        for i in 0..7 {
            offer(&mut gbn, &mut ctx, &[i]);
        }
        // a misbehaving runtime ignores the disable signal
        ctx.outbound.push_back(Bytes::from_static(b"extra"));
        gbn.on_event(&mut ctx, LinkEvent::NetworkLayerReady);
        assert_eq!(gbn.state().nbuffered, 7);
        assert_eq!(ctx.sent_frames().len(), 7);
        assert_invariants(&gbn);
    }

    #[test]
    fn records_outstanding_metric() {
        let (mut gbn, mut ctx) = station();
        offer(&mut gbn, &mut ctx, b"m");
        assert_eq!(ctx.metrics.last(), Some(&("nbuffered".to_string(), 1.0)));
        assert!(ctx.timer_ops.contains(&TimerOp::Start(s(0), 2800)));
    }

    /// Feed random events and frames; the window invariants must hold after each.
    #[test]
    fn invariants_hold_under_random_events() {
        let mut rng = StdRng::seed_from_u64(7);
        let (mut gbn, mut ctx) = station();
        for _ in 0..5_000 {
            let event = match rng.random_range(0..6) {
                0 => {
                    ctx.outbound.push_back(Bytes::from(vec![rng.random::<u8>(); 4]));
                    LinkEvent::NetworkLayerReady
                }
                1 => LinkEvent::PhysicalLayerReady,
                2 => {
                    let ack = s(rng.random_range(0..=MAX_SEQ));
                    let frame = match rng.random_range(0..3) {
                        0 => Frame::Ack { ack },
                        1 => Frame::Nak { ack },
                        _ => Frame::Data {
                            seq: s(rng.random_range(0..=MAX_SEQ)),
                            ack,
                            payload: Bytes::from_static(b"r"),
                        },
                    };
                    ctx.push_frame(&frame);
                    LinkEvent::FrameReceived
                }
                3 => {
                    ctx.inbound.push_back(Bytes::from_static(&[0xFF, 0, 0]));
                    LinkEvent::FrameReceived
                }
                4 => LinkEvent::DataTimeout(s(rng.random_range(0..=MAX_SEQ))),
                _ => LinkEvent::AckTimeout,
            };
            gbn.on_event(&mut ctx, event);
            assert_invariants(&gbn);
            if gbn.state().nbuffered == WINDOW_SIZE {
                assert_eq!(ctx.network_enabled, Some(false));
            }
        }
    }
}
