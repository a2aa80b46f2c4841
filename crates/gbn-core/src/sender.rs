//! Sending half of the Go-Back-N window.
//!
//! Outstanding frames live in a fixed ring of `SEQ_SPACE` slots indexed by
//! sequence number. `ack_expected` is the oldest unacknowledged frame,
//! `next_frame_to_send` the next sequence number to assign, and at all times
//! `next_frame_to_send == ack_expected + nbuffered (mod SEQ_SPACE)`.

use crate::codec::Frame;
use crate::error::WindowError;
use crate::link::Link;
use bytes::Bytes;
use gbn_abstract::{PKT_LEN, SEQ_SPACE, Seq, WINDOW_SIZE, between};
use tracing::debug;

/// A buffered packet and the sequence number that owns its slot.
#[derive(Debug, Clone)]
struct Slot {
    owner: Seq,
    payload: Bytes,
}

#[derive(Debug)]
pub struct SenderWindow {
    ack_expected: Seq,
    next_frame_to_send: Seq,
    nbuffered: usize,
    slots: [Option<Slot>; SEQ_SPACE as usize],
}

impl Default for SenderWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl SenderWindow {
    pub fn new() -> Self {
        Self {
            ack_expected: Seq::ZERO,
            next_frame_to_send: Seq::ZERO,
            nbuffered: 0,
            slots: Default::default(),
        }
    }

    pub fn ack_expected(&self) -> Seq {
        self.ack_expected
    }

    pub fn next_frame_to_send(&self) -> Seq {
        self.next_frame_to_send
    }

    pub fn nbuffered(&self) -> usize {
        self.nbuffered
    }

    pub fn is_full(&self) -> bool {
        self.nbuffered >= WINDOW_SIZE
    }

    /// True iff `seq` is currently unacknowledged.
    pub fn is_outstanding(&self, seq: Seq) -> bool {
        between(self.ack_expected, seq, self.next_frame_to_send)
    }

    /// Buffer `packet` in the next free slot, transmit it and start its timer.
    ///
    /// Callers must gate on [`is_full`](Self::is_full). A full window is
    /// reported, never overwritten.
    pub fn buffer_and_send(
        &mut self,
        link: &mut Link<'_>,
        packet: Bytes,
        piggyback_ack: Seq,
        timeout_ms: u64,
    ) -> Result<Seq, WindowError> {
        if self.is_full() {
            return Err(WindowError::Full {
                outstanding: self.nbuffered,
            });
        }
        if packet.len() > PKT_LEN {
            return Err(WindowError::Oversized {
                len: packet.len(),
                max: PKT_LEN,
            });
        }

        let seq = self.next_frame_to_send;
        let slot = &mut self.slots[seq.index()];
        debug_assert!(slot.is_none(), "slot {seq} still owned by an in-flight frame");
        *slot = Some(Slot {
            owner: seq,
            payload: packet,
        });
        self.nbuffered += 1;

        self.send_data(link, seq, piggyback_ack, timeout_ms);
        self.next_frame_to_send = seq.next();
        Ok(seq)
    }

    /// Cumulative acknowledgment sweep: retire every outstanding frame up to
    /// and including `ack`. Stale or repeated acks retire nothing.
    pub fn on_ack(&mut self, link: &mut Link<'_>, ack: Seq) -> usize {
        let mut retired = 0;
        while between(self.ack_expected, ack, self.next_frame_to_send) {
            let seq = self.ack_expected;
            let freed = self.slots[seq.index()].take();
            debug_assert_eq!(freed.map(|slot| slot.owner), Some(seq));
            self.nbuffered -= 1;
            link.stop_timer(seq);
            self.ack_expected = seq.next();
            retired += 1;
        }
        if retired > 0 {
            debug!(
                ack = %ack,
                retired,
                outstanding = self.nbuffered,
                "cumulative ack"
            );
        }
        retired
    }

    /// Go back to `ack_expected` and resend every buffered frame in order,
    /// restarting each frame's timer.
    pub fn retransmit_all_outstanding(
        &mut self,
        link: &mut Link<'_>,
        piggyback_ack: Seq,
        timeout_ms: u64,
    ) -> usize {
        self.next_frame_to_send = self.ack_expected;
        for _ in 0..self.nbuffered {
            let seq = self.next_frame_to_send;
            self.send_data(link, seq, piggyback_ack, timeout_ms);
            self.next_frame_to_send = seq.next();
        }
        self.nbuffered
    }

    fn send_data(&self, link: &mut Link<'_>, seq: Seq, ack: Seq, timeout_ms: u64) {
        let Some(slot) = &self.slots[seq.index()] else {
            debug_assert!(false, "no buffered frame for seq {seq}");
            return;
        };
        link.send(&Frame::Data {
            seq,
            ack,
            payload: slot.payload.clone(),
        });
        link.start_timer(seq, timeout_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingContext, TimerOp};

    const TIMEOUT: u64 = 2800;

    fn s(v: u8) -> Seq {
        Seq::new(v).unwrap()
    }

    fn fill(window: &mut SenderWindow, ctx: &mut RecordingContext, count: usize) {
        let mut ready = true;
        let mut link = Link::new(ctx, &mut ready);
        for i in 0..count {
            window
                .buffer_and_send(&mut link, Bytes::from(vec![i as u8]), s(7), TIMEOUT)
                .unwrap();
        }
    }

    fn assert_invariant(window: &SenderWindow) {
        assert!(window.nbuffered() <= WINDOW_SIZE);
        assert_eq!(
            window.next_frame_to_send(),
            window.ack_expected().advance(window.nbuffered())
        );
    }

    #[test]
    fn buffers_and_sends_with_timer() {
        let mut ctx = RecordingContext::default();
        let mut window = SenderWindow::new();
        fill(&mut window, &mut ctx, 1);

        assert_eq!(ctx.sent_frames(), vec![Frame::Data {
            seq: s(0),
            ack: s(7),
            payload: Bytes::from_static(&[0]),
        }]);
        assert!(ctx.timer_ops.contains(&TimerOp::Start(s(0), TIMEOUT)));
        assert_eq!(window.nbuffered(), 1);
        assert_eq!(window.next_frame_to_send(), s(1));
        assert_invariant(&window);
    }

    #[test]
    fn refuses_to_overfill() {
        let mut ctx = RecordingContext::default();
        let mut window = SenderWindow::new();
        fill(&mut window, &mut ctx, WINDOW_SIZE);
        assert!(window.is_full());

        let mut ready = true;
        let mut link = Link::new(&mut ctx, &mut ready);
        let err = window
            .buffer_and_send(&mut link, Bytes::from_static(b"x"), s(0), TIMEOUT)
            .unwrap_err();
        assert_eq!(err, WindowError::Full { outstanding: 7 });
        assert_eq!(ctx.sent_frames().len(), WINDOW_SIZE);
        assert_invariant(&window);
    }

    #[test]
    fn rejects_oversized_packet() {
        let mut ctx = RecordingContext::default();
        let mut ready = true;
        let mut link = Link::new(&mut ctx, &mut ready);
        let mut window = SenderWindow::new();
        let err = window
            .buffer_and_send(&mut link, Bytes::from(vec![0; PKT_LEN + 1]), s(0), TIMEOUT)
            .unwrap_err();
        assert!(matches!(err, WindowError::Oversized { .. }));
        assert_eq!(window.nbuffered(), 0);
    }

    #[test]
    fn cumulative_ack_retires_prefix() {
        let mut ctx = RecordingContext::default();
        let mut window = SenderWindow::new();
        fill(&mut window, &mut ctx, WINDOW_SIZE);

        let mut ready = true;
        let mut link = Link::new(&mut ctx, &mut ready);
        assert_eq!(window.on_ack(&mut link, s(2)), 3);
        assert_eq!(window.ack_expected(), s(3));
        assert_eq!(window.nbuffered(), 4);
        for seq in 0..3 {
            assert!(ctx.timer_ops.contains(&TimerOp::Stop(s(seq))));
        }
        assert_invariant(&window);
    }

    #[test]
    fn repeated_and_stale_acks_are_idempotent() {
        let mut ctx = RecordingContext::default();
        let mut window = SenderWindow::new();
        fill(&mut window, &mut ctx, 5);

        let mut ready = true;
        let mut link = Link::new(&mut ctx, &mut ready);
        assert_eq!(window.on_ack(&mut link, s(2)), 3);
        assert_eq!(window.on_ack(&mut link, s(2)), 0);
        assert_eq!(window.on_ack(&mut link, s(0)), 0);
        // ack for a frame never sent
        assert_eq!(window.on_ack(&mut link, s(6)), 0);
        assert_eq!(window.nbuffered(), 2);
        assert_invariant(&window);
    }

    #[test]
    fn ack_sweep_across_wrap() {
        let mut ctx = RecordingContext::default();
        let mut window = SenderWindow::new();
        fill(&mut window, &mut ctx, 6);
        {
            let mut ready = true;
            let mut link = Link::new(&mut ctx, &mut ready);
            window.on_ack(&mut link, s(5));
        }
        // window now starts at 6
        fill(&mut window, &mut ctx, 5);
        assert_eq!(window.ack_expected(), s(6));
        assert_eq!(window.next_frame_to_send(), s(3));

        let mut ready = true;
        let mut link = Link::new(&mut ctx, &mut ready);
        assert_eq!(window.on_ack(&mut link, s(0)), 3);
        assert_eq!(window.ack_expected(), s(1));
        assert_eq!(window.nbuffered(), 2);
        assert_invariant(&window);
    }

    #[test]
    fn retransmits_whole_window_in_order() {
        let mut ctx = RecordingContext::default();
        let mut window = SenderWindow::new();
        fill(&mut window, &mut ctx, 7);
        {
            let mut ready = true;
            let mut link = Link::new(&mut ctx, &mut ready);
            window.on_ack(&mut link, s(3));
        }
        ctx.clear();

        let mut ready = true;
        let mut link = Link::new(&mut ctx, &mut ready);
        assert_eq!(window.retransmit_all_outstanding(&mut link, s(1), TIMEOUT), 3);

        let seqs: Vec<Seq> = ctx.sent_frames().iter().filter_map(Frame::seq).collect();
        assert_eq!(seqs, vec![s(4), s(5), s(6)]);
        assert!(ctx.sent_frames().iter().all(|f| f.ack() == s(1)));
        assert_eq!(
            ctx.timer_ops
                .iter()
                .filter(|op| matches!(op, TimerOp::Start(..)))
                .count(),
            3
        );
        assert_eq!(window.next_frame_to_send(), s(7));
        assert_invariant(&window);
    }

    #[test]
    fn retransmit_with_empty_window_sends_nothing() {
        let mut ctx = RecordingContext::default();
        let mut ready = true;
        let mut link = Link::new(&mut ctx, &mut ready);
        let mut window = SenderWindow::new();
        assert_eq!(window.retransmit_all_outstanding(&mut link, s(0), TIMEOUT), 0);
        assert!(ctx.sent_frames().is_empty());
    }
}
