use crate::codec::{self, Frame};
use gbn_abstract::{LinkContext, Seq};
use tracing::trace;

/// The outbound half of a station for the duration of one event.
///
/// Every frame leaves through [`Link::send`]. Putting a frame on the wire
/// occupies the physical layer until it reports ready again, and it carries
/// the current cumulative acknowledgment, so any pending deferred ACK is
/// cancelled.
pub struct Link<'a> {
    ctx: &'a mut dyn LinkContext,
    phl_ready: &'a mut bool,
}

impl<'a> Link<'a> {
    pub fn new(ctx: &'a mut dyn LinkContext, phl_ready: &'a mut bool) -> Self {
        Self { ctx, phl_ready }
    }

    pub fn send(&mut self, frame: &Frame) {
        let raw = codec::encode(frame);
        trace!(kind = ?frame.kind(), ack = %frame.ack(), len = raw.len(), "transmit");
        self.ctx.transmit(raw);
        *self.phl_ready = false;
        self.ctx.stop_ack_timer();
    }

    pub fn start_timer(&mut self, seq: Seq, delay_ms: u64) {
        self.ctx.start_timer(seq, delay_ms);
    }

    pub fn stop_timer(&mut self, seq: Seq) {
        self.ctx.stop_timer(seq);
    }

    pub fn start_ack_timer(&mut self, delay_ms: u64) {
        self.ctx.start_ack_timer(delay_ms);
    }

    pub fn deliver(&mut self, packet: &[u8]) {
        self.ctx.deliver_packet(packet);
    }

    pub fn log(&mut self, message: &str) {
        self.ctx.log(message);
    }
}
