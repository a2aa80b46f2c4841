use crate::codec::Frame;
use crate::link::Link;
use gbn_abstract::Seq;
use tracing::debug;

/// What happened to an incoming data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reception {
    /// In order; the payload went to the network layer.
    Accepted,
    /// Out of order; discarded and a NAK was sent.
    Nak,
    /// Out of order while a NAK is already outstanding; discarded silently.
    Discarded,
}

/// Go-Back-N receiving side: a single cursor and the NAK-suppression flag.
#[derive(Debug)]
pub struct ReceiverSequencer {
    frame_expected: Seq,
    no_nak: bool,
}

impl Default for ReceiverSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiverSequencer {
    pub fn new() -> Self {
        Self {
            frame_expected: Seq::ZERO,
            no_nak: true,
        }
    }

    pub fn frame_expected(&self) -> Seq {
        self.frame_expected
    }

    pub fn no_nak(&self) -> bool {
        self.no_nak
    }

    /// Cumulative acknowledgment value carried by every outgoing frame.
    pub fn ack_value(&self) -> Seq {
        self.frame_expected.prev()
    }

    pub fn on_data_frame(
        &mut self,
        link: &mut Link<'_>,
        seq: Seq,
        payload: &[u8],
        ack_timeout_ms: u64,
    ) -> Reception {
        if seq != self.frame_expected {
            debug!(seq = %seq, expected = %self.frame_expected, no_nak = self.no_nak, "out of order");
            if self.no_nak {
                self.send_nak(link);
                return Reception::Nak;
            }
            link.start_ack_timer(ack_timeout_ms);
            return Reception::Discarded;
        }

        link.deliver(payload);
        self.no_nak = true;
        self.frame_expected = seq.next();
        link.start_ack_timer(ack_timeout_ms);
        Reception::Accepted
    }

    /// A frame arrived damaged. NAK it unless a NAK is already outstanding.
    /// Returns whether a NAK was sent.
    pub fn on_corrupt_frame(&mut self, link: &mut Link<'_>) -> bool {
        if !self.no_nak {
            return false;
        }
        self.send_nak(link);
        true
    }

    fn send_nak(&mut self, link: &mut Link<'_>) {
        let ack = self.ack_value();
        link.log(&format!("send NAK {ack}"));
        link.send(&Frame::Nak { ack });
        self.no_nak = false;
    }
}
