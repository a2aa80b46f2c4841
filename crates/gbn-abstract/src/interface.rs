use crate::seq::Seq;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two stations sharing a point-to-point link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationId {
    A,
    B,
}

impl StationId {
    pub fn peer(&self) -> Self {
        match self {
            StationId::A => StationId::B,
            StationId::B => StationId::A,
        }
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationId::A => f.write_str("A"),
            StationId::B => f.write_str("B"),
        }
    }
}

impl FromStr for StationId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a" | "A" => Ok(StationId::A),
            "b" | "B" => Ok(StationId::B),
            other => Err(format!("unknown station '{other}', expected 'a' or 'b'")),
        }
    }
}

/// Metric a protocol reports after every event with its count of sent but
/// unacknowledged frames. Runtimes read it to know when the link is drained.
pub const OUTSTANDING_METRIC: &str = "nbuffered";

/// Identifies a timer. Each outstanding data frame owns one, and one more is
/// shared for deferred acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TimerKey {
    Data(Seq),
    Ack,
}

/// Events yielded by the runtime's wait call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The network layer has a packet ready; fetch it with [`LinkContext::next_packet`].
    NetworkLayerReady,
    /// The physical layer can accept another frame.
    PhysicalLayerReady,
    /// A frame arrived; fetch it with [`LinkContext::receive_frame`].
    FrameReceived,
    DataTimeout(Seq),
    AckTimeout,
}

/// The capabilities a runtime provides to a data-link protocol.
///
/// All calls are made from the thread that handles the current event. None of
/// them block.
pub trait LinkContext {
    /// Pull the next outgoing packet from the network layer.
    fn next_packet(&mut self) -> Option<Bytes>;

    /// Hand an in-order packet to the network layer.
    fn deliver_packet(&mut self, packet: &[u8]);

    /// Queue a fully encoded frame on the physical layer.
    fn transmit(&mut self, frame: Bytes);

    /// Take the frame announced by the last [`LinkEvent::FrameReceived`].
    fn receive_frame(&mut self) -> Option<Bytes>;

    /// Start (or restart) the retransmission timer for `seq`.
    fn start_timer(&mut self, seq: Seq, delay_ms: u64);

    /// Cancel the retransmission timer for `seq`. Cancelling an idle timer is a no-op.
    fn stop_timer(&mut self, seq: Seq);

    /// Arm the acknowledgment-delay timer. If it is already running its
    /// original deadline is kept.
    fn start_ack_timer(&mut self, delay_ms: u64);

    fn stop_ack_timer(&mut self);

    /// Allow the network layer to raise [`LinkEvent::NetworkLayerReady`].
    fn enable_network_layer(&mut self);

    fn disable_network_layer(&mut self);

    /// Log a message to the runtime's debug output.
    fn log(&mut self, message: &str);

    /// Current runtime time in ms.
    fn now(&self) -> u64;

    /// Record a numeric sample (e.g. [`OUTSTANDING_METRIC`]) for reports and assertions.
    fn record_metric(&mut self, _name: &str, _value: f64) {}
}

/// A data-link protocol driven one event at a time.
pub trait DataLinkProtocol {
    /// Called once before the first event.
    fn init(&mut self, _ctx: &mut dyn LinkContext) {}

    /// Handle one event to completion.
    fn on_event(&mut self, ctx: &mut dyn LinkContext, event: LinkEvent);
}

/// A runtime that can also block for the next event.
pub trait LinkDriver: LinkContext {
    /// The sole suspension point. `None` means the runtime has shut down.
    fn wait_for_event(&mut self) -> Option<LinkEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn station_parsing_and_peer() {
        assert_eq!("a".parse::<StationId>(), Ok(StationId::A));
        assert_eq!("B".parse::<StationId>(), Ok(StationId::B));
        assert!("c".parse::<StationId>().is_err());
        assert_eq!(StationId::A.peer(), StationId::B);
        assert_eq!(StationId::B.peer().to_string(), "A");
    }
}
