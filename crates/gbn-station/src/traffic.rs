use bytes::Bytes;
use gbn_abstract::{numbered_packet, packet_id};
use std::time::Instant;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrafficError {
    #[error("delivered packet is not a numbered packet ({len} bytes)")]
    Malformed { len: usize },
    #[error("expected packet {expected}, got {got}")]
    OutOfOrder { expected: u32, got: u32 },
}

/// Network-layer source of numbered packets.
#[derive(Debug)]
pub struct PacketSource {
    next_id: u32,
    total: u32,
    payload_len: usize,
}

impl PacketSource {
    pub fn new(total: u32, payload_len: usize) -> Self {
        Self {
            next_id: 0,
            total,
            payload_len,
        }
    }

    pub fn has_next(&self) -> bool {
        self.next_id < self.total
    }

    pub fn sent(&self) -> u32 {
        self.next_id
    }

    pub fn next_packet(&mut self) -> Option<Bytes> {
        if !self.has_next() {
            return None;
        }
        let packet = numbered_packet(self.next_id, self.payload_len);
        self.next_id += 1;
        Some(Bytes::from(packet))
    }
}

/// Network-layer sink that checks packets arrive exactly once and in id order.
#[derive(Debug)]
pub struct DeliveryCheck {
    next_id: u32,
    bytes: u64,
    started: Instant,
}

impl Default for DeliveryCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryCheck {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            bytes: 0,
            started: Instant::now(),
        }
    }

    pub fn received(&self) -> u32 {
        self.next_id
    }

    pub fn on_delivery(&mut self, packet: &[u8]) -> Result<u32, TrafficError> {
        let id = packet_id(packet).ok_or(TrafficError::Malformed { len: packet.len() })?;
        if id != self.next_id {
            return Err(TrafficError::OutOfOrder {
                expected: self.next_id,
                got: id,
            });
        }
        self.next_id += 1;
        self.bytes += packet.len() as u64;
        if self.next_id % 100 == 0 {
            let secs = self.started.elapsed().as_secs_f64().max(1e-3);
            info!(
                received = self.next_id,
                "throughput {:.1} kbit/s",
                self.bytes as f64 * 8.0 / secs / 1000.0
            );
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_runs_dry() {
        let mut source = PacketSource::new(2, 8);
        assert_eq!(packet_id(&source.next_packet().unwrap()), Some(0));
        assert_eq!(packet_id(&source.next_packet().unwrap()), Some(1));
        assert!(source.next_packet().is_none());
        assert_eq!(source.sent(), 2);
    }

    #[test]
    fn check_rejects_gaps_and_duplicates() {
        let mut check = DeliveryCheck::new();
        assert_eq!(check.on_delivery(&numbered_packet(0, 8)), Ok(0));
        assert_eq!(
            check.on_delivery(&numbered_packet(0, 8)),
            Err(TrafficError::OutOfOrder {
                expected: 1,
                got: 0
            })
        );
        assert_eq!(
            check.on_delivery(&numbered_packet(2, 8)),
            Err(TrafficError::OutOfOrder {
                expected: 1,
                got: 2
            })
        );
        assert_eq!(
            check.on_delivery(b"xy"),
            Err(TrafficError::Malformed { len: 2 })
        );
        assert_eq!(check.received(), 1);
    }
}
