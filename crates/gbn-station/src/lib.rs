//! Go-Back-N over UDP: one process per station, each talking to its peer.

pub mod config;
pub mod runtime;
pub mod traffic;

pub use config::{ConfigError, StationConfig};
pub use runtime::{StationSummary, UdpStation};
pub use traffic::{DeliveryCheck, PacketSource, TrafficError};
