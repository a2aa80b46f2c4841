use gbn_abstract::{PACKET_ID_LEN, PKT_LEN, ProtocolConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("bit error rate {0} is outside [0, 1]")]
    BerOutOfRange(f64),
    #[error("payload length {len} outside {min}..={max}")]
    PayloadLen { len: usize, min: usize, max: usize },
}

/// Settings for one UDP station. Every field has a default, so a TOML file
/// only needs the values it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub protocol: ProtocolConfig,
    /// Probability that any single bit is flipped before a frame is sent.
    pub ber: f64,
    pub seed: u64,
    /// Numbered packets this station offers.
    pub packets: u32,
    /// Packets expected from the peer. Defaults to `packets`.
    pub expect: Option<u32>,
    pub payload_len: usize,
    /// How long to keep serving the peer after all work is done.
    pub linger_ms: u64,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            ber: 0.0,
            seed: 0,
            packets: 1000,
            expect: None,
            payload_len: PKT_LEN,
            linger_ms: 3000,
        }
    }
}

impl StationConfig {
    pub fn expected(&self) -> u32 {
        self.expect.unwrap_or(self.packets)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.ber) {
            return Err(ConfigError::BerOutOfRange(self.ber));
        }
        if !(PACKET_ID_LEN..=PKT_LEN).contains(&self.payload_len) {
            return Err(ConfigError::PayloadLen {
                len: self.payload_len,
                min: PACKET_ID_LEN,
                max: PKT_LEN,
            });
        }
        Ok(())
    }
}
