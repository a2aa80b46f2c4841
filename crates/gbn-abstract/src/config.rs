use serde::{Deserialize, Serialize};

/// Protocol timing. These values are tunable and do not change the protocol's semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Retransmission timeout for an unacknowledged data frame.
    pub data_timeout_ms: u64,
    /// How long an acknowledgment may wait for a data frame to piggy-back on.
    pub ack_timeout_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            data_timeout_ms: 2800,
            ack_timeout_ms: 240,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
    /// Link bandwidth in each direction.
    pub bits_per_ms: u64,
    pub seed: u64,
    pub protocol: ProtocolConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            min_latency: 270,
            max_latency: 270,
            bits_per_ms: 8,
            seed: 0,
            protocol: ProtocolConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: SimConfig = toml::from_str(
            r#"
            loss_rate = 0.25

            [protocol]
            ack_timeout_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(cfg.loss_rate, 0.25);
        assert_eq!(cfg.bits_per_ms, 8);
        assert_eq!(cfg.protocol.ack_timeout_ms, 100);
        assert_eq!(cfg.protocol.data_timeout_ms, 2800);
    }
}
