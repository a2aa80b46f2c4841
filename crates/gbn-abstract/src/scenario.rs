use crate::config::SimConfig;
use crate::interface::StationId;
use crate::seq::Seq;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: SimConfigOverride,
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub loss_rate: Option<f64>,
    pub corrupt_rate: Option<f64>,
    pub min_latency: Option<u64>,
    pub max_latency: Option<u64>,
    pub bits_per_ms: Option<u64>,
    pub seed: Option<u64>,
    pub data_timeout_ms: Option<u64>,
    pub ack_timeout_ms: Option<u64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.corrupt_rate {
            config.corrupt_rate = v;
        }
        if let Some(v) = self.min_latency {
            config.min_latency = v;
        }
        if let Some(v) = self.max_latency {
            config.max_latency = v;
        }
        if let Some(v) = self.bits_per_ms {
            config.bits_per_ms = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.data_timeout_ms {
            config.protocol.data_timeout_ms = v;
        }
        if let Some(v) = self.ack_timeout_ms {
            config.protocol.ack_timeout_ms = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// The network layer of `station` offers a packet at `time`
    Send {
        time: u64,
        station: StationId,
        data: String,
    },
    /// Offer `count` numbered packets of `len` bytes at `time`
    Burst {
        time: u64,
        station: StationId,
        count: u32,
        len: usize,
    },
    /// Drop the next data frame `station` sends with sequence number `seq`
    DropData { station: StationId, seq: Seq },
    /// Corrupt the next data frame `station` sends with sequence number `seq`
    CorruptData { station: StationId, seq: Seq },
    /// Drop the next standalone ACK frame `station` sends carrying `ack`
    DropAck { station: StationId, ack: Seq },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// `station` delivered exactly the packets its peer was offered, in order
    AllDelivered { station: StationId },
    /// `station` delivered exactly this sequence of packets
    DeliveredInOrder {
        station: StationId,
        data: Vec<String>,
    },
    /// Total frames put on the wire by `station`
    FramesSent {
        station: StationId,
        min: u32,
        max: Option<u32>,
    },
    /// Data frames sent by `station` beyond the first transmission of each packet
    Retransmissions {
        station: StationId,
        min: u32,
        max: Option<u32>,
    },
    /// NAK frames sent by `station`
    NaksSent {
        station: StationId,
        min: u32,
        max: Option<u32>,
    },
    /// Peak number of outstanding frames reported by `station`
    MaxOutstanding { station: StationId, max: u32 },
    /// Simulation finishes within the given time
    MaxDuration { ms: u64 },
}
