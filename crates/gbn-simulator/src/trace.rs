use serde::Serialize;
use std::collections::HashMap;
use gbn_abstract::{SimConfig, StationId};

use crate::engine::{LinkEventSummary, StationStats};

#[derive(Debug, Clone, Serialize)]
pub struct StationReport {
    pub station: StationId,
    pub offered: usize,
    pub delivered_data: Vec<Vec<u8>>,
    pub data_frames: u32,
    pub ack_frames: u32,
    pub nak_frames: u32,
    pub retransmissions: u32,
    pub metrics: HashMap<String, Vec<(u64, f64)>>,
}

impl StationReport {
    pub fn new(station: StationId, stats: &StationStats) -> Self {
        Self {
            station,
            offered: stats.offered.len(),
            delivered_data: stats.delivered.clone(),
            data_frames: stats.data_frames,
            ack_frames: stats.ack_frames,
            nak_frames: stats.nak_frames,
            retransmissions: stats.retransmissions(),
            metrics: stats.metrics.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub duration_ms: u64,
    pub stations: Vec<StationReport>,
    pub link_events: Vec<LinkEventSummary>,
}
