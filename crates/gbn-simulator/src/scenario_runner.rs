use crate::engine::Simulator;
use crate::trace::SimulationReport;
use anyhow::{Context, anyhow, bail};
use gbn_abstract::{
    DataLinkProtocol, OUTSTANDING_METRIC, SimConfig, StationId, TestAction, TestAssertion, TestScenario,
    numbered_packet,
};
use std::collections::HashMap;
use std::fs;
use tracing::info;

const DEFAULT_MAX_DURATION_MS: u64 = 600_000;

/// Result of a scenario whose assertions all held.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub name: String,
    pub report: SimulationReport,
}

pub fn run_scenario(
    scenario_path: &str,
    station_a: Box<dyn DataLinkProtocol>,
    station_b: Box<dyn DataLinkProtocol>,
) -> anyhow::Result<ScenarioOutcome> {
    let content = fs::read_to_string(scenario_path).context("Failed to read scenario file")?;
    run_scenario_str(&content, station_a, station_b)
}

pub fn run_scenario_str(
    content: &str,
    station_a: Box<dyn DataLinkProtocol>,
    station_b: Box<dyn DataLinkProtocol>,
) -> anyhow::Result<ScenarioOutcome> {
    let scenario: TestScenario = toml::from_str(content).context("Failed to parse scenario")?;
    run_loaded(&scenario, SimConfig::default(), station_a, station_b)
}

/// Run an already parsed scenario on top of `base` configuration.
pub fn run_loaded(
    scenario: &TestScenario,
    base: SimConfig,
    station_a: Box<dyn DataLinkProtocol>,
    station_b: Box<dyn DataLinkProtocol>,
) -> anyhow::Result<ScenarioOutcome> {
    info!("Running Scenario: {}", scenario.name);
    info!("Description: {}", scenario.description);

    let mut config = base;
    scenario.config.apply_to(&mut config);

    let mut sim = Simulator::new(config, station_a, station_b);

    // Configure actions (network-layer offers, deterministic faults)
    let mut next_id: HashMap<StationId, u32> = HashMap::new();
    for action in &scenario.actions {
        match action {
            TestAction::Send {
                time,
                station,
                data,
            } => {
                sim.schedule_packet(*time, *station, data.as_bytes().to_vec());
            }
            TestAction::Burst {
                time,
                station,
                count,
                len,
            } => {
                let id = next_id.entry(*station).or_default();
                for _ in 0..*count {
                    sim.schedule_packet(*time, *station, numbered_packet(*id, *len));
                    *id += 1;
                }
            }
            TestAction::DropData { station, seq } => sim.add_drop_data_once(*station, *seq),
            TestAction::CorruptData { station, seq } => {
                sim.add_corrupt_data_once(*station, *seq)
            }
            TestAction::DropAck { station, ack } => sim.add_drop_ack_once(*station, *ack),
        }
    }

    // Call init after we've configured the simulator
    sim.init();

    let max_duration = scenario
        .assertions
        .iter()
        .find_map(|a| match a {
            TestAssertion::MaxDuration { ms } => Some(*ms),
            _ => None,
        })
        .unwrap_or(DEFAULT_MAX_DURATION_MS);

    while sim.step() {
        if sim.current_time() > max_duration {
            bail!("Test timed out after {} ms", max_duration);
        }
    }

    for assertion in &scenario.assertions {
        check(&sim, assertion)?;
    }

    info!("Test Scenario Passed!");
    Ok(ScenarioOutcome {
        name: scenario.name.clone(),
        report: sim.export_report(),
    })
}

fn check_range(what: &str, station: StationId, actual: u32, min: u32, max: Option<u32>) -> anyhow::Result<()> {
    if actual < min {
        bail!("Assertion Failed: station {station} {what} {actual}, expected min {min}");
    }
    if let Some(max) = max
        && actual > max
    {
        bail!("Assertion Failed: station {station} {what} {actual}, expected max {max}");
    }
    Ok(())
}

fn check(sim: &Simulator, assertion: &TestAssertion) -> anyhow::Result<()> {
    match assertion {
        TestAssertion::AllDelivered { station } => {
            let expected = &sim.stats(station.peer()).offered;
            let delivered = &sim.stats(*station).delivered;
            if delivered != expected {
                return Err(anyhow!(
                    "Assertion Failed: station {} delivered {} of {} packets offered at {} (or out of order)",
                    station,
                    delivered.len(),
                    expected.len(),
                    station.peer()
                ));
            }
        }
        TestAssertion::DeliveredInOrder { station, data } => {
            let delivered = &sim.stats(*station).delivered;
            let expected: Vec<&[u8]> = data.iter().map(|d| d.as_bytes()).collect();
            let actual: Vec<&[u8]> = delivered.iter().map(Vec::as_slice).collect();
            if actual != expected {
                return Err(anyhow!(
                    "Assertion Failed: station {} delivered {:?}, expected {:?}",
                    station,
                    delivered
                        .iter()
                        .map(|d| String::from_utf8_lossy(d).into_owned())
                        .collect::<Vec<_>>(),
                    data
                ));
            }
        }
        TestAssertion::FramesSent { station, min, max } => {
            check_range("sent frames", *station, sim.stats(*station).frames_sent(), *min, *max)?;
        }
        TestAssertion::Retransmissions { station, min, max } => {
            check_range(
                "retransmitted",
                *station,
                sim.stats(*station).retransmissions(),
                *min,
                *max,
            )?;
        }
        TestAssertion::NaksSent { station, min, max } => {
            check_range("sent NAKs", *station, sim.stats(*station).nak_frames, *min, *max)?;
        }
        TestAssertion::MaxOutstanding { station, max } => {
            let peak = sim.stats(*station).peak_metric(OUTSTANDING_METRIC).unwrap_or(0.0);
            if peak > f64::from(*max) {
                bail!(
                    "Assertion Failed: station {} had {} frames outstanding, expected max {}",
                    station,
                    peak,
                    max
                );
            }
        }
        TestAssertion::MaxDuration { .. } => {} // Already checked
    }
    Ok(())
}
