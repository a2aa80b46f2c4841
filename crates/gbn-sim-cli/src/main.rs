use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gbn_abstract::{DataLinkProtocol, SimConfig, StationId, TestScenario, numbered_packet};
use gbn_core::GoBackN;
use gbn_simulator::{SimulationReport, Simulator, run_loaded};

#[derive(Parser, Debug)]
#[command(author, version, about = "Go-Back-N link simulator")]
struct Args {
    /// Load a scenario from disk.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Base link configuration (TOML). Scenario overrides apply on top.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Packets each station offers when no scenario is given.
    #[arg(long, default_value_t = 50)]
    packets: u32,

    /// Payload length of the generated packets.
    #[arg(long, default_value_t = 64)]
    payload_len: usize,

    #[arg(long)]
    loss_rate: Option<f64>,

    #[arg(long)]
    corrupt_rate: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();
    info!("gbn-sim-cli starting…");

    let config = args.sim_config()?;

    let report = if let Some(path) = &args.scenario {
        let scenario = load_scenario(path)?;
        let outcome = run_loaded(&scenario, config.clone(), station(&config), station(&config))?;
        outcome.report
    } else {
        run_default_sim(config, args.packets, args.payload_len)
    };

    for station in &report.stations {
        info!(
            "station {}: offered {}, delivered {}, data frames {}, retransmissions {}, NAKs {}",
            station.station,
            station.offered,
            station.delivered_data.len(),
            station.data_frames,
            station.retransmissions,
            station.nak_frames
        );
    }

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    Ok(())
}

impl Args {
    fn sim_config(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                toml::from_str(&content).context("Failed to parse config file")?
            }
            None => SimConfig::default(),
        };
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.corrupt_rate {
            config.corrupt_rate = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        Ok(config)
    }
}

fn station(config: &SimConfig) -> Box<dyn DataLinkProtocol> {
    Box::new(GoBackN::new(config.protocol))
}

fn run_default_sim(config: SimConfig, packets: u32, payload_len: usize) -> SimulationReport {
    let mut sim = Simulator::go_back_n(config);
    for id in 0..packets {
        sim.schedule_packet(0, StationId::A, numbered_packet(id, payload_len));
        sim.schedule_packet(0, StationId::B, numbered_packet(id, payload_len));
    }
    info!("Starting default headless simulation…");
    sim.run_until_complete();
    info!("Simulation complete at {} ms.", sim.current_time());
    sim.export_report()
}

fn load_scenario(path: &Path) -> Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    let scenario: TestScenario =
        toml::from_str(&content).context("Failed to parse scenario file")?;
    Ok(scenario)
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}

/// `RUST_LOG` if set and valid, otherwise `info` so run summaries are shown.
fn log_filter(spec: Option<&str>) -> EnvFilter {
    spec.and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
