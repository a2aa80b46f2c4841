use anyhow::{Context, Result};
use clap::Parser;
use gbn_abstract::StationId;
use gbn_core::GoBackN;
use gbn_station::{StationConfig, UdpStation};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Go-Back-N station over UDP")]
struct Args {
    /// Which end of the link this process is (a or b).
    #[arg(long)]
    station: StationId,

    #[arg(long)]
    bind: SocketAddr,

    #[arg(long)]
    peer: SocketAddr,

    /// Bit error rate applied to outgoing frames.
    #[arg(long)]
    ber: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Number of packets to send (and to expect from the peer).
    #[arg(long)]
    packets: Option<u32>,

    #[arg(long)]
    payload_len: Option<usize>,

    /// Station configuration (TOML). Flags override it.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn station_config(&self) -> Result<StationConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                toml::from_str(&content).context("Failed to parse config file")?
            }
            None => StationConfig::default(),
        };
        if let Some(v) = self.ber {
            config.ber = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.packets {
            config.packets = v;
        }
        if let Some(v) = self.payload_len {
            config.payload_len = v;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();
    info!("gbn-station starting...");

    let config = args.station_config()?;
    let mut station = UdpStation::bind(args.station, args.bind, &config)?;
    station.set_peer(args.peer);

    let mut protocol = GoBackN::new(config.protocol);
    let summary = station.run(&mut protocol)?;
    info!(
        "sent {} packets, received {} in order, {} events in {:.2?}",
        summary.sent, summary.received, summary.events, summary.elapsed
    );
    Ok(())
}

/// `RUST_LOG` if set and valid, otherwise `info` so run summaries are shown.
fn log_filter(spec: Option<&str>) -> EnvFilter {
    spec.and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
