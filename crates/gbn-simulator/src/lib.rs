pub mod engine;
pub mod scenario_runner;
pub mod trace;

pub use engine::{LinkEventSummary, Simulator, StationStats};
pub use scenario_runner::{ScenarioOutcome, run_loaded, run_scenario, run_scenario_str};
pub use trace::{SimulationReport, StationReport};
