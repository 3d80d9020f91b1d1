//! `sim` — Event simulator, scenario presets, run driver and reports.

pub mod driver;
pub mod event_sim;
pub mod random;
pub mod report;
pub mod scenarios;
pub mod trajectory;

pub use driver::{run_parallel, run_sequential};
pub use event_sim::EventSimulator;
pub use random::RandomSource;
pub use report::{load_config, load_report, save_report, RunReport};
pub use scenarios::{Scenario, ScenarioKind};
pub use trajectory::TrackState;
