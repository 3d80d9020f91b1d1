//! Run reports: JSON configuration input and summary output.

use anyhow::Context;
use detector_models::SpectrometerConfig;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracker_core::metrics::RunSummary;

/// Everything needed to interpret a finished run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub scenario_name: String,
    pub config: SpectrometerConfig,
    pub summary: RunSummary,
}

/// Save a run report to a JSON file.
pub fn save_report(report: &RunReport, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}

/// Load a run report from a JSON file.
pub fn load_report(path: &Path) -> anyhow::Result<RunReport> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    let report: RunReport = serde_json::from_reader(reader)?;
    Ok(report)
}

/// Load and validate a configuration. Missing fields take their defaults.
pub fn load_config(path: &Path) -> anyhow::Result<SpectrometerConfig> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let cfg: SpectrometerConfig = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(cfg)
}
