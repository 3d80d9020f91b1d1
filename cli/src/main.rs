//! `spectro` CLI: scenario runs, configuration dump, report printing.

use anyhow::Result;
use clap::{Parser, Subcommand};
use detector_models::SpectrometerConfig;
use sim::report::{load_config, load_report, save_report, RunReport};
use sim::scenarios::{Scenario, ScenarioKind};
use std::path::{Path, PathBuf};
use tracker_core::metrics::{RunCounters, RunSummary};

#[derive(Parser)]
#[command(name = "spectro", about = "Spectrometer track simulation and reconstruction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate and reconstruct a scenario, then print the counters.
    Run {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// JSON configuration replacing the scenario preset
        #[arg(long)]
        config: Option<PathBuf>,
        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,
        /// Number of events
        #[arg(long)]
        events: Option<usize>,
        /// Tracking planes on each side of the magnet
        #[arg(long)]
        planes_per_side: Option<usize>,
        /// Run on the calling thread only
        #[arg(long)]
        sequential: bool,
        /// Write the run report to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the configuration of a scenario as JSON.
    ShowConfig {
        #[arg(value_enum)]
        scenario: ScenarioKind,
    },
    /// Print a previously saved run report.
    Report {
        /// Path to report JSON file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            config,
            seed,
            events,
            planes_per_side,
            sequential,
            output,
        } => {
            let mut scenario = Scenario::build(scenario, seed.unwrap_or(42));
            if let Some(path) = &config {
                scenario.config = load_config(path)?;
                scenario.name = config_scenario_name(path);
            }
            apply_overrides(&mut scenario.config, seed, events, planes_per_side);
            run(&scenario, sequential, output.as_deref())?;
        }
        Commands::ShowConfig { scenario } => {
            let scenario = Scenario::build(scenario, SpectrometerConfig::default().seed);
            println!("{}", serde_json::to_string_pretty(&scenario.config)?);
        }
        Commands::Report { input } => {
            let report = load_report(&input)?;
            println!("Report of scenario '{}' (seed={})", report.scenario_name, report.config.seed);
            print_summary(&report.summary, report.config.n_planes());
        }
    }

    Ok(())
}

/// A configuration file replaces the preset, so the run is named after the file.
fn config_scenario_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "custom".into())
}

fn apply_overrides(
    cfg: &mut SpectrometerConfig,
    seed: Option<u64>,
    events: Option<usize>,
    planes_per_side: Option<usize>,
) {
    if let Some(seed) = seed {
        cfg.seed = seed;
    }
    if let Some(n) = events {
        cfg.n_events = n;
    }
    if let Some(n) = planes_per_side {
        cfg.planes_per_side = n;
        // a per-plane list sized for the old layout no longer applies
        if cfg.plane_efficiencies.as_ref().is_some_and(|e| e.len() != cfg.n_planes()) {
            tracing::warn!("dropping plane_efficiencies after changing the plane count");
            cfg.plane_efficiencies = None;
        }
    }
}

fn run(scenario: &Scenario, sequential: bool, output_path: Option<&Path>) -> Result<()> {
    let cfg = &scenario.config;
    println!(
        "Running scenario '{}' (seed={}, events={}, planes={})...",
        scenario.name,
        cfg.seed,
        cfg.n_events,
        cfg.n_planes()
    );

    let start = std::time::Instant::now();
    let acct = if sequential {
        sim::run_sequential(cfg)?
    } else {
        sim::run_parallel(cfg)?
    };
    let summary = acct.summary();
    println!("Done: elapsed={:.2}s", start.elapsed().as_secs_f64());
    print_summary(&summary, cfg.n_planes());

    if let Some(path) = output_path {
        let report = RunReport {
            scenario_name: scenario.name.clone(),
            config: cfg.clone(),
            summary,
        };
        save_report(&report, path)?;
        println!("Report saved to {}", path.display());
    }

    Ok(())
}

/// Counter lines of the summary; `n_planes` is the total plane count.
fn counter_lines(counters: &RunCounters, n_planes: usize) -> Vec<String> {
    let c = counters;
    [
        ("Generated tracks", c.generated),
        ("Reconstructed tracks", c.reconstructed),
        ("Reconstructed tracks without noise hits", c.reconstructed_clean),
        ("Tracks lost due to missing hit", c.rejected_inefficient),
        ("Tracks lost with no surviving combination", c.rejected_no_candidate),
        ("Tracks lost to quality cuts", c.rejected_quality),
        ("Tracks with all signal hits lost to quality", c.rejected_quality_clean),
        ("Tracks lost to failed fits in the search", c.search_failures),
        ("Failed refits", c.fit_failures),
        ("Numerical failures during search", c.numerical_failures),
        ("Total hits", c.total_hits),
        ("Used noise hits", c.background_hits_on_track),
        ("Hits per track is always", n_planes as u64),
    ]
    .into_iter()
    .map(|(label, value)| format!(" {label:<44} {value}"))
    .collect()
}

fn print_summary(summary: &RunSummary, n_planes: usize) {
    for line in counter_lines(&summary.counters, n_planes) {
        println!("{line}");
    }

    println!();
    println!(" {:<8} {:>14} {:>14} {:>10} {:>10}", "param", "resid mean", "resid rms", "pull mean", "pull std");
    for p in &summary.parameters {
        println!(
            " {:<8} {:>14.6e} {:>14.6e} {:>10.3} {:>10.3}",
            p.name, p.residual.mean, p.residual.std_dev, p.pull.mean, p.pull.std_dev
        );
    }
    println!(
        " chi2 first pass: mean {:.3} ({} tracks), refit: mean {:.3}",
        summary.first_pass_chi2.mean, summary.first_pass_chi2.count, summary.refit_chi2.mean
    );
    for (plane, stats) in &summary.gate_chi2 {
        println!(" z chi2 at plane {plane}: mean {:.3} ({} hits)", stats.mean, stats.count);
    }
}
