//! Scenario definitions.
//!
//! Each scenario is a named run configuration. All scenarios are
//! deterministic given the same seed.

use detector_models::SpectrometerConfig;
use serde::{Deserialize, Serialize};

/// Which pre-defined scenario to load.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// Two planes per side, 50 MeV beam, noise and resolution tails
    FourPlane,
    /// Three planes per side, otherwise as four-plane
    SixPlane,
    /// Gaussian resolution only: full efficiency, no tails, no noise
    Ideal,
    /// Magnet off, four-parameter straight-line fit
    NoField,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub config: SpectrometerConfig,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        let (name, config) = match kind {
            ScenarioKind::FourPlane => ("four-plane", SpectrometerConfig::default()),
            ScenarioKind::SixPlane => ("six-plane", Self::six_plane()),
            ScenarioKind::Ideal => ("ideal", Self::ideal()),
            ScenarioKind::NoField => ("no-field", Self::no_field()),
        };
        Scenario {
            name: name.into(),
            config: SpectrometerConfig { seed, ..config },
        }
    }

    fn six_plane() -> SpectrometerConfig {
        SpectrometerConfig {
            planes_per_side: 3,
            ..Default::default()
        }
    }

    fn ideal() -> SpectrometerConfig {
        SpectrometerConfig {
            tail_amplitude: 0.0,
            noise_occupancy: 0.0,
            hit_efficiency: 1.0,
            ..Default::default()
        }
    }

    fn no_field() -> SpectrometerConfig {
        SpectrometerConfig {
            integral_bdl: 0.0,
            fit_momentum: false,
            ..Default::default()
        }
    }
}
