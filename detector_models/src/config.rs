//! Run configuration for the spectrometer simulation and reconstruction.
//!
//! Lengths are in cm, momenta in GeV, field integrals in T·cm.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Converts ∫B·dl (T·cm) divided by p (GeV) into a bending angle (rad).
pub const MAGNETIC_KICK_CONSTANT: f64 = 0.003;

/// Scale factor on the number of degrees of freedom for the derived total χ² cut.
pub const CUT3_PER_DOF: f64 = 2.5;

/// Full description of one simulation + reconstruction run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrometerConfig {
    /// Number of events to simulate
    pub n_events: usize,
    /// Tracking planes on each side of the magnet
    pub planes_per_side: usize,
    /// Distance between the first and the last plane
    pub spectrometer_length: f64,
    /// Pixel pitch
    pub pixel_size: f64,
    /// Core Gaussian measurement resolution
    pub resolution: f64,
    /// Probability that a coordinate receives the wide tail smear
    pub tail_amplitude: f64,
    /// Width of the tail smear
    pub tail_width: f64,
    /// Effective θ0·p of multiple scattering per plane
    pub mult_scatt_angle: f64,
    /// Incident slope dz/dx at the first plane
    pub theta_xz: f64,
    /// Probability that a pixel fires on noise in the readout window
    pub noise_occupancy: f64,
    /// Side (in pixels) of the square window around the impact holding noise hits
    pub noise_window_pixels: f64,
    /// Probability for the track to leave a hit in a plane
    pub hit_efficiency: f64,
    /// Optional per-plane efficiencies, overriding `hit_efficiency`
    pub plane_efficiencies: Option<Vec<f64>>,
    /// Beam momentum
    pub beam_momentum: f64,
    /// Field integral of the magnet
    pub integral_bdl: f64,
    /// Fit 1/p as a fifth parameter
    pub fit_momentum: bool,
    /// Half height of the planes upstream of the magnet
    pub upstream_half_height: f64,
    /// Half height of the planes downstream of the magnet
    pub downstream_half_height: f64,
    /// Half width of every plane
    pub half_width: f64,
    /// First-plane beam window, in pixels: hits with |y| above it never seed
    pub beam_profile_pixels: f64,
    /// Local χ² cut at the third plane
    pub cut1: f64,
    /// Local χ² cut at every later plane
    pub cut2: f64,
    /// Total χ² cut; derived from the number of degrees of freedom when `None`
    pub cut3: Option<f64>,
    /// Scale the scattering term of the refit with the fitted 1/p
    pub refit_with_measured_momentum: bool,
    /// Seed of the run
    pub seed: u64,
    /// Events per independent random stream
    pub chunk_size: usize,
}

impl Default for SpectrometerConfig {
    fn default() -> Self {
        Self {
            n_events: 5000,
            planes_per_side: 2,
            spectrometer_length: 30.0,
            pixel_size: 0.002,
            resolution: 0.0006,
            tail_amplitude: 0.1,
            tail_width: 0.0018,
            mult_scatt_angle: 0.0002, // Si planes in a helium bag
            theta_xz: 0.0,
            noise_occupancy: 1e-5,
            noise_window_pixels: 500.0,
            hit_efficiency: 0.97,
            plane_efficiencies: None,
            beam_momentum: 0.05,
            integral_bdl: 0.5,
            fit_momentum: true,
            upstream_half_height: 1.0,
            downstream_half_height: 2.0,
            half_width: 1.0,
            beam_profile_pixels: 4.0,
            cut1: 8.0,
            cut2: 8.0,
            cut3: None,
            refit_with_measured_momentum: false,
            seed: 42,
            chunk_size: 500,
        }
    }
}

impl SpectrometerConfig {
    /// Total number of tracking planes.
    pub fn n_planes(&self) -> usize {
        2 * self.planes_per_side
    }

    /// Distance between consecutive planes.
    pub fn spacing(&self) -> f64 {
        self.spectrometer_length / (2.0 * self.planes_per_side as f64 - 1.0)
    }

    /// Dimension of the global track state.
    pub fn n_params(&self) -> usize {
        if self.fit_momentum {
            5
        } else {
            4
        }
    }

    /// Degrees of freedom of the global fit (two coordinates per plane).
    pub fn ndof(&self) -> usize {
        2 * self.n_planes() - self.n_params()
    }

    /// Total χ² cut, either configured or 2.5 per degree of freedom.
    pub fn cut3(&self) -> f64 {
        self.cut3
            .unwrap_or_else(|| CUT3_PER_DOF * self.ndof() as f64)
    }

    /// Inverse beam momentum, the fixed 1/p estimate used by the reconstruction.
    pub fn inv_momentum(&self) -> f64 {
        1.0 / self.beam_momentum
    }

    /// Bending angle of the magnet for 1/p = `inv_p`.
    pub fn magnet_kick(&self, inv_p: f64) -> f64 {
        MAGNETIC_KICK_CONSTANT * self.integral_bdl * inv_p
    }

    /// Mean number of background hits per plane.
    pub fn mean_noise_hits(&self) -> f64 {
        self.noise_window_pixels * self.noise_window_pixels * self.noise_occupancy
    }

    /// Efficiency of plane `index`.
    pub fn plane_efficiency(&self, index: usize) -> f64 {
        self.plane_efficiencies
            .as_ref()
            .and_then(|e| e.get(index).copied())
            .unwrap_or(self.hit_efficiency)
    }

    /// Check the configuration before any event is processed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.planes_per_side < 2 {
            return Err(ConfigError::TooFewPlanes(self.planes_per_side));
        }
        if !(self.spectrometer_length > 0.0) {
            return Err(ConfigError::NonPositive {
                field: "spectrometer_length",
                value: self.spectrometer_length,
            });
        }
        for (field, value) in [
            ("pixel_size", self.pixel_size),
            ("resolution", self.resolution),
            ("beam_momentum", self.beam_momentum),
            ("cut1", self.cut1),
            ("cut2", self.cut2),
            ("cut3", self.cut3()),
            ("upstream_half_height", self.upstream_half_height),
            ("downstream_half_height", self.downstream_half_height),
            ("half_width", self.half_width),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        for (field, value) in [
            ("tail_width", self.tail_width),
            ("mult_scatt_angle", self.mult_scatt_angle),
            ("noise_occupancy", self.noise_occupancy),
            ("noise_window_pixels", self.noise_window_pixels),
            ("beam_profile_pixels", self.beam_profile_pixels),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::Negative { field, value });
            }
        }
        for (field, value) in [
            ("tail_amplitude", self.tail_amplitude),
            ("hit_efficiency", self.hit_efficiency),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::NotAProbability { field, value });
            }
        }
        if let Some(effs) = &self.plane_efficiencies {
            if effs.len() != self.n_planes() {
                return Err(ConfigError::PlaneCountMismatch {
                    expected: self.n_planes(),
                    got: effs.len(),
                });
            }
            if let Some(&value) = effs.iter().find(|e| !(0.0..=1.0).contains(*e)) {
                return Err(ConfigError::NotAProbability {
                    field: "plane_efficiencies",
                    value,
                });
            }
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.fit_momentum && self.integral_bdl == 0.0 {
            return Err(ConfigError::DimensionMismatch {
                n_params: self.n_params(),
                reason: "no magnetic field to constrain 1/p",
            });
        }
        if !self.fit_momentum && self.integral_bdl != 0.0 {
            tracing::warn!(
                integral_bdl = self.integral_bdl,
                "magnetic field is on but the fit is straight; y residuals downstream will be biased"
            );
        }
        Ok(())
    }
}
