//! Event simulator.
//!
//! Generates the hits of one beam particle per event:
//! - multiple scattering in every plane
//! - plane inefficiency and finite active area
//! - Gaussian resolution with an occasional wide tail
//! - Poisson noise hits around the impact point
//!
//! The draws are taken in a fixed order per plane (two scattering kicks, the
//! efficiency uniform, y smear, y tail, z smear, z tail, noise count, noise
//! positions), so a seed fully determines an event.

use crate::{random::RandomSource, trajectory::TrackState};
use detector_models::{ConfigError, Geometry, Plane, SpectrometerConfig};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracker_core::types::{EventHits, Hit, TruthTrack};

/// Smearing and noise settings taken from the run configuration.
#[derive(Clone, Debug)]
struct Response {
    resolution: f64,
    tail_amplitude: f64,
    tail_width: f64,
    noise_mean: f64,
    /// Side of the square window holding noise hits
    noise_window: f64,
}

/// Generates events for one configuration from a random source.
pub struct EventSimulator<R = ChaCha8Rng> {
    geometry: Geometry,
    response: Response,
    theta_xz: f64,
    inv_p: f64,
    /// Scattering angle per plane
    theta0: f64,
    /// Bending angle of the magnet
    kick: f64,
    rng: R,
}

impl EventSimulator<ChaCha8Rng> {
    /// Simulator drawing from stream `stream` of a ChaCha8 generator seeded with `seed`.
    pub fn from_seed(cfg: &SpectrometerConfig, seed: u64, stream: u64) -> Result<Self, ConfigError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(stream);
        Self::new(cfg, rng)
    }
}

impl<R: RandomSource> EventSimulator<R> {
    pub fn new(cfg: &SpectrometerConfig, rng: R) -> Result<Self, ConfigError> {
        let geometry = Geometry::from_config(cfg)?;
        let inv_p = cfg.inv_momentum();
        Ok(Self {
            geometry,
            response: Response {
                resolution: cfg.resolution,
                tail_amplitude: cfg.tail_amplitude,
                tail_width: cfg.tail_width,
                noise_mean: cfg.mean_noise_hits(),
                noise_window: cfg.noise_window_pixels * cfg.pixel_size,
            },
            theta_xz: cfg.theta_xz,
            inv_p,
            theta0: cfg.mult_scatt_angle * inv_p,
            kick: cfg.magnet_kick(inv_p),
            rng,
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Parameters the reconstruction should recover for every event.
    pub fn truth(&self) -> TruthTrack {
        TruthTrack {
            z0: 0.0,
            dzdx: self.theta_xz,
            y0: 0.0,
            dydx: 0.0,
            inv_p: self.inv_p,
        }
    }

    /// Simulate one event into `hits`, replacing its previous content.
    pub fn simulate(&mut self, hits: &mut EventHits) -> TruthTrack {
        let n = self.geometry.n_planes();
        if hits.n_planes() == n {
            hits.clear();
        } else {
            *hits = EventHits::new(n);
        }

        let mut state = TrackState::at_entrance(self.theta_xz);
        for plane in &self.geometry.planes {
            if plane.index == self.geometry.planes_per_side {
                state.cross_magnet(self.geometry.spacing, self.kick);
            } else if plane.index > 0 {
                state.advance(self.geometry.spacing);
            }
            let impact = state;
            state.scatter(&mut self.rng, self.theta0);
            Self::detect(&mut self.rng, &self.response, plane, &impact, hits);
        }
        self.truth()
    }

    /// Signal and noise hits of one plane for a track at `impact`.
    fn detect(rng: &mut R, response: &Response, plane: &Plane, impact: &TrackState, hits: &mut EventHits) {
        let u = rng.uniform();
        if u < plane.efficiency && plane.contains(impact.y, impact.z) {
            let y = impact.y + Self::smear(rng, response);
            let z = impact.z + Self::smear(rng, response);
            hits.push(plane.index, Hit::signal(y, z));
        }

        let n_noise = rng.poisson(response.noise_mean);
        for _ in 0..n_noise {
            let y = impact.y + (rng.uniform() - 0.5) * response.noise_window;
            let z = impact.z + (rng.uniform() - 0.5) * response.noise_window;
            hits.push(plane.index, Hit::background(y, z));
        }
    }

    fn smear(rng: &mut R, response: &Response) -> f64 {
        let mut d = rng.gaus(0.0, response.resolution);
        if rng.uniform() < response.tail_amplitude {
            d += rng.gaus(0.0, response.tail_width);
        }
        d
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
