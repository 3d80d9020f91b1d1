//! Combinatorial track finding.
//!
//! Every combination of one hit per plane is a potential track. The search is
//! a depth-first walk over the planes: the first two hits seed the local
//! filter, each further hit is accepted only if its local χ² passes the gate
//! of its plane, and every combination reaching the last plane is handed to
//! the global fitter. The best global χ² wins.
//!
//! The recursion depth is the number of planes, so the same code serves any
//! `planes_per_side`.

use crate::{
    error::TrackError,
    gating::{GateSample, GateThresholds, SEED_PLANES},
    global_fit::GlobalFitter,
    kf::{LocalKalmanFilter, LocalKfConfig, LocalTrack},
    types::{Candidate, EventHits},
};
use detector_models::{Geometry, MeasurementModel, SpectrometerConfig};
use tracing::trace;

/// Finder settings derived from the run configuration.
#[derive(Clone, Debug)]
pub struct FinderConfig {
    pub gates: GateThresholds,
    /// Largest |y| of a first-plane hit allowed to start a track
    pub beam_profile: f64,
}

impl FinderConfig {
    pub fn from_config(cfg: &SpectrometerConfig) -> Self {
        Self {
            gates: GateThresholds::from_config(cfg),
            beam_profile: cfg.beam_profile_pixels * cfg.pixel_size,
        }
    }
}

/// Side products of one walk over the hit tree.
#[derive(Clone, Debug, Default)]
pub struct WalkStats {
    /// Branches dropped because the local filter failed numerically
    pub numerical_failures: u64,
    pub first_failure: Option<TrackError>,
    /// Local χ² of every hit on a branch made of signal hits only
    pub gate_chi2: Vec<GateSample>,
}

/// Outcome of the search in one event.
#[derive(Clone, Debug, Default)]
pub struct SearchResult {
    pub best: Option<Candidate>,
    /// Full combinations that reached the global fit
    pub fitted_combinations: u64,
    /// Numerical failures in the local filter or in the global fit
    pub numerical_failures: u64,
    /// First of those failures, kept to report an event with no fit left
    pub first_failure: Option<TrackError>,
    pub gate_chi2: Vec<GateSample>,
}

/// Branch-and-bound search for the best hit combination.
#[derive(Clone, Debug)]
pub struct TrackFinder {
    filter: LocalKalmanFilter,
    fitter: GlobalFitter,
    pub config: FinderConfig,
}

impl TrackFinder {
    /// Build the finder for a configuration; fails if it does not validate.
    pub fn new(cfg: &SpectrometerConfig) -> Result<Self, TrackError> {
        let geometry = Geometry::from_config(cfg)?;
        let model = MeasurementModel::new(geometry, cfg);
        Ok(Self::from_parts(
            LocalKalmanFilter::new(LocalKfConfig::from_config(cfg)),
            GlobalFitter::new(model, cfg.inv_momentum()),
            FinderConfig::from_config(cfg),
        ))
    }

    pub fn from_parts(filter: LocalKalmanFilter, fitter: GlobalFitter, config: FinderConfig) -> Self {
        Self {
            filter,
            fitter,
            config,
        }
    }

    pub fn fitter(&self) -> &GlobalFitter {
        &self.fitter
    }

    pub fn filter(&self) -> &LocalKalmanFilter {
        &self.filter
    }

    /// Walk all combinations surviving the gates and call `visit` with the
    /// hit indices of each one. Hits already used by a track are skipped.
    pub fn walk<F: FnMut(&[usize])>(
        &self,
        hits: &EventHits,
        mut visit: F,
    ) -> Result<WalkStats, TrackError> {
        self.check_planes(hits)?;
        let n = self.fitter.model.n_planes();
        let mut stats = WalkStats::default();

        let mut path = Vec::with_capacity(n);
        for (i0, h0) in hits.plane(0).iter().enumerate() {
            if h0.used || h0.y.abs() > self.config.beam_profile {
                continue;
            }
            for (i1, h1) in hits.plane(1).iter().enumerate() {
                if h1.used {
                    continue;
                }
                let seed = self.filter.seed(h0.z, h1.z);
                path.clear();
                path.extend([i0, i1]);
                let signal = h0.is_signal() && h1.is_signal();
                self.descend(hits, &seed, &mut path, signal, &mut stats, &mut visit);
            }
        }
        Ok(stats)
    }

    /// The event must have one hit list per plane of the geometry.
    pub fn check_planes(&self, hits: &EventHits) -> Result<(), TrackError> {
        let expected = self.fitter.model.n_planes();
        if hits.n_planes() != expected {
            return Err(TrackError::PlaneCountMismatch {
                expected,
                got: hits.n_planes(),
            });
        }
        Ok(())
    }

    fn descend<F: FnMut(&[usize])>(
        &self,
        hits: &EventHits,
        track: &LocalTrack,
        path: &mut Vec<usize>,
        all_signal: bool,
        stats: &mut WalkStats,
        visit: &mut F,
    ) {
        let plane = path.len();
        if plane == hits.n_planes() {
            visit(path);
            return;
        }
        debug_assert!(plane >= SEED_PLANES);

        for (i, hit) in hits.plane(plane).iter().enumerate() {
            if hit.used {
                continue;
            }
            let step = match self.filter.step(track, hit.z) {
                Ok(step) => step,
                Err(err) => {
                    trace!(plane, hit = i, %err, "local filter failed");
                    stats.numerical_failures += 1;
                    stats.first_failure.get_or_insert(err);
                    continue;
                }
            };
            let signal = all_signal && hit.is_signal();
            if signal {
                stats.gate_chi2.push(GateSample {
                    plane,
                    chi2: step.chi2,
                });
            }
            if !self.config.gates.passes(plane, step.chi2) {
                continue;
            }
            path.push(i);
            self.descend(hits, &step.track, path, signal, stats, visit);
            path.pop();
        }
    }

    /// Hit indices of every combination surviving the gates, in walk order.
    pub fn surviving_combinations(&self, hits: &EventHits) -> Result<Vec<Vec<usize>>, TrackError> {
        let mut out = Vec::new();
        self.walk(hits, |path| out.push(path.to_vec()))?;
        Ok(out)
    }

    /// Fit every surviving combination with the beam momentum estimate and
    /// keep the one with the smallest χ² (the first one on ties).
    pub fn search(&self, hits: &EventHits) -> Result<SearchResult, TrackError> {
        let inv_p = self.fitter.reference_inv_p();
        let mut best: Option<Candidate> = None;
        let mut fitted = 0u64;
        let mut fit_failures = 0u64;
        let mut first_fit_failure = None;

        let stats = self.walk(hits, |path| {
            fitted += 1;
            match self.fitter.fit_combination(hits, path, inv_p) {
                Ok(fit) => {
                    if best.as_ref().map_or(true, |b| fit.chi2 < b.fit.chi2) {
                        best = Some(Candidate {
                            hit_indices: path.to_vec(),
                            fit,
                        });
                    }
                }
                Err(err) => {
                    trace!(?path, %err, "global fit failed");
                    fit_failures += 1;
                    first_fit_failure.get_or_insert(err);
                }
            }
        })?;

        Ok(SearchResult {
            best,
            fitted_combinations: fitted,
            numerical_failures: stats.numerical_failures + fit_failures,
            first_failure: stats.first_failure.or(first_fit_failure),
            gate_chi2: stats.gate_chi2,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
