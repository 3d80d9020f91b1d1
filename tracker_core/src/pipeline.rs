//! Reconstruction of one event.
//!
//! # Processing steps per event
//! 1. Count hits; any plane without a hit → inefficient
//! 2. Combinatorial search (local filter gates + global fit of survivors)
//! 3. No surviving combination → no candidate, or a search failure when
//!    every combination that got through the gates failed numerically
//! 4. Best χ² above `cut3` → quality reject
//! 5. Refit of the selected hits, optionally with the measured 1/p
//! 6. Mark the hits used, record residuals, pulls and χ² samples

use crate::{
    error::TrackError,
    finder::TrackFinder,
    metrics::RunAccounting,
    types::{Candidate, EventHits, GlobalFit, TruthTrack},
};
use detector_models::{FitDimension, SpectrometerConfig};
use tracing::debug;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Event-level settings of the reconstruction.
#[derive(Clone, Debug)]
pub struct ReconstructionConfig {
    /// Total χ² cut on the best candidate
    pub cut3: f64,
    /// Evaluate the scattering term of the refit at the fitted 1/p
    pub refit_with_measured_momentum: bool,
}

impl ReconstructionConfig {
    pub fn from_config(cfg: &SpectrometerConfig) -> Self {
        Self {
            cut3: cfg.cut3(),
            refit_with_measured_momentum: cfg.refit_with_measured_momentum,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// A track that passed every cut.
#[derive(Clone, Debug, PartialEq)]
pub struct AcceptedTrack {
    pub candidate: Candidate,
    /// Fit of the selected hits used for the physics samples
    pub refit: GlobalFit,
    pub background_hits: usize,
}

/// Final state of one event.
#[derive(Clone, Debug, PartialEq)]
pub enum EventOutcome {
    Accepted(AcceptedTrack),
    /// `plane` is the first plane without any hit
    RejectedInefficient { plane: usize },
    RejectedNoCandidate,
    RejectedQuality { chi2: f64 },
    /// No candidate because every fit attempted during the search failed
    /// numerically; holds the first failure
    SearchFailed(TrackError),
    /// The refit of the selected candidate failed numerically
    FitFailed(TrackError),
}

impl EventOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, EventOutcome::Accepted(_))
    }
}

// ---------------------------------------------------------------------------
// Reconstructor
// ---------------------------------------------------------------------------

/// Finder, fitter and cuts for one configuration. Immutable once built, so
/// one instance is shared by all workers.
#[derive(Clone, Debug)]
pub struct Reconstructor {
    pub config: ReconstructionConfig,
    finder: TrackFinder,
}

impl Reconstructor {
    pub fn new(cfg: &SpectrometerConfig) -> Result<Self, TrackError> {
        Ok(Self::from_parts(
            ReconstructionConfig::from_config(cfg),
            TrackFinder::new(cfg)?,
        ))
    }

    pub fn from_parts(config: ReconstructionConfig, finder: TrackFinder) -> Self {
        Self { config, finder }
    }

    pub fn finder(&self) -> &TrackFinder {
        &self.finder
    }

    /// Number of fitted track parameters.
    pub fn n_params(&self) -> usize {
        self.finder.fitter().n_params()
    }

    /// Reconstruct one event and fold the result into `acct`.
    ///
    /// An event whose plane count does not match the geometry is an error and
    /// leaves `acct` untouched.
    pub fn process_event(
        &self,
        hits: &mut EventHits,
        truth: &TruthTrack,
        acct: &mut RunAccounting,
    ) -> Result<EventOutcome, TrackError> {
        self.finder.check_planes(hits)?;
        let outcome = self.reconstruct(hits, truth, acct)?;
        self.count(&outcome, hits, acct);
        Ok(outcome)
    }

    fn reconstruct(
        &self,
        hits: &mut EventHits,
        truth: &TruthTrack,
        acct: &mut RunAccounting,
    ) -> Result<EventOutcome, TrackError> {
        if let Some(plane) = hits.first_empty_plane() {
            return Ok(EventOutcome::RejectedInefficient { plane });
        }

        let search = self.finder.search(hits)?;
        acct.counters.numerical_failures += search.numerical_failures;
        acct.record_gate_samples(&search.gate_chi2);

        Ok(match (search.best, search.first_failure) {
            (Some(candidate), _) => self.select(hits, candidate, truth, acct),
            (None, Some(err)) => EventOutcome::SearchFailed(err),
            (None, None) => EventOutcome::RejectedNoCandidate,
        })
    }

    /// Apply the χ² cut to the best candidate, refit it and record it.
    fn select(
        &self,
        hits: &mut EventHits,
        candidate: Candidate,
        truth: &TruthTrack,
        acct: &mut RunAccounting,
    ) -> EventOutcome {
        if candidate.fit.chi2 > self.config.cut3 {
            return EventOutcome::RejectedQuality {
                chi2: candidate.fit.chi2,
            };
        }

        let refit = match self.refit(hits, &candidate) {
            Ok(fit) => fit,
            Err(err) => return EventOutcome::FitFailed(err),
        };

        hits.mark_used(&candidate.hit_indices);
        acct.record_accepted(candidate.fit.chi2, &refit, truth);
        EventOutcome::Accepted(AcceptedTrack {
            background_hits: hits.background_count(&candidate.hit_indices),
            candidate,
            refit,
        })
    }

    /// Fit the selected hits again, with the fitted 1/p in the scattering
    /// term when configured and available.
    fn refit(&self, hits: &EventHits, candidate: &Candidate) -> Result<GlobalFit, TrackError> {
        let fitter = self.finder.fitter();
        let inv_p = if self.config.refit_with_measured_momentum
            && fitter.model.dimension == FitDimension::Curved
        {
            candidate.fit.state[4]
        } else {
            fitter.reference_inv_p()
        };
        fitter.fit_combination(hits, &candidate.hit_indices, inv_p)
    }

    fn count(&self, outcome: &EventOutcome, hits: &EventHits, acct: &mut RunAccounting) {
        let c = &mut acct.counters;
        c.generated += 1;
        c.total_hits += hits.total_hits() as u64;
        match outcome {
            EventOutcome::Accepted(track) => {
                c.reconstructed += 1;
                c.background_hits_on_track += track.background_hits as u64;
                if track.background_hits == 0 {
                    c.reconstructed_clean += 1;
                }
                debug!(
                    hits = ?track.candidate.hit_indices,
                    chi2 = track.refit.chi2,
                    background = track.background_hits,
                    "track accepted"
                );
            }
            EventOutcome::RejectedInefficient { plane } => {
                c.rejected_inefficient += 1;
                debug!(plane, "no hit in plane");
            }
            EventOutcome::RejectedNoCandidate => {
                c.rejected_no_candidate += 1;
                debug!("no combination survived the gates");
            }
            EventOutcome::RejectedQuality { chi2 } => {
                c.rejected_quality += 1;
                if hits.planes_with_signal() == hits.n_planes() {
                    c.rejected_quality_clean += 1;
                }
                debug!(chi2, cut = self.config.cut3, "best candidate above chi2 cut");
            }
            EventOutcome::SearchFailed(err) => {
                c.search_failures += 1;
                debug!(%err, "every fit of the search failed");
            }
            EventOutcome::FitFailed(err) => {
                c.fit_failures += 1;
                debug!(%err, "refit failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        finder::FinderConfig,
        global_fit::GlobalFitter,
        kf::{LocalKalmanFilter, LocalKfConfig},
        types::Hit,
    };
    use approx::assert_abs_diff_eq;
    use detector_models::{Geometry, MeasurementModel};

    const TRUTH: TruthTrack = TruthTrack {
        z0: 0.0,
        dzdx: 0.0,
        y0: 0.0,
        dydx: 0.0,
        inv_p: 20.0,
    };

    fn exact_hits(r: &Reconstructor) -> EventHits {
        let fitter = r.finder().fitter();
        let truth = TRUTH.to_vector(fitter.n_params());
        let m = fitter.design_matrix() * truth;
        let n = fitter.model.n_planes();
        EventHits::from_planes((0..n).map(|i| vec![Hit::signal(m[i + n], m[i])]).collect())
    }

    #[test]
    fn clean_event_is_accepted() {
        let cfg = SpectrometerConfig::default();
        let r = Reconstructor::new(&cfg).unwrap();
        let mut acct = RunAccounting::new(r.n_params());
        let mut hits = exact_hits(&r);

        let outcome = r.process_event(&mut hits, &TRUTH, &mut acct).unwrap();
        assert!(outcome.is_accepted());
        assert!((0..4).all(|p| hits.hit(p, 0).unwrap().used));
        assert_eq!(acct.counters.generated, 1);
        assert_eq!(acct.counters.reconstructed, 1);
        assert_eq!(acct.counters.reconstructed_clean, 1);
        assert_eq!(acct.counters.total_hits, 4);
        for samples in &acct.parameters {
            assert_abs_diff_eq!(samples.residuals[0], 0.0, epsilon = 1e-6);
        }
        assert_eq!(acct.gate_chi2.keys().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn empty_plane_is_inefficient() {
        let cfg = SpectrometerConfig::default();
        let r = Reconstructor::new(&cfg).unwrap();
        let mut acct = RunAccounting::new(r.n_params());
        let base = exact_hits(&r);
        let mut hits = EventHits::from_planes(
            base.iter_planes()
                .enumerate()
                .map(|(i, p)| if i == 1 { Vec::new() } else { p.to_vec() })
                .collect(),
        );

        let outcome = r.process_event(&mut hits, &TRUTH, &mut acct).unwrap();
        assert_eq!(outcome, EventOutcome::RejectedInefficient { plane: 1 });
        assert_eq!(acct.counters.rejected_inefficient, 1);
        assert!(acct.parameters[0].residuals.is_empty());
    }

    #[test]
    fn gated_out_event_has_no_candidate() {
        let cfg = SpectrometerConfig::default();
        let r = Reconstructor::new(&cfg).unwrap();
        let mut acct = RunAccounting::new(r.n_params());
        let mut hits = EventHits::from_planes(vec![
            vec![Hit::signal(0.0, 0.0)],
            vec![Hit::signal(0.0, 0.0)],
            vec![Hit::signal(0.0, 0.0)],
            vec![Hit::signal(0.0, 1.5)],
        ]);

        let outcome = r.process_event(&mut hits, &TRUTH, &mut acct).unwrap();
        assert_eq!(outcome, EventOutcome::RejectedNoCandidate);
        assert_eq!(acct.counters.rejected_no_candidate, 1);
    }

    #[test]
    fn bad_global_chi2_is_a_quality_reject() {
        let cfg = SpectrometerConfig {
            cut3: Some(1e-3),
            ..Default::default()
        };
        let r = Reconstructor::new(&cfg).unwrap();
        let mut acct = RunAccounting::new(r.n_params());
        let base = exact_hits(&r);
        let shifted: Vec<Vec<Hit>> = base
            .iter_planes()
            .enumerate()
            .map(|(i, p)| {
                let mut p = p.to_vec();
                if i == 3 {
                    p[0].z += 0.01;
                }
                p
            })
            .collect();
        let mut hits = EventHits::from_planes(shifted);

        match r.process_event(&mut hits, &TRUTH, &mut acct).unwrap() {
            EventOutcome::RejectedQuality { chi2 } => assert!(chi2 > 1e-3),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(acct.counters.rejected_quality, 1);
        assert_eq!(acct.counters.rejected_quality_clean, 1);
        assert!(!hits.hit(0, 0).unwrap().used);
    }

    #[test]
    fn measured_momentum_refit_uses_fitted_curvature() {
        let cfg = SpectrometerConfig {
            refit_with_measured_momentum: true,
            ..Default::default()
        };
        let r = Reconstructor::new(&cfg).unwrap();
        let mut acct = RunAccounting::new(r.n_params());
        let mut hits = exact_hits(&r);

        match r.process_event(&mut hits, &TRUTH, &mut acct).unwrap() {
            EventOutcome::Accepted(track) => {
                assert_abs_diff_eq!(track.refit.state[4], 20.0, epsilon = 1e-4);
                for i in 0..4 {
                    assert_abs_diff_eq!(track.refit.state[i], 0.0, epsilon = 1e-8);
                }
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    fn assert_no_samples(acct: &RunAccounting) {
        assert!(acct.parameters.iter().all(|p| p.residuals.is_empty() && p.pulls.is_empty()));
        assert!(acct.first_pass_chi2.is_empty());
        assert!(acct.refit_chi2.is_empty());
    }

    #[test]
    fn failing_global_fit_is_a_search_failure() {
        // Zero curvature column: the normal matrix of every combination is
        // singular while the local filter still passes the hits.
        let cfg = SpectrometerConfig::default();
        let mut model = MeasurementModel::new(Geometry::from_config(&cfg).unwrap(), &cfg);
        model.kick_per_inv_p = 0.0;
        let finder = TrackFinder::from_parts(
            LocalKalmanFilter::new(LocalKfConfig::from_config(&cfg)),
            GlobalFitter::new(model, cfg.inv_momentum()),
            FinderConfig::from_config(&cfg),
        );
        let r = Reconstructor::from_parts(ReconstructionConfig::from_config(&cfg), finder);
        let mut acct = RunAccounting::new(r.n_params());
        let mut hits = exact_hits(&Reconstructor::new(&cfg).unwrap());

        let outcome = r.process_event(&mut hits, &TRUTH, &mut acct).unwrap();
        assert_eq!(
            outcome,
            EventOutcome::SearchFailed(TrackError::NotPositiveDefinite("normal-equations matrix"))
        );
        let c = &acct.counters;
        assert_eq!((c.generated, c.search_failures, c.numerical_failures), (1, 1, 1));
        assert_eq!(c.rejected_no_candidate, 0);
        assert_eq!(c.fit_failures, 0);
        assert_eq!(c.reconstructed, 0);
        assert_no_samples(&acct);
    }

    #[test]
    fn nan_hit_is_never_accepted() {
        let cfg = SpectrometerConfig::default();
        let r = Reconstructor::new(&cfg).unwrap();
        let mut acct = RunAccounting::new(r.n_params());
        let base = exact_hits(&r);
        let mut planes: Vec<Vec<Hit>> = base.iter_planes().map(|p| p.to_vec()).collect();
        planes[2][0].y = f64::NAN;
        let mut hits = EventHits::from_planes(planes);

        let outcome = r.process_event(&mut hits, &TRUTH, &mut acct).unwrap();
        assert_eq!(outcome, EventOutcome::SearchFailed(TrackError::NonFinite("global fit chi2")));
        assert_eq!(acct.counters.search_failures, 1);
        assert_eq!(acct.counters.reconstructed, 0);
        assert!(!hits.hit(0, 0).unwrap().used);
        assert_no_samples(&acct);
    }

    #[test]
    fn failed_refit_is_counted_apart() {
        let cfg = SpectrometerConfig::default();
        let r = Reconstructor::new(&cfg).unwrap();
        let mut acct = RunAccounting::new(r.n_params());
        let mut hits = exact_hits(&r);
        let mut candidate = r.finder().search(&hits).unwrap().best.unwrap();
        candidate.hit_indices[2] = 1;

        let outcome = r.select(&mut hits, candidate, &TRUTH, &mut acct);
        r.count(&outcome, &hits, &mut acct);
        assert_eq!(
            outcome,
            EventOutcome::FitFailed(TrackError::MissingHit { plane: 2, index: 1 })
        );
        let c = &acct.counters;
        assert_eq!((c.generated, c.fit_failures), (1, 1));
        assert_eq!(c.search_failures + c.rejected_no_candidate + c.reconstructed, 0);
        assert!(!hits.hit(0, 0).unwrap().used);
        assert_no_samples(&acct);
    }

    #[test]
    fn wrong_plane_count_is_an_error_and_not_counted() {
        let cfg = SpectrometerConfig::default();
        let r = Reconstructor::new(&cfg).unwrap();
        let mut acct = RunAccounting::new(r.n_params());
        let base = exact_hits(&r);
        let mut hits = EventHits::from_planes(base.iter_planes().take(3).map(|p| p.to_vec()).collect());

        assert_eq!(
            r.process_event(&mut hits, &TRUTH, &mut acct),
            Err(TrackError::PlaneCountMismatch { expected: 4, got: 3 })
        );
        assert_eq!(acct.counters, crate::metrics::RunCounters::default());
    }
}
