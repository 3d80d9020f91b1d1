//! Run accounting: counters, residual and pull samples, χ² distributions.
//!
//! Each worker fills its own [`RunAccounting`]; the driver merges them in a
//! fixed order, so the merged samples do not depend on the thread count.

use crate::{
    gating::GateSample,
    types::{GlobalFit, TruthTrack, PARAM_NAMES},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Event counters of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub generated: u64,
    pub reconstructed: u64,
    /// Accepted tracks made of signal hits only
    pub reconstructed_clean: u64,
    /// Some plane had no hit at all
    pub rejected_inefficient: u64,
    /// Every plane had hits but no combination survived the gates
    pub rejected_no_candidate: u64,
    /// Best candidate failed the total χ² cut
    pub rejected_quality: u64,
    /// Quality rejects of events with a signal hit in every plane
    pub rejected_quality_clean: u64,
    /// Every fit attempted during the search failed numerically
    pub search_failures: u64,
    /// Refit of the selected candidate failed numerically
    pub fit_failures: u64,
    /// Branches or candidates dropped on numerical failures during the search
    pub numerical_failures: u64,
    pub total_hits: u64,
    /// Background hits picked up by accepted tracks
    pub background_hits_on_track: u64,
}

impl RunCounters {
    pub fn merge(&mut self, other: &RunCounters) {
        self.generated += other.generated;
        self.reconstructed += other.reconstructed;
        self.reconstructed_clean += other.reconstructed_clean;
        self.rejected_inefficient += other.rejected_inefficient;
        self.rejected_no_candidate += other.rejected_no_candidate;
        self.rejected_quality += other.rejected_quality;
        self.rejected_quality_clean += other.rejected_quality_clean;
        self.search_failures += other.search_failures;
        self.fit_failures += other.fit_failures;
        self.numerical_failures += other.numerical_failures;
        self.total_hits += other.total_hits;
        self.background_hits_on_track += other.background_hits_on_track;
    }

    /// Fraction of generated events with an accepted track.
    pub fn efficiency(&self) -> f64 {
        if self.generated == 0 {
            return 0.0;
        }
        self.reconstructed as f64 / self.generated as f64
    }
}

/// Residual and pull samples of one fitted parameter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSamples {
    /// fitted − true
    pub residuals: Vec<f64>,
    /// (fitted − true) / σ_fit
    pub pulls: Vec<f64>,
}

/// Everything a run accumulates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunAccounting {
    pub counters: RunCounters,
    /// One entry per fitted parameter, in state-vector order
    pub parameters: Vec<ParameterSamples>,
    /// Local χ² of signal hits, keyed by plane
    pub gate_chi2: BTreeMap<usize, Vec<f64>>,
    /// Global χ² of the selected candidates, before the refit
    pub first_pass_chi2: Vec<f64>,
    /// Global χ² of accepted tracks after the refit
    pub refit_chi2: Vec<f64>,
}

impl RunAccounting {
    pub fn new(n_params: usize) -> Self {
        Self {
            counters: RunCounters::default(),
            parameters: vec![ParameterSamples::default(); n_params],
            gate_chi2: BTreeMap::new(),
            first_pass_chi2: Vec::new(),
            refit_chi2: Vec::new(),
        }
    }

    pub fn record_gate_samples(&mut self, samples: &[GateSample]) {
        for s in samples {
            self.gate_chi2.entry(s.plane).or_default().push(s.chi2);
        }
    }

    /// Store the samples of an accepted track.
    pub fn record_accepted(&mut self, first_pass_chi2: f64, refit: &GlobalFit, truth: &TruthTrack) {
        let truth = truth.to_vector(self.parameters.len());
        for (i, samples) in self.parameters.iter_mut().enumerate() {
            let residual = refit.state[i] - truth[i];
            samples.residuals.push(residual);
            samples.pulls.push(residual / refit.sigma(i));
        }
        self.first_pass_chi2.push(first_pass_chi2);
        self.refit_chi2.push(refit.chi2);
    }

    /// Append `other` after the samples already held.
    pub fn merge(&mut self, other: &RunAccounting) {
        self.counters.merge(&other.counters);
        for (mine, theirs) in self.parameters.iter_mut().zip(&other.parameters) {
            mine.residuals.extend_from_slice(&theirs.residuals);
            mine.pulls.extend_from_slice(&theirs.pulls);
        }
        for (plane, chi2) in &other.gate_chi2 {
            self.gate_chi2.entry(*plane).or_default().extend_from_slice(chi2);
        }
        self.first_pass_chi2.extend_from_slice(&other.first_pass_chi2);
        self.refit_chi2.extend_from_slice(&other.refit_chi2);
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            counters: self.counters.clone(),
            parameters: self
                .parameters
                .iter()
                .zip(PARAM_NAMES)
                .map(|(s, name)| ParameterSummary {
                    name: name.to_string(),
                    residual: SampleStats::of(&s.residuals),
                    pull: SampleStats::of(&s.pulls),
                })
                .collect(),
            gate_chi2: self
                .gate_chi2
                .iter()
                .map(|(plane, chi2)| (*plane, SampleStats::of(chi2)))
                .collect(),
            first_pass_chi2: SampleStats::of(&self.first_pass_chi2),
            refit_chi2: SampleStats::of(&self.refit_chi2),
        }
    }
}

/// Count, mean and sample standard deviation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl SampleStats {
    pub fn of(values: &[f64]) -> Self {
        let count = values.len();
        if count == 0 {
            return Self::default();
        }
        let mean = values.iter().sum::<f64>() / count as f64;
        let std_dev = if count > 1 {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        } else {
            0.0
        };
        Self {
            count,
            mean,
            std_dev,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    pub name: String,
    pub residual: SampleStats,
    pub pull: SampleStats,
}

/// Serializable digest of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub counters: RunCounters,
    pub parameters: Vec<ParameterSummary>,
    pub gate_chi2: BTreeMap<usize, SampleStats>,
    pub first_pass_chi2: SampleStats,
    pub refit_chi2: SampleStats,
}
