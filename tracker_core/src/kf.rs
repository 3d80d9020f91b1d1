//! Local Kalman filter in the non-bending (x–z) plane.
//!
//! # Design choices
//! - Only the z coordinate is filtered: it is a straight line through the
//!   whole spectrometer, so the filter is a cheap pruning device for the
//!   combinatorial search, not the final fit.
//! - The scattering angle uses the fixed beam momentum estimate.
//! - The update is written in information form, which is exactly the
//!   weighted mean of prediction and measurement.
//!
//! ## State vector
//! x = [z, dz/dx]ᵀ at the current plane
//!
//! ## Transition between planes (spacing d)
//! F = [[1, d], [0, 1]]
//!
//! ## Process noise (scattering θ0 in the plane left behind)
//! Q = θ0² · [[d², d], [d, 1]]
//!
//! ## Update with a measurement m of resolution σ
//! C' = (C_pred⁻¹ + diag(1/σ², 0))⁻¹
//! x' = C' · (C_pred⁻¹ · x_pred + (m/σ², 0)ᵀ)
//! χ² = (m − z_pred)² / (σ² + C_pred[0,0])

use crate::{
    error::TrackError,
    types::{LocalCov, LocalState},
};
use detector_models::SpectrometerConfig;

/// Configuration for the local filter.
#[derive(Clone, Debug)]
pub struct LocalKfConfig {
    /// Distance between consecutive planes
    pub spacing: f64,
    /// Measurement resolution σ
    pub resolution: f64,
    /// Scattering angle per plane at the estimated momentum
    pub theta0: f64,
}

impl LocalKfConfig {
    pub fn from_config(cfg: &SpectrometerConfig) -> Self {
        Self {
            spacing: cfg.spacing(),
            resolution: cfg.resolution,
            theta0: cfg.mult_scatt_angle * cfg.inv_momentum(),
        }
    }
}

/// A local state with its covariance.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalTrack {
    pub state: LocalState,
    pub cov: LocalCov,
}

/// Result of one predict + update step, exposed for gate bookkeeping.
#[derive(Clone, Debug)]
pub struct KfStepResult {
    /// Updated state at the new plane
    pub track: LocalTrack,
    /// Prediction before the measurement was folded in
    pub predicted: LocalTrack,
    /// m − z_pred
    pub residual: f64,
    pub chi2: f64,
}

/// Straight-line Kalman filter stepping one plane at a time.
#[derive(Clone, Debug)]
pub struct LocalKalmanFilter {
    pub config: LocalKfConfig,
}

impl LocalKalmanFilter {
    pub fn new(config: LocalKfConfig) -> Self {
        Self { config }
    }

    fn variance(&self) -> f64 {
        self.config.resolution * self.config.resolution
    }

    /// Build the plane-to-plane transition matrix F.
    pub fn transition_matrix(d: f64) -> LocalCov {
        LocalCov::new(1.0, d, 0.0, 1.0)
    }

    /// Build the scattering process noise Q over one spacing.
    pub fn process_noise(d: f64, theta0: f64) -> LocalCov {
        let t2 = theta0 * theta0;
        LocalCov::new(t2 * d * d, t2 * d, t2 * d, t2)
    }

    /// State at the second plane from the z measurements in the first two:
    /// the straight line through both points and its covariance.
    pub fn seed(&self, z0: f64, z1: f64) -> LocalTrack {
        let d = self.config.spacing;
        let s2 = self.variance();
        LocalTrack {
            state: LocalState::new(z1, (z1 - z0) / d),
            cov: LocalCov::new(s2, s2 / d, s2 / d, 2.0 * s2 / (d * d)),
        }
    }

    /// Propagate to the next plane.
    pub fn predict(&self, track: &LocalTrack) -> LocalTrack {
        let d = self.config.spacing;
        let f = Self::transition_matrix(d);
        let q = Self::process_noise(d, self.config.theta0);
        LocalTrack {
            state: f * track.state,
            cov: f * track.cov * f.transpose() + q,
        }
    }

    /// Fold the measurement `z` into a predicted state.
    pub fn update(&self, predicted: &LocalTrack, z: f64) -> Result<KfStepResult, TrackError> {
        let s2 = self.variance();

        let pred_inv = predicted
            .cov
            .try_inverse()
            .ok_or(TrackError::SingularMatrix("predicted local covariance"))?;
        let info = pred_inv + LocalCov::new(1.0 / s2, 0.0, 0.0, 0.0);
        let cov = info
            .try_inverse()
            .ok_or(TrackError::SingularMatrix("local information matrix"))?;
        let cov = (cov + cov.transpose()) * 0.5;

        let state = cov * (pred_inv * predicted.state + LocalState::new(z / s2, 0.0));

        let residual = z - predicted.state[0];
        let chi2 = residual * residual / (s2 + predicted.cov[(0, 0)]);
        if !chi2.is_finite() {
            return Err(TrackError::NonFinite("local chi2"));
        }

        Ok(KfStepResult {
            track: LocalTrack { state, cov },
            predicted: predicted.clone(),
            residual,
            chi2,
        })
    }

    /// Predict to the next plane and update with the hit found there.
    pub fn step(&self, track: &LocalTrack, z: f64) -> Result<KfStepResult, TrackError> {
        let predicted = self.predict(track);
        self.update(&predicted, z)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use nalgebra::{DMatrix, DVector};

    fn filter(theta0: f64) -> LocalKalmanFilter {
        LocalKalmanFilter::new(LocalKfConfig {
            spacing: 10.0,
            resolution: 0.0006,
            theta0,
        })
    }

    /// Weighted least-squares line fit with equal errors, parameterised at
    /// the last point: returns ([z, dz/dx], covariance).
    fn line_fit(xs: &[f64], zs: &[f64], sigma: f64) -> (DVector<f64>, DMatrix<f64>) {
        let x_ref = *xs.last().unwrap();
        let a = DMatrix::from_fn(xs.len(), 2, |r, c| if c == 0 { 1.0 } else { xs[r] - x_ref });
        let w = 1.0 / (sigma * sigma);
        let cov = (a.transpose() * &a * w).try_inverse().unwrap();
        let est = &cov * a.transpose() * DVector::from_column_slice(zs) * w;
        (est, cov)
    }

    #[test]
    fn predict_straight_line() {
        let kf = filter(0.0);
        let track = LocalTrack {
            state: LocalState::new(0.1, 0.01),
            cov: LocalCov::identity(),
        };
        let pred = kf.predict(&track);
        assert_abs_diff_eq!(pred.state[0], 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(pred.state[1], 0.01, epsilon = 1e-12);
        assert_abs_diff_eq!(pred.cov[(0, 0)], 101.0, epsilon = 1e-9);
    }

    #[test]
    fn seed_is_two_point_least_squares() {
        let kf = filter(0.004);
        let (est, cov) = line_fit(&[0.0, 10.0], &[0.0013, -0.0021], 0.0006);
        let seed = kf.seed(0.0013, -0.0021);
        assert_relative_eq!(seed.state[0], est[0], max_relative = 1e-9);
        assert_relative_eq!(seed.state[1], est[1], max_relative = 1e-9);
        for r in 0..2 {
            for c in 0..2 {
                assert_relative_eq!(seed.cov[(r, c)], cov[(r, c)], max_relative = 1e-9);
            }
        }
    }

    #[test]
    fn third_hit_without_scattering_matches_line_fit() {
        let kf = filter(0.0);
        let zs = [0.0013, -0.0021, 0.0004];
        let seed = kf.seed(zs[0], zs[1]);
        let step = kf.step(&seed, zs[2]).unwrap();

        let (est, cov) = line_fit(&[0.0, 10.0, 20.0], &zs, 0.0006);
        assert_relative_eq!(step.track.state[0], est[0], max_relative = 1e-8);
        assert_relative_eq!(step.track.state[1], est[1], max_relative = 1e-8);
        for r in 0..2 {
            for c in 0..2 {
                assert_relative_eq!(step.track.cov[(r, c)], cov[(r, c)], max_relative = 1e-8);
            }
        }
    }

    #[test]
    fn chi2_uses_prediction_and_resolution() {
        let kf = filter(0.004);
        let seed = kf.seed(0.0, 0.0);
        let pred = kf.predict(&seed);
        let step = kf.step(&seed, 0.01).unwrap();
        let expected = 0.01 * 0.01 / (0.0006 * 0.0006 + pred.cov[(0, 0)]);
        assert_relative_eq!(step.chi2, expected, max_relative = 1e-12);
        assert_abs_diff_eq!(step.residual, 0.01, epsilon = 1e-15);
    }

    #[test]
    fn update_reduces_uncertainty() {
        let kf = filter(0.004);
        let pred = kf.predict(&kf.seed(0.0, 0.001));
        let step = kf.update(&pred, 0.002).unwrap();
        assert!(step.track.cov[(0, 0)] < pred.cov[(0, 0)]);
        assert_eq!(step.track.cov[(0, 1)], step.track.cov[(1, 0)]);
    }

    #[test]
    fn singular_prediction_is_an_error() {
        let kf = filter(0.0);
        let pred = LocalTrack {
            state: LocalState::zeros(),
            cov: LocalCov::zeros(),
        };
        assert_eq!(
            kf.update(&pred, 0.0).unwrap_err(),
            TrackError::SingularMatrix("predicted local covariance")
        );
    }

    #[test]
    fn nan_measurement_is_an_error() {
        let kf = filter(0.0);
        let pred = kf.predict(&kf.seed(0.0, 0.001));
        assert_eq!(
            kf.update(&pred, f64::NAN).unwrap_err(),
            TrackError::NonFinite("local chi2")
        );
    }
}
