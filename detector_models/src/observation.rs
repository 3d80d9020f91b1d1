//! Linear measurement model of the global track fit.
//!
//! # Track state
//! x = [z0, dz/dx, y0, dy/dx, 1/p]ᵀ at the first plane (1/p only for
//! [`FitDimension::Curved`]).
//!
//! # Measurement vector
//! m = [z_0 … z_{n−1}, y_0 … y_{n−1}]ᵀ, one (y, z) pair per plane.
//!
//! # Projection H (2n × n_params)
//! z rows: (1, x_i, 0, 0, 0)
//! y rows: (0, 0, 1, x_i, k_i) with k_i = 0.003·∫B·dl·(x_i − x_magnet) downstream.
//!
//! # Measurement covariance V (2n × 2n)
//! Scattering in plane k deflects the track seen in every later plane, so
//! V_ij = σ²·δ_ij + θ0²·d²·Σ_{k<min(i,j)} (i−k)(j−k), built by the recursion
//! V_ij = V_{i−1,j−1} + i·j·θ0²·d². No correlation between the z and y blocks.

use crate::{
    config::{SpectrometerConfig, MAGNETIC_KICK_CONSTANT},
    geometry::Geometry,
};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

pub type DMat = DMatrix<f64>;
pub type DVec = DVector<f64>;

/// Number of fitted track parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitDimension {
    /// (z0, dz/dx, y0, dy/dx), field off
    Straight,
    /// (z0, dz/dx, y0, dy/dx, 1/p)
    Curved,
}

impl FitDimension {
    pub fn n_params(self) -> usize {
        match self {
            FitDimension::Straight => 4,
            FitDimension::Curved => 5,
        }
    }
}

/// Design matrix and correlated measurement covariance for one geometry.
#[derive(Clone, Debug)]
pub struct MeasurementModel {
    pub geometry: Geometry,
    pub dimension: FitDimension,
    /// Core measurement resolution σ
    pub resolution: f64,
    /// θ0·p of multiple scattering per plane
    pub mult_scatt_angle: f64,
    /// Bending angle per unit 1/p
    pub kick_per_inv_p: f64,
}

impl MeasurementModel {
    pub fn new(geometry: Geometry, cfg: &SpectrometerConfig) -> Self {
        Self {
            geometry,
            dimension: if cfg.fit_momentum {
                FitDimension::Curved
            } else {
                FitDimension::Straight
            },
            resolution: cfg.resolution,
            mult_scatt_angle: cfg.mult_scatt_angle,
            kick_per_inv_p: MAGNETIC_KICK_CONSTANT * cfg.integral_bdl,
        }
    }

    pub fn n_planes(&self) -> usize {
        self.geometry.n_planes()
    }

    /// Length of the measurement vector.
    pub fn n_measurements(&self) -> usize {
        2 * self.n_planes()
    }

    pub fn n_params(&self) -> usize {
        self.dimension.n_params()
    }

    /// Mean scattering angle per plane for 1/p = `inv_p`.
    pub fn theta0(&self, inv_p: f64) -> f64 {
        self.mult_scatt_angle * inv_p.abs()
    }

    /// Projection of the track state onto the measurement vector.
    pub fn design_matrix(&self) -> DMat {
        let n = self.n_planes();
        let mut h = DMat::zeros(2 * n, self.n_params());
        for (i, plane) in self.geometry.planes.iter().enumerate() {
            let j = i + n;
            h[(i, 0)] = 1.0;
            h[(i, 1)] = plane.x;
            h[(j, 2)] = 1.0;
            h[(j, 3)] = plane.x;
            if self.dimension == FitDimension::Curved && self.geometry.is_downstream(i) {
                h[(j, 4)] = self.kick_per_inv_p * self.geometry.lever_arm(i);
            }
        }
        h
    }

    /// Measurement covariance including scattering correlations, with the
    /// scattering angle evaluated at `inv_p`.
    pub fn covariance(&self, inv_p: f64) -> DMat {
        let n = self.n_planes();
        let s2 = self.resolution * self.resolution;
        let t2 = self.theta0(inv_p).powi(2);
        let d2 = self.geometry.spacing * self.geometry.spacing;

        let mut block = DMat::zeros(n, n);
        block[(0, 0)] = s2;
        for i in 1..n {
            for j in i..n {
                block[(i, j)] = block[(i - 1, j - 1)] + (i * j) as f64 * t2 * d2;
                block[(j, i)] = block[(i, j)];
            }
        }

        let mut v = DMat::zeros(2 * n, 2 * n);
        v.view_mut((0, 0), (n, n)).copy_from(&block);
        v.view_mut((n, n), (n, n)).copy_from(&block);
        v
    }

    /// Expected measurement vector H·x.
    pub fn apply(&self, state: &DVec) -> DVec {
        self.design_matrix() * state
    }
}
