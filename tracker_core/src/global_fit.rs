//! Global generalized-least-squares fit of one hit combination.
//!
//! Solves the normal equations of the linear model m = H·x + ε with
//! Cov(ε) = V (see [`detector_models::observation`]):
//!
//! C = (Hᵀ V⁻¹ H)⁻¹,   x = C Hᵀ V⁻¹ m,   χ² = (m − Hx)ᵀ V⁻¹ (m − Hx)
//!
//! Both V and Hᵀ V⁻¹ H are factorised with Cholesky, so a matrix that is not
//! positive-definite is reported instead of producing an arbitrary state.

use crate::{
    error::TrackError,
    types::{DMat, DVec, EventHits, GlobalFit},
};
use detector_models::MeasurementModel;

/// Fits hit combinations of one spectrometer layout.
#[derive(Clone, Debug)]
pub struct GlobalFitter {
    pub model: MeasurementModel,
    /// Design matrix, fixed by the geometry
    h: DMat,
    /// 1/p used for the scattering term when nothing better is known
    reference_inv_p: f64,
}

impl GlobalFitter {
    pub fn new(model: MeasurementModel, reference_inv_p: f64) -> Self {
        let h = model.design_matrix();
        Self {
            model,
            h,
            reference_inv_p,
        }
    }

    pub fn design_matrix(&self) -> &DMat {
        &self.h
    }

    pub fn reference_inv_p(&self) -> f64 {
        self.reference_inv_p
    }

    pub fn n_params(&self) -> usize {
        self.model.n_params()
    }

    /// Measurement vector of a combination: all z first, then all y.
    pub fn measurement_vector(
        &self,
        hits: &EventHits,
        indices: &[usize],
    ) -> Result<DVec, TrackError> {
        let n = self.model.n_planes();
        if indices.len() != n {
            return Err(TrackError::CombinationLength {
                expected: n,
                got: indices.len(),
            });
        }
        let mut m = DVec::zeros(2 * n);
        for (plane, &index) in indices.iter().enumerate() {
            let hit = hits
                .hit(plane, index)
                .ok_or(TrackError::MissingHit { plane, index })?;
            m[plane] = hit.z;
            m[plane + n] = hit.y;
        }
        Ok(m)
    }

    /// Fit a measurement vector, evaluating the scattering term at `inv_p`.
    pub fn fit(&self, m: &DVec, inv_p: f64) -> Result<GlobalFit, TrackError> {
        let v = self.model.covariance(inv_p);
        let v_inv = v
            .cholesky()
            .ok_or(TrackError::NotPositiveDefinite("measurement covariance"))?
            .inverse();

        let ht_vinv = self.h.transpose() * &v_inv;
        let normal = &ht_vinv * &self.h;
        let cov = normal
            .cholesky()
            .ok_or(TrackError::NotPositiveDefinite("normal-equations matrix"))?
            .inverse();
        let cov = (&cov + cov.transpose()) * 0.5;

        let state = &cov * (&ht_vinv * m);
        let residual = m - &self.h * &state;
        let chi2 = residual.dot(&(&v_inv * &residual));
        if !chi2.is_finite() {
            return Err(TrackError::NonFinite("global fit chi2"));
        }

        Ok(GlobalFit {
            state,
            cov,
            chi2,
            ndof: self.model.n_measurements() - self.n_params(),
        })
    }

    /// Fit one hit per plane, as selected by `indices`.
    pub fn fit_combination(
        &self,
        hits: &EventHits,
        indices: &[usize],
        inv_p: f64,
    ) -> Result<GlobalFit, TrackError> {
        let m = self.measurement_vector(hits, indices)?;
        self.fit(&m, inv_p)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
