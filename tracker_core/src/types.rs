//! Fundamental types shared by the filter, the finder, the fitter and the
//! simulator.

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use detector_models::observation::{DMat, DVec};

/// Local track state in the non-bending coordinate: [z, dz/dx]
pub type LocalState = Vector2<f64>;

/// 2×2 covariance of a [`LocalState`]
pub type LocalCov = Matrix2<f64>;

/// Names of the global track parameters, in state-vector order.
pub const PARAM_NAMES: [&str; 5] = ["z0", "dz/dx", "y0", "dy/dx", "1/p"];

// ---------------------------------------------------------------------------
// Hits
// ---------------------------------------------------------------------------

/// Monte Carlo truth of a hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitOrigin {
    /// Left by the simulated particle
    Signal,
    /// Random noise pixel
    Background,
}

/// One measured (y, z) point in a plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub y: f64,
    pub z: f64,
    pub origin: HitOrigin,
    /// Set once the hit is assigned to an accepted track
    pub used: bool,
}

impl Hit {
    pub fn signal(y: f64, z: f64) -> Self {
        Self {
            y,
            z,
            origin: HitOrigin::Signal,
            used: false,
        }
    }

    pub fn background(y: f64, z: f64) -> Self {
        Self {
            y,
            z,
            origin: HitOrigin::Background,
            used: false,
        }
    }

    pub fn is_signal(&self) -> bool {
        self.origin == HitOrigin::Signal
    }
}

/// All hits of one event, one ordered list per plane.
///
/// The buffer is owned by whoever processes the event and is cleared, not
/// reallocated, between events.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventHits {
    planes: Vec<Vec<Hit>>,
}

impl EventHits {
    pub fn new(n_planes: usize) -> Self {
        Self {
            planes: vec![Vec::new(); n_planes],
        }
    }

    /// Build from explicit per-plane lists.
    pub fn from_planes(planes: Vec<Vec<Hit>>) -> Self {
        Self { planes }
    }

    /// Drop every hit, keeping the plane count.
    pub fn clear(&mut self) {
        for plane in &mut self.planes {
            plane.clear();
        }
    }

    pub fn push(&mut self, plane: usize, hit: Hit) {
        self.planes[plane].push(hit);
    }

    pub fn n_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn plane(&self, plane: usize) -> &[Hit] {
        &self.planes[plane]
    }

    pub fn hit(&self, plane: usize, index: usize) -> Option<&Hit> {
        self.planes.get(plane).and_then(|p| p.get(index))
    }

    pub fn total_hits(&self) -> usize {
        self.planes.iter().map(Vec::len).sum()
    }

    /// Index of the first plane without any hit.
    pub fn first_empty_plane(&self) -> Option<usize> {
        self.planes.iter().position(Vec::is_empty)
    }

    /// Number of planes holding at least one signal hit.
    pub fn planes_with_signal(&self) -> usize {
        self.planes
            .iter()
            .filter(|p| p.iter().any(Hit::is_signal))
            .count()
    }

    /// Number of background hits in a combination (one index per plane).
    pub fn background_count(&self, indices: &[usize]) -> usize {
        indices
            .iter()
            .enumerate()
            .filter(|&(plane, &i)| self.hit(plane, i).map_or(false, |h| !h.is_signal()))
            .count()
    }

    /// Flag the hits of a combination as used by a track.
    pub fn mark_used(&mut self, indices: &[usize]) {
        for (plane, &i) in indices.iter().enumerate() {
            if let Some(hit) = self.planes.get_mut(plane).and_then(|p| p.get_mut(i)) {
                hit.used = true;
            }
        }
    }

    pub fn iter_planes(&self) -> impl Iterator<Item = &[Hit]> {
        self.planes.iter().map(Vec::as_slice)
    }
}

// ---------------------------------------------------------------------------
// Truth
// ---------------------------------------------------------------------------

/// True track parameters at the first plane.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TruthTrack {
    pub z0: f64,
    pub dzdx: f64,
    pub y0: f64,
    pub dydx: f64,
    pub inv_p: f64,
}

impl TruthTrack {
    /// Parameters in state-vector order, truncated to `n_params`.
    pub fn to_vector(&self, n_params: usize) -> DVec {
        let all = [self.z0, self.dzdx, self.y0, self.dydx, self.inv_p];
        DVec::from_row_slice(&all[..n_params])
    }
}

// ---------------------------------------------------------------------------
// Fit output
// ---------------------------------------------------------------------------

/// Result of one global least-squares fit.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalFit {
    /// [z0, dz/dx, y0, dy/dx, (1/p)] at the first plane
    pub state: DVec,
    /// Covariance of `state`
    pub cov: DMat,
    pub chi2: f64,
    pub ndof: usize,
}

impl GlobalFit {
    /// Standard deviation of parameter `i`.
    pub fn sigma(&self, i: usize) -> f64 {
        self.cov[(i, i)].sqrt()
    }
}

/// A fully specified hit combination with its global fit.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    /// One hit index per plane
    pub hit_indices: Vec<usize>,
    pub fit: GlobalFit,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} chi2={:.3}", self.hit_indices, self.fit.chi2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EventHits {
        EventHits::from_planes(vec![
            vec![Hit::signal(0.0, 0.0)],
            vec![Hit::background(0.3, 0.1), Hit::signal(0.0, 0.0)],
            vec![Hit::background(0.2, 0.2)],
        ])
    }

    #[test]
    fn bookkeeping() {
        let hits = sample();
        assert_eq!(hits.total_hits(), 4);
        assert_eq!(hits.first_empty_plane(), None);
        assert_eq!(hits.planes_with_signal(), 2);
        assert_eq!(hits.background_count(&[0, 0, 0]), 2);
        assert_eq!(hits.background_count(&[0, 1, 0]), 1);
    }

    #[test]
    fn mark_used_keeps_coordinates() {
        let mut hits = sample();
        hits.mark_used(&[0, 1, 0]);
        let h = hits.hit(1, 1).unwrap();
        assert!(h.used);
        assert_eq!((h.y, h.z), (0.0, 0.0));
        assert!(!hits.hit(1, 0).unwrap().used);
    }

    #[test]
    fn clear_keeps_planes() {
        let mut hits = sample();
        hits.clear();
        assert_eq!(hits.n_planes(), 3);
        assert_eq!(hits.first_empty_plane(), Some(0));
    }

    #[test]
    fn truth_vector_truncates() {
        let t = TruthTrack {
            z0: 0.0,
            dzdx: 0.1,
            y0: 0.0,
            dydx: 0.0,
            inv_p: 20.0,
        };
        assert_eq!(t.to_vector(4).len(), 4);
        assert_eq!(t.to_vector(5)[4], 20.0);
    }
}
