//! True particle trajectory through the spectrometer.
//!
//! The state is the impact point and the slopes at the current plane. Between
//! planes the track is a straight line; the magnet is a thin kick in the
//! bending (x–y) plane at its centre.

use crate::random::RandomSource;
use serde::{Deserialize, Serialize};

/// Position and direction of the particle at a plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackState {
    pub y: f64,
    pub z: f64,
    pub dydx: f64,
    pub dzdx: f64,
}

impl TrackState {
    /// State at the first plane: on axis, no bending-plane slope.
    pub fn at_entrance(theta_xz: f64) -> Self {
        Self {
            dzdx: theta_xz,
            ..Default::default()
        }
    }

    /// Straight line over `dx`.
    pub fn advance(&mut self, dx: f64) {
        self.y += dx * self.dydx;
        self.z += dx * self.dzdx;
    }

    /// Random scattering kicks on both slopes, y first.
    pub fn scatter<R: RandomSource + ?Sized>(&mut self, rng: &mut R, theta0: f64) {
        self.dydx += rng.gaus(0.0, theta0);
        self.dzdx += rng.gaus(0.0, theta0);
    }

    /// From the last upstream plane to the first downstream one: half a
    /// spacing straight, a rotation by `kick` in the bending plane, then the
    /// other half with the new slope.
    pub fn cross_magnet(&mut self, spacing: f64, kick: f64) {
        let half = 0.5 * spacing;
        self.y += self.dydx * half;
        let angle = self.dydx.atan() + kick;
        self.dydx = angle.tan();
        self.y += self.dydx * half;
        self.z += self.dzdx * spacing;
    }
}
