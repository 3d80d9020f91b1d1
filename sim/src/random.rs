//! Random draws used by the event simulator.

use rand::{distributions::Standard, Rng};
use rand_distr::{Distribution, Poisson, StandardNormal};

/// The three draws the simulator needs.
pub trait RandomSource {
    /// Gaussian with the given mean and standard deviation.
    fn gaus(&mut self, mean: f64, sigma: f64) -> f64;
    /// Uniform in [0, 1).
    fn uniform(&mut self) -> f64;
    /// Poisson count; 0 for a non-positive mean.
    fn poisson(&mut self, mean: f64) -> u64;
}

impl<R: Rng + ?Sized> RandomSource for R {
    fn gaus(&mut self, mean: f64, sigma: f64) -> f64 {
        let n: f64 = StandardNormal.sample(self);
        mean + sigma * n
    }

    fn uniform(&mut self) -> f64 {
        Standard.sample(self)
    }

    fn poisson(&mut self, mean: f64) -> u64 {
        if !(mean > 0.0) {
            return 0;
        }
        match Poisson::new(mean) {
            Ok(dist) => {
                let k: f64 = dist.sample(self);
                k as u64
            }
            Err(_) => 0,
        }
    }
}
