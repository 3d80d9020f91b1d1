//! Tracking plane layout.
//!
//! ```text
//!  I             I    magnet   I             I
//! 0cm--------- 10cm-----------20cm----------30cm---------->x
//! ```
//! (four planes, `planes_per_side = 2`, 10 cm spacing)

use crate::{config::SpectrometerConfig, error::ConfigError};
use serde::{Deserialize, Serialize};

/// One position-measuring plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub index: usize,
    /// Distance from the first plane along the beam
    pub x: f64,
    /// Half extent of the active area in y
    pub half_height: f64,
    /// Half extent of the active area in z
    pub half_width: f64,
    /// Probability that the track leaves a hit
    pub efficiency: f64,
}

impl Plane {
    /// True if (y, z) lies inside the active area.
    pub fn contains(&self, y: f64, z: f64) -> bool {
        y.abs() < self.half_height && z.abs() < self.half_width
    }
}

/// Immutable plane layout of the spectrometer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub planes: Vec<Plane>,
    pub spacing: f64,
    pub planes_per_side: usize,
}

impl Geometry {
    /// Build the layout from a validated configuration.
    pub fn from_config(cfg: &SpectrometerConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let spacing = cfg.spacing();
        let planes = (0..cfg.n_planes())
            .map(|index| Plane {
                index,
                x: spacing * index as f64,
                half_height: if index < cfg.planes_per_side {
                    cfg.upstream_half_height
                } else {
                    cfg.downstream_half_height
                },
                half_width: cfg.half_width,
                efficiency: cfg.plane_efficiency(index),
            })
            .collect();
        Ok(Self {
            planes,
            spacing,
            planes_per_side: cfg.planes_per_side,
        })
    }

    pub fn n_planes(&self) -> usize {
        self.planes.len()
    }

    /// True for planes after the magnet.
    pub fn is_downstream(&self, index: usize) -> bool {
        index >= self.planes_per_side
    }

    /// x position of the magnet centre.
    pub fn magnet_x(&self) -> f64 {
        self.spacing * (self.planes_per_side as f64 - 0.5)
    }

    /// Distance from the magnet centre to a downstream plane, 0 upstream.
    pub fn lever_arm(&self, index: usize) -> f64 {
        if self.is_downstream(index) {
            self.planes[index].x - self.magnet_x()
        } else {
            0.0
        }
    }
}
