//! `detector_models` — Spectrometer description: run configuration, plane
//! geometry and the linear measurement model used by the global fit.
//!
//! # Coordinates
//! x runs along the beam, y is up (the bending coordinate), z is the
//! non-bending coordinate. x = y = z = 0 at the first plane; the magnet sits
//! halfway between the last upstream and the first downstream plane.

pub mod config;
pub mod error;
pub mod geometry;
pub mod observation;

pub use config::{SpectrometerConfig, MAGNETIC_KICK_CONSTANT};
pub use error::ConfigError;
pub use geometry::{Geometry, Plane};
pub use observation::{FitDimension, MeasurementModel};
