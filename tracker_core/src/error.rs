//! Errors of the reconstruction.
//!
//! Modeling rejections (inefficient event, no candidate, quality cut) are
//! outcomes, not errors; see [`crate::pipeline::EventOutcome`].

use detector_models::ConfigError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{0} is singular")]
    SingularMatrix(&'static str),

    #[error("{0} is not positive-definite")]
    NotPositiveDefinite(&'static str),

    #[error("plane {plane} has no hit {index}")]
    MissingHit { plane: usize, index: usize },

    #[error("combination has {got} hit indices, expected {expected}")]
    CombinationLength { expected: usize, got: usize },

    #[error("event has {got} planes, geometry has {expected}")]
    PlaneCountMismatch { expected: usize, got: usize },

    #[error("{0} is not finite")]
    NonFinite(&'static str),
}
