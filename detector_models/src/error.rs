//! Configuration errors, raised before any event is processed.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("at least 2 planes per side are required, got {0}")]
    TooFewPlanes(usize),

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("{field} must lie in [0, 1], got {value}")]
    NotAProbability { field: &'static str, value: f64 },

    #[error("expected {expected} per-plane values, got {got}")]
    PlaneCountMismatch { expected: usize, got: usize },

    #[error("chunk_size must be at least 1")]
    ZeroChunkSize,

    #[error("{n_params}-parameter fit cannot be built: {reason}")]
    DimensionMismatch {
        n_params: usize,
        reason: &'static str,
    },
}
