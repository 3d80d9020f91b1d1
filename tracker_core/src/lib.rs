//! `tracker_core` — Track finding and fitting for the spectrometer.
//!
//! # Module layout
//! - [`types`]      — Hits, event hit lists, truth and fit results
//! - [`kf`]         — Local Kalman filter in the non-bending plane
//! - [`gating`]     — Per-plane χ² gates of the search
//! - [`global_fit`] — Generalized least-squares fit with scattering correlations
//! - [`finder`]     — Combinatorial branch-and-bound search
//! - [`pipeline`]   — Per-event reconstruction and outcome
//! - [`metrics`]    — Counters, residuals, pulls and χ² samples

pub mod error;
pub mod finder;
pub mod gating;
pub mod global_fit;
pub mod kf;
pub mod metrics;
pub mod pipeline;
pub mod types;

pub use error::TrackError;
pub use finder::{SearchResult, TrackFinder};
pub use global_fit::GlobalFitter;
pub use metrics::{RunAccounting, RunCounters, RunSummary, SampleStats};
pub use pipeline::{AcceptedTrack, EventOutcome, Reconstructor};
pub use types::{Candidate, EventHits, GlobalFit, Hit, HitOrigin, TruthTrack};
