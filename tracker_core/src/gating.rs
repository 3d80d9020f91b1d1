//! χ² gating of the combinatorial search.
//!
//! The local filter returns, for every plane from the third on, the χ² of the
//! candidate hit against the prediction (one degree of freedom). A branch is
//! cut as soon as that χ² exceeds the gate of its plane:
//!
//! | plane | gate   |
//! |-------|--------|
//! | 0, 1  | none (seed) |
//! | 2     | `cut1` |
//! | ≥ 3   | `cut2` |
//!
//! The complete combination is then judged on the global fit χ² with `cut3`.

use detector_models::SpectrometerConfig;
use serde::{Deserialize, Serialize};

/// Number of planes used to seed the local state.
pub const SEED_PLANES: usize = 2;

/// Per-plane χ² gates of the local filter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    /// Gate at the first filtered plane
    pub cut1: f64,
    /// Gate at every later plane
    pub cut2: f64,
}

impl GateThresholds {
    pub fn from_config(cfg: &SpectrometerConfig) -> Self {
        Self {
            cut1: cfg.cut1,
            cut2: cfg.cut2,
        }
    }

    /// Gate applied at `plane`, `None` for the seed planes.
    pub fn for_plane(&self, plane: usize) -> Option<f64> {
        match plane {
            p if p < SEED_PLANES => None,
            SEED_PLANES => Some(self.cut1),
            _ => Some(self.cut2),
        }
    }

    /// True if a hit with local χ² `chi2` at `plane` keeps its branch alive.
    pub fn passes(&self, plane: usize, chi2: f64) -> bool {
        self.for_plane(plane).map_or(true, |cut| chi2 <= cut)
    }
}

/// Local χ² of a hit on an all-signal branch, recorded per plane.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GateSample {
    pub plane: usize,
    pub chi2: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_order() {
        let gates = GateThresholds { cut1: 8.0, cut2: 4.0 };
        assert_eq!(gates.for_plane(0), None);
        assert_eq!(gates.for_plane(1), None);
        assert_eq!(gates.for_plane(2), Some(8.0));
        assert_eq!(gates.for_plane(3), Some(4.0));
        assert_eq!(gates.for_plane(5), Some(4.0));
    }

    #[test]
    fn boundary_value_passes() {
        let gates = GateThresholds { cut1: 8.0, cut2: 8.0 };
        assert!(gates.passes(2, 8.0));
        assert!(!gates.passes(2, 8.000001));
        assert!(gates.passes(1, 1e9));
    }

    #[test]
    fn defaults_follow_config() {
        let gates = GateThresholds::from_config(&SpectrometerConfig::default());
        assert_eq!(gates, GateThresholds { cut1: 8.0, cut2: 8.0 });
    }
}
