//! Per-source score calibration.
//!
//! Similarities from different embedding spaces and keyword rankers are not
//! comparable. Each source declares a [`Calibration`] that maps its local
//! score distribution onto the shared `[0, 1]` scale used by the merger.

use serde::{Deserialize, Serialize};

/// Mapping from a source-local score to the shared scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Calibration {
    /// Scores are already on the shared scale.
    #[default]
    Identity,
    /// Linear rescale of `[lo, hi]` onto `[0, 1]`.
    Linear {
        /// Local score that maps to `0.0`.
        lo: f64,
        /// Local score that maps to `1.0`.
        hi: f64,
    },
    /// Logistic curve centred on `midpoint`.
    Logistic {
        /// Local score that maps to `0.5`.
        midpoint: f64,
        /// Slope at the midpoint.
        steepness: f64,
    },
    /// Cosine distance in `[0, 2]` mapped to similarity.
    CosineDistance,
}

impl Calibration {
    /// Maps a local score to the shared scale, clamped to `[0, 1]`.
    ///
    /// Non-finite input maps to `0.0`.
    #[must_use]
    pub fn apply(&self, local: f64) -> f64 {
        if !local.is_finite() {
            return 0.0;
        }
        let mapped = match *self {
            Self::Identity => local,
            Self::Linear { lo, hi } => {
                let span = hi - lo;
                if span.abs() < f64::EPSILON {
                    if local >= hi { 1.0 } else { 0.0 }
                } else {
                    (local - lo) / span
                }
            }
            Self::Logistic {
                midpoint,
                steepness,
            } => 1.0 / (1.0 + (-steepness * (local - midpoint)).exp()),
            Self::CosineDistance => 1.0 - local / 2.0,
        };
        if mapped.is_finite() {
            mapped.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}
