//! Answer confidence.
//!
//! `confidence = clamp(w_s · supported / total + w_r · mean_relevance
//! − p · unavailable_required, 0, 1)`, where `mean_relevance` averages, over
//! every claim, the normalized score of the item that best supports it.
//! Unsupported claims contribute `0.0`, so turning a supported claim into an
//! unsupported one never raises either term.

/// Weights of the confidence formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceWeights {
    /// Weight of the supported-claim fraction.
    pub support_weight: f64,
    /// Weight of the mean relevance of supporting evidence.
    pub relevance_weight: f64,
    /// Subtracted once per required source that was unavailable.
    pub unavailable_penalty: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            support_weight: 0.6,
            relevance_weight: 0.4,
            unavailable_penalty: 0.15,
        }
    }
}

impl ConfidenceWeights {
    /// Sets the support weight.
    #[must_use]
    pub const fn with_support_weight(mut self, weight: f64) -> Self {
        self.support_weight = weight;
        self
    }

    /// Sets the relevance weight.
    #[must_use]
    pub const fn with_relevance_weight(mut self, weight: f64) -> Self {
        self.relevance_weight = weight;
        self
    }

    /// Sets the per-source penalty.
    #[must_use]
    pub const fn with_unavailable_penalty(mut self, penalty: f64) -> Self {
        self.unavailable_penalty = penalty;
        self
    }
}

/// Inputs to the confidence formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceInputs {
    /// Claims extracted from the answer.
    pub claims_total: usize,
    /// Claims that validation accepted.
    pub claims_supported: usize,
    /// Per-claim mean of the best supporting score, see [`mean_claim_relevance`].
    pub mean_relevance: f64,
    /// Required sources that failed, timed out or were skipped.
    pub unavailable_required: usize,
}

/// Averages per-claim relevance over all claims.
///
/// `claims[i]` is the normalized score of the item backing claim `i`, or
/// `None` when the claim is not supported. Empty input yields `0.0`.
#[must_use]
pub fn mean_claim_relevance(claims: &[Option<f64>]) -> f64 {
    if claims.is_empty() {
        return 0.0;
    }
    let sum: f64 = claims.iter().map(|c| c.map_or(0.0, |score| score.clamp(0.0, 1.0))).sum();
    #[allow(clippy::cast_precision_loss)]
    let mean = sum / claims.len() as f64;
    mean
}

/// Computes the confidence score in `[0, 1]`.
#[must_use]
pub fn score(inputs: &ConfidenceInputs, weights: &ConfidenceWeights) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let supported_fraction = if inputs.claims_total == 0 {
        0.0
    } else {
        inputs.claims_supported.min(inputs.claims_total) as f64 / inputs.claims_total as f64
    };
    #[allow(clippy::cast_precision_loss)]
    let penalty = weights.unavailable_penalty * inputs.unavailable_required as f64;
    let raw = weights.support_weight.mul_add(
        supported_fraction,
        weights.relevance_weight * inputs.mean_relevance.clamp(0.0, 1.0),
    ) - penalty;
    if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) }
}
