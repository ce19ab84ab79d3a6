//! Synthesized answers, flagged claims and swarm hand-offs.

use serde::{Deserialize, Serialize};

use super::evidence::{RankedEvidenceSet, SourceFamily, SourceId};
use super::severity::Severity;

/// Why a claim was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClaimReason {
    /// No evidence backs the claim.
    Unsupported,
    /// Evidence states something incompatible with the claim.
    Contradicted,
    /// Evidence only weakly backs the claim.
    LowConfidence,
}

impl ClaimReason {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::Contradicted => "contradicted",
            Self::LowConfidence => "low-confidence",
        }
    }
}

impl std::fmt::Display for ClaimReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A claim from the answer that validation could not fully ground.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedClaim {
    /// Claim text as it appeared in the draft answer.
    pub claim: String,
    /// Classification.
    pub reason: ClaimReason,
    /// How much the caller should care.
    pub severity: Severity,
    /// Best lexical support found in the evidence (`0.0`–`1.0`).
    pub support: f64,
    /// Human-readable explanation.
    pub detail: String,
}

/// A resolved `[E#]` citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Label used in the answer text (e.g. `"E1"`).
    pub label: String,
    /// Cited source.
    pub source: SourceId,
    /// Cited item within that source.
    pub external_id: String,
}

/// One swarm agent forwarding a refined sub-query to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentHandoff {
    /// Agent that found the trigger.
    pub from: SourceFamily,
    /// Agent that receives the sub-query.
    pub to: SourceFamily,
    /// Refined sub-query.
    pub sub_query: String,
    /// Source of the evidence that triggered the hand-off.
    pub trigger_source: SourceId,
    /// External id of the evidence that triggered the hand-off.
    pub trigger_id: String,
    /// Depth of the receiving dispatch (initial dispatches are depth 0).
    pub depth: usize,
}

/// Final synthesized answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Answer text, with contradicted claims and dangling citations removed.
    pub text: String,
    /// Evidence the answer was grounded in (serialized once, on the response).
    #[serde(skip)]
    pub evidence: RankedEvidenceSet,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Claims that validation flagged.
    pub flagged: Vec<FlaggedClaim>,
    /// Citations that resolved to evidence in the set.
    pub citations: Vec<Citation>,
    /// Number of atomic claims extracted from the draft.
    pub claims_total: usize,
    /// Number of claims with sufficient support.
    pub claims_supported: usize,
    /// Hand-off chain, on the swarm path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub handoffs: Vec<AgentHandoff>,
}

impl Answer {
    /// Flagged claims at or above a severity.
    pub fn flagged_at_least(&self, severity: Severity) -> impl Iterator<Item = &FlaggedClaim> {
        self.flagged
            .iter()
            .filter(move |f| f.severity.at_least(severity))
    }
}
