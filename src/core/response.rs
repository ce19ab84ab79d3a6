//! The structured result returned for every query.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::answer::Answer;
use super::evidence::{RankedEvidenceSet, SourceFamily, SourceId};
use super::query::StrategyName;
use crate::error::ErrorKind;
use crate::swarm::SwarmTrace;

/// Overall outcome of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// Every required source answered and synthesis (if wanted) succeeded.
    Ok,
    /// A required source failed, or the swarm ran out of hand-off depth,
    /// but the evidence and answer are still usable.
    PartialOk,
    /// Evidence was retrieved but no answer could be synthesized.
    EvidenceOnly,
    /// No usable evidence from any source, and some source was required.
    Failed,
}

impl QueryStatus {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::PartialOk => "partial_ok",
            Self::EvidenceOnly => "evidence_only",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one planned source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Returned results (possibly zero rows).
    Ok,
    /// Timed out, abandoned at the deadline, or unreachable.
    Unavailable,
    /// Rejected the query.
    Invalid,
    /// Reachable but lost a sub-capability.
    Degraded,
    /// Not invoked because its circuit was open.
    Skipped,
}

impl SourceStatus {
    /// Whether this source should be listed as degraded.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        !matches!(self, Self::Ok)
    }
}

impl From<ErrorKind> for SourceStatus {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Invalid => Self::Invalid,
            ErrorKind::Degraded => Self::Degraded,
            _ => Self::Unavailable,
        }
    }
}

/// Per-source report on the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    /// Source identifier.
    pub source: SourceId,
    /// Family the source belongs to.
    pub family: SourceFamily,
    /// Outcome.
    pub status: SourceStatus,
    /// Items the source returned.
    pub items: usize,
    /// Whether the plan required this source.
    pub required: bool,
    /// Redacted explanation for non-`Ok` outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Wall-clock time spent on this source.
    #[serde(serialize_with = "serialize_duration", skip_deserializing, default)]
    pub elapsed: Duration,
}

/// Non-fatal conditions worth surfacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineWarning {
    /// The completion service failed; evidence is returned alone.
    SynthesisUnavailable {
        /// Redacted reason.
        summary: String,
    },
    /// The swarm hit its hand-off depth bound and aggregated early.
    Exhausted {
        /// Configured maximum depth.
        max_depth: usize,
        /// Hand-offs that were not dispatched.
        dropped: usize,
    },
    /// The total deadline elapsed before every source finished.
    DeadlineExceeded {
        /// Sources abandoned at the deadline.
        abandoned: usize,
    },
}

impl EngineWarning {
    /// Classification of this warning.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::SynthesisUnavailable { .. } => ErrorKind::SynthesisUnavailable,
            Self::Exhausted { .. } => ErrorKind::Exhausted,
            Self::DeadlineExceeded { .. } => ErrorKind::Unavailable,
        }
    }
}

/// Typed classification plus a redacted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// Classification.
    pub kind: ErrorKind,
    /// Redacted message.
    pub summary: String,
}

/// Response to one [`Query`](super::query::Query).
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    /// Overall outcome.
    pub status: QueryStatus,
    /// Strategy that ran.
    pub strategy: StrategyName,
    /// Synthesized answer, when one was produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<Answer>,
    /// Merged, ranked evidence.
    pub evidence: RankedEvidenceSet,
    /// Sources that were skipped, failed, or degraded, in plan order.
    pub degraded_sources: Vec<SourceId>,
    /// Per-source outcomes, in plan order.
    pub sources: Vec<SourceReport>,
    /// Non-fatal conditions.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<EngineWarning>,
    /// Set when the query was rejected or failed outright.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSummary>,
    /// Swarm decomposition trace, on the multi-agent path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swarm: Option<SwarmTrace>,
    /// Total elapsed time.
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
}

impl QueryResponse {
    /// A `Failed` response for a query rejected before retrieval.
    #[must_use]
    pub fn rejected(strategy: StrategyName, kind: ErrorKind, summary: String) -> Self {
        Self {
            status: QueryStatus::Failed,
            strategy,
            answer: None,
            evidence: RankedEvidenceSet::default(),
            degraded_sources: Vec::new(),
            sources: Vec::new(),
            warnings: Vec::new(),
            error: Some(ErrorSummary { kind, summary }),
            swarm: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Whether a warning of this kind was raised.
    #[must_use]
    pub fn has_warning(&self, kind: ErrorKind) -> bool {
        self.warnings.iter().any(|w| w.kind() == kind)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_duration<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_f64(d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&QueryStatus::PartialOk).unwrap_or_default();
        assert_eq!(json, "\"partial_ok\"");
    }

    #[test]
    fn test_source_status_failure() {
        assert!(!SourceStatus::Ok.is_failure());
        assert!(SourceStatus::Skipped.is_failure());
        assert_eq!(SourceStatus::from(ErrorKind::Degraded), SourceStatus::Degraded);
    }

    #[test]
    fn test_warning_tagged_serialization() {
        let w = EngineWarning::Exhausted {
            max_depth: 2,
            dropped: 1,
        };
        let json = serde_json::to_string(&w).unwrap_or_default();
        assert!(json.contains("\"kind\":\"exhausted\""));
        assert_eq!(w.kind(), ErrorKind::Exhausted);
    }

    #[test]
    fn test_rejected_response() {
        let r = QueryResponse::rejected(
            StrategyName::Rapid,
            ErrorKind::Invalid,
            "query cannot be empty".to_string(),
        );
        assert_eq!(r.status, QueryStatus::Failed);
        assert!(r.error.is_some());
        assert!(r.evidence.is_empty());
    }
}
