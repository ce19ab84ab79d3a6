//! Core data model shared by every stage of the engine.

pub mod answer;
pub mod evidence;
pub mod query;
pub mod response;
pub mod severity;

pub use answer::{AgentHandoff, Answer, Citation, ClaimReason, FlaggedClaim};
pub use evidence::{EvidenceItem, RankedEvidenceSet, ScoredEvidence, SourceFamily, SourceId};
pub use query::{MAX_QUERY_LEN, Query, QueryFilters, StrategyName};
pub use response::{
    EngineWarning, ErrorSummary, QueryResponse, QueryStatus, SourceReport, SourceStatus,
};
pub use severity::Severity;
