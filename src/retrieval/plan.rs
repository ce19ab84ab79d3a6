//! Retrieval plans: per-query value objects built by the strategy selector.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{QueryFilters, SourceFamily, SourceId, StrategyName};

/// Whether a strategy needs a synthesized answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    /// Synthesize when a completion service is configured.
    Optional,
    /// Synthesis is attempted; failure yields an evidence-only response.
    Required,
}

/// One source selected by a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSource {
    /// Source identifier.
    pub id: SourceId,
    /// Source family.
    pub family: SourceFamily,
    /// Position in plan priority order (0 = highest).
    pub priority: usize,
    /// Whether failure of this source makes the result partial.
    pub required: bool,
    /// Circuit was open at planning time; the source will not be invoked.
    pub skipped: bool,
}

/// Everything the coordinator needs to execute one retrieval.
///
/// Created fresh per query and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalPlan {
    /// Strategy that produced this plan.
    pub strategy: StrategyName,
    /// Text sent to adapters.
    pub text: String,
    /// Filters sent to adapters.
    pub filters: QueryFilters,
    /// Selected sources in priority order, skipped ones included.
    pub sources: Vec<PlannedSource>,
    /// Families detected from the query text, strongest first.
    pub intent: Vec<SourceFamily>,
    /// Maximum items requested from each source.
    pub per_source_cap: usize,
    /// Time budget for each adapter call (never above `deadline`).
    pub per_source_timeout: Duration,
    /// Total time budget for the retrieval.
    pub deadline: Duration,
    /// Maximum items kept after merging.
    pub total_cap: usize,
    /// Whether an answer must be synthesized.
    pub synthesis: SynthesisMode,
    /// Whether the query goes through the swarm orchestrator.
    pub multi_agent: bool,
}

impl RetrievalPlan {
    /// Sources that will be invoked.
    pub fn active(&self) -> impl Iterator<Item = &PlannedSource> {
        self.sources.iter().filter(|s| !s.skipped)
    }

    /// Sources left out because their circuit was open.
    pub fn skipped(&self) -> impl Iterator<Item = &PlannedSource> {
        self.sources.iter().filter(|s| s.skipped)
    }

    /// Whether any planned source is required.
    #[must_use]
    pub fn requires_any(&self) -> bool {
        self.sources.iter().any(|s| s.required)
    }
}
