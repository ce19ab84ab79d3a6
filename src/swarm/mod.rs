//! Multi-agent swarm orchestration.
//!
//! ```text
//! Decomposing ──▶ Dispatching ──▶ AwaitingHandoff ──▶ Dispatching ... ──▶ Aggregating ──▶ Done
//! ```
//!
//! Sub-queries run breadth-first, one depth level at a time, with every
//! specialist at a level running concurrently. Hand-offs found at depth `d`
//! are queued for depth `d + 1`; any that would exceed the configured maximum
//! depth are dropped and the trace is marked exhausted. Pairs of
//! `(family, sub-query)` are dispatched at most once, so the chain is acyclic
//! and the loop always terminates.

pub mod decompose;
pub mod handoff;
pub mod specialist;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use decompose::{DecomposerAgent, DecompositionSource};
pub use specialist::{Dispatch, Specialist};

use crate::config::EngineConfig;
use crate::core::{AgentHandoff, Query, SourceFamily};
use crate::llm::{LlmProvider, PromptSet};
use crate::retrieval::{RetrievalCoordinator, RetrievalOutcome, RetrievalPlan, SourceOutcome};

/// Swarm bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwarmConfig {
    /// Most sub-queries produced by decomposition.
    pub max_sub_queries: usize,
    /// Deepest hand-off level dispatched (initial sub-queries are depth 0).
    pub max_handoff_depth: usize,
    /// Most hand-offs taken from a single dispatch.
    pub max_handoffs_per_result: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_sub_queries: 4,
            max_handoff_depth: 2,
            max_handoffs_per_result: 2,
        }
    }
}

impl SwarmConfig {
    /// Sets the sub-query bound.
    #[must_use]
    pub const fn with_max_sub_queries(mut self, n: usize) -> Self {
        self.max_sub_queries = n;
        self
    }

    /// Sets the hand-off depth bound.
    #[must_use]
    pub const fn with_max_handoff_depth(mut self, depth: usize) -> Self {
        self.max_handoff_depth = depth;
        self
    }

    /// Sets the per-dispatch hand-off bound.
    #[must_use]
    pub const fn with_max_handoffs_per_result(mut self, n: usize) -> Self {
        self.max_handoffs_per_result = n;
        self
    }
}

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmState {
    /// Splitting the query into sub-queries.
    Decomposing,
    /// Running a level of sub-queries.
    Dispatching,
    /// Hand-offs queued for the next level.
    AwaitingHandoff,
    /// Merging every agent's evidence.
    Aggregating,
    /// Finished.
    Done,
}

impl SwarmState {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Decomposing => "decomposing",
            Self::Dispatching => "dispatching",
            Self::AwaitingHandoff => "awaiting_handoff",
            Self::Aggregating => "aggregating",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for SwarmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sub-query addressed to one family's specialist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubQuery {
    /// Target family.
    pub family: SourceFamily,
    /// Query text.
    pub text: String,
    /// Hand-off depth (0 for decomposition output).
    pub depth: usize,
}

impl SubQuery {
    /// A depth-0 sub-query.
    #[must_use]
    pub const fn initial(family: SourceFamily, text: String) -> Self {
        Self { family, text, depth: 0 }
    }
}

/// Observable record of one swarm run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwarmTrace {
    /// Final state.
    pub state: SwarmState,
    /// Every state entered, in order.
    pub transitions: Vec<SwarmState>,
    /// Who produced the initial sub-queries.
    pub decomposition: DecompositionSource,
    /// Every dispatched sub-query, in dispatch order.
    pub sub_queries: Vec<SubQuery>,
    /// Hand-off chain.
    pub handoffs: Vec<AgentHandoff>,
    /// A hand-off was dropped at the depth bound.
    pub exhausted: bool,
    /// Hand-offs dropped at the depth bound.
    pub dropped_handoffs: usize,
    /// Sub-queries still queued when the deadline passed.
    pub undispatched: usize,
}

impl SwarmTrace {
    fn new() -> Self {
        Self {
            state: SwarmState::Decomposing,
            transitions: vec![SwarmState::Decomposing],
            decomposition: DecompositionSource::Heuristic,
            sub_queries: Vec::new(),
            handoffs: Vec::new(),
            exhausted: false,
            dropped_handoffs: 0,
            undispatched: 0,
        }
    }

    /// Marks the run finished.
    pub fn finish(&mut self) {
        self.enter(SwarmState::Done);
    }

    fn enter(&mut self, state: SwarmState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "swarm state transition");
            self.state = state;
            self.transitions.push(state);
        }
    }
}

/// Result of a swarm run: the trace plus every source outcome.
#[derive(Debug, Clone)]
pub struct SwarmOutcome {
    /// Observable record.
    pub trace: SwarmTrace,
    /// Per-source outcomes of every dispatch, in dispatch order.
    pub retrieval: RetrievalOutcome,
}

/// Drives decomposition, specialist dispatch and hand-offs.
pub struct SwarmOrchestrator {
    coordinator: RetrievalCoordinator,
    provider: Option<Arc<dyn LlmProvider>>,
    decomposer: DecomposerAgent,
    config: SwarmConfig,
    decomposition_timeout: std::time::Duration,
}

impl SwarmOrchestrator {
    /// Creates an orchestrator; without a provider decomposition is heuristic.
    #[must_use]
    pub fn new(
        coordinator: RetrievalCoordinator,
        provider: Option<Arc<dyn LlmProvider>>,
        config: &EngineConfig,
        prompts: &PromptSet,
    ) -> Self {
        Self {
            coordinator,
            provider,
            decomposer: DecomposerAgent::new(config, prompts.decomposer.clone()),
            config: config.swarm,
            decomposition_timeout: config.synthesis_timeout,
        }
    }

    /// Runs the swarm for `query` under the budget of `plan`.
    ///
    /// `plan` is the swarm strategy's top-level plan; its deadline bounds the
    /// whole run, including decomposition.
    pub async fn run(&self, query: &Query, plan: &RetrievalPlan, cancel: &CancellationToken) -> SwarmOutcome {
        let started = Instant::now();
        let deadline = started + plan.deadline;
        let mut trace = SwarmTrace::new();

        let families: Vec<SourceFamily> = plan
            .sources
            .iter()
            .map(|s| s.family)
            .fold(Vec::new(), |mut acc, family| {
                if !acc.contains(&family) {
                    acc.push(family);
                }
                acc
            });

        let (initial, source) = self.decompose(query, &families, deadline).await;
        trace.decomposition = source;
        info!(sub_queries = initial.len(), source = ?source, "query decomposed");

        let mut seen: HashSet<(SourceFamily, String)> =
            initial.iter().map(|s| (s.family, s.text.clone())).collect();
        let mut queue: VecDeque<SubQuery> = initial.into();
        let mut retrieval = RetrievalOutcome::default();

        while !queue.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || cancel.is_cancelled() {
                trace.undispatched = queue.len();
                warn!(undispatched = queue.len(), "swarm deadline passed with sub-queries queued");
                break;
            }

            trace.enter(SwarmState::Dispatching);
            let level = queue.front().map_or(0, |s| s.depth);
            let width = queue.iter().take_while(|s| s.depth == level).count();
            let batch: Vec<SubQuery> = queue.drain(..width).collect();
            trace.sub_queries.extend(batch.iter().cloned());

            let dispatches: Vec<Dispatch> = join_all(batch.into_iter().map(|sub| {
                let specialist = Specialist::new(sub.family, &self.coordinator);
                async move { specialist.dispatch(query, sub, remaining, cancel).await }
            }))
            .await;

            for dispatch in dispatches {
                self.queue_handoffs(&dispatch, &families, &mut seen, &mut queue, &mut trace);
                retrieval.abandoned += dispatch.outcome.abandoned;
                retrieval.sources.extend(dispatch.outcome.sources);
            }

            if !queue.is_empty() {
                trace.enter(SwarmState::AwaitingHandoff);
            }
        }

        for planned in plan.skipped() {
            if !retrieval.sources.iter().any(|o| o.source.id == planned.id) {
                debug!(source = %planned.id, "circuit open, no specialist dispatched");
                retrieval.sources.push(SourceOutcome::skipped(planned.clone()));
            }
        }

        if trace.exhausted {
            warn!(
                max_depth = self.config.max_handoff_depth,
                dropped = trace.dropped_handoffs,
                "hand-off depth bound reached, aggregating early"
            );
        }
        trace.enter(SwarmState::Aggregating);
        retrieval.elapsed = started.elapsed();
        SwarmOutcome { trace, retrieval }
    }

    async fn decompose(
        &self,
        query: &Query,
        families: &[SourceFamily],
        deadline: Instant,
    ) -> (Vec<SubQuery>, DecompositionSource) {
        let max = self.config.max_sub_queries;
        if let Some(provider) = self.provider.as_deref() {
            let budget = self
                .decomposition_timeout
                .min(deadline.saturating_duration_since(Instant::now()));
            match self
                .decomposer
                .decompose(provider, &query.text, families, max, budget)
                .await
            {
                Ok(subs) => return (subs, DecompositionSource::Agent),
                Err(e) => warn!(error = %e, "decomposition failed, using heuristic"),
            }
        }
        (decompose::heuristic(&query.text, families, max), DecompositionSource::Heuristic)
    }

    fn queue_handoffs(
        &self,
        dispatch: &Dispatch,
        families: &[SourceFamily],
        seen: &mut HashSet<(SourceFamily, String)>,
        queue: &mut VecDeque<SubQuery>,
        trace: &mut SwarmTrace,
    ) {
        let depth = dispatch.sub_query.depth + 1;
        for candidate in dispatch.handoffs(self.config.max_handoffs_per_result) {
            if !families.contains(&candidate.to) || seen.contains(&(candidate.to, candidate.sub_query.clone())) {
                continue;
            }
            if depth > self.config.max_handoff_depth {
                trace.exhausted = true;
                trace.dropped_handoffs += 1;
                continue;
            }
            seen.insert((candidate.to, candidate.sub_query.clone()));
            info!(
                from = %dispatch.sub_query.family,
                to = %candidate.to,
                sub_query = %candidate.sub_query,
                depth,
                "hand-off"
            );
            trace.handoffs.push(AgentHandoff {
                from: dispatch.sub_query.family,
                to: candidate.to,
                sub_query: candidate.sub_query.clone(),
                trigger_source: candidate.trigger_source,
                trigger_id: candidate.trigger_id,
                depth,
            });
            queue.push_back(SubQuery {
                family: candidate.to,
                text: candidate.sub_query,
                depth,
            });
        }
    }
}

impl std::fmt::Debug for SwarmOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmOrchestrator")
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
