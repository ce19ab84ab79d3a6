//! The `query` operation.
//!
//! Validates the query, selects a plan, retrieves directly or through the
//! swarm, merges evidence, synthesizes and assembles the response. Callers
//! always get a [`QueryResponse`]; nothing in here returns an error for a
//! query that was accepted.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::core::{EngineWarning, ErrorSummary, Query, QueryResponse, QueryStatus, SourceId};
use crate::error::{ErrorKind, Result};
use crate::llm::{LlmProvider, PromptSet, create_provider};
use crate::retrieval::{
    CircuitBreakers, RetrievalCoordinator, RetrievalOutcome, RetrievalPlan, StrategySelector, merge,
};
use crate::source::SourceRegistry;
use crate::swarm::{SwarmOrchestrator, SwarmTrace};
use crate::synthesis::{SynthesisOutcome, Synthesizer};

/// Cross-source retrieval and synthesis engine.
///
/// Holds the only state shared between queries: the source registry and the
/// per-source circuit breakers.
pub struct Engine {
    config: EngineConfig,
    coordinator: RetrievalCoordinator,
    synthesizer: Synthesizer,
    swarm: SwarmOrchestrator,
}

impl Engine {
    /// Creates an engine, building the completion provider when an API key
    /// is configured and loading prompt templates.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured provider is not supported.
    pub fn new(config: EngineConfig, registry: SourceRegistry) -> Result<Self> {
        let provider = if config.has_completion_service() {
            Some(create_provider(&config)?)
        } else {
            info!("no API key configured, synthesis disabled");
            None
        };
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        Ok(Self::with_provider(config, registry, provider, &prompts))
    }

    /// Creates an engine around an explicit provider (or none).
    #[must_use]
    pub fn with_provider(
        config: EngineConfig,
        registry: SourceRegistry,
        provider: Option<Arc<dyn LlmProvider>>,
        prompts: &PromptSet,
    ) -> Self {
        let breakers = Arc::new(CircuitBreakers::new(config.circuit));
        let coordinator = RetrievalCoordinator::new(Arc::new(registry), breakers);
        let synthesizer = Synthesizer::new(&config, prompts, provider.clone());
        let swarm = SwarmOrchestrator::new(coordinator.clone(), provider, &config, prompts);
        Self {
            config,
            coordinator,
            synthesizer,
            swarm,
        }
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registered sources.
    #[must_use]
    pub fn registry(&self) -> &SourceRegistry {
        self.coordinator.registry()
    }

    /// Process-wide circuit breakers.
    #[must_use]
    pub fn breakers(&self) -> &CircuitBreakers {
        self.coordinator.breakers()
    }

    /// Plan the engine would run for `query`.
    #[must_use]
    pub fn plan(&self, query: &Query) -> RetrievalPlan {
        StrategySelector::new(self.registry(), self.breakers()).select(query)
    }

    /// Answers one query.
    pub async fn query(&self, query: Query) -> QueryResponse {
        self.query_with_cancel(query, &CancellationToken::new()).await
    }

    /// Answers one query; cancelling `cancel` abandons pending retrieval.
    pub async fn query_with_cancel(&self, query: Query, cancel: &CancellationToken) -> QueryResponse {
        let started = Instant::now();
        if let Err(e) = query.validate() {
            warn!(error = %e, "query rejected");
            return QueryResponse::rejected(query.strategy, ErrorKind::Invalid, e.to_string());
        }

        let plan = self.plan(&query);
        info!(
            strategy = %plan.strategy,
            sources = plan.sources.len(),
            active = plan.active().count(),
            multi_agent = plan.multi_agent,
            "query started"
        );

        let (outcome, mut trace) = if plan.multi_agent {
            let swarm = self.swarm.run(&query, &plan, cancel).await;
            (swarm.retrieval, Some(swarm.trace))
        } else {
            (self.coordinator.execute(&plan, cancel).await, None)
        };

        let evidence = merge(&outcome.batches(), plan.total_cap, &self.config.merge);
        let unavailable_required = unavailable_required(&outcome);
        let mut warnings = Vec::new();

        let abandoned = outcome.abandoned + trace.as_ref().map_or(0, |t| t.undispatched);
        if abandoned > 0 {
            warnings.push(EngineWarning::DeadlineExceeded { abandoned });
        }
        if let Some(t) = trace.as_ref().filter(|t| t.exhausted) {
            warnings.push(EngineWarning::Exhausted {
                max_depth: self.config.swarm.max_handoff_depth,
                dropped: t.dropped_handoffs,
            });
        }

        let failed = evidence.is_empty() && plan.requires_any();
        let mut answer = None;
        let mut error = None;
        if failed {
            warn!(strategy = %plan.strategy, "no usable evidence from any required source");
            error = Some(ErrorSummary {
                kind: ErrorKind::Unavailable,
                summary: "no usable evidence from any required source".to_string(),
            });
        } else {
            match self
                .synthesizer
                .synthesize(&query.text, &evidence, plan.synthesis, unavailable_required)
                .await
            {
                SynthesisOutcome::Answered(mut a) => {
                    a.handoffs = trace.as_ref().map(|t| t.handoffs.clone()).unwrap_or_default();
                    answer = Some(a);
                }
                SynthesisOutcome::Skipped => {}
                SynthesisOutcome::Unavailable { summary } => {
                    warnings.push(EngineWarning::SynthesisUnavailable { summary });
                }
            }
        }
        if let Some(t) = trace.as_mut() {
            t.finish();
        }

        let status = resolve_status(failed, &warnings, unavailable_required, trace.as_ref());
        let elapsed = started.elapsed();
        info!(
            status = %status,
            evidence = evidence.len(),
            answered = answer.is_some(),
            elapsed_ms = elapsed.as_millis(),
            "query finished"
        );

        QueryResponse {
            status,
            strategy: plan.strategy,
            answer,
            evidence,
            degraded_sources: degraded_sources(&outcome),
            sources: outcome.reports(),
            warnings,
            error,
            swarm: trace,
            elapsed,
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("sources", &self.registry().len())
            .field("synthesizer", &self.synthesizer)
            .finish_non_exhaustive()
    }
}

/// Failed > `EvidenceOnly` > `PartialOk` > Ok.
fn resolve_status(
    failed: bool,
    warnings: &[EngineWarning],
    unavailable_required: usize,
    trace: Option<&SwarmTrace>,
) -> QueryStatus {
    if failed {
        QueryStatus::Failed
    } else if warnings.iter().any(|w| w.kind() == ErrorKind::SynthesisUnavailable) {
        QueryStatus::EvidenceOnly
    } else if unavailable_required > 0 || trace.is_some_and(|t| t.exhausted) {
        QueryStatus::PartialOk
    } else {
        QueryStatus::Ok
    }
}

/// Distinct sources that did not finish `Ok`, in first-seen order.
fn degraded_sources(outcome: &RetrievalOutcome) -> Vec<SourceId> {
    let mut seen = HashSet::new();
    outcome
        .degraded_sources()
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Distinct required sources that did not finish `Ok`.
fn unavailable_required(outcome: &RetrievalOutcome) -> usize {
    outcome
        .sources
        .iter()
        .filter(|o| o.source.required && o.status.is_failure())
        .map(|o| &o.source.id)
        .collect::<HashSet<_>>()
        .len()
}
