//! Strategy table and plan selection.
//!
//! [`StrategySelector::select`] maps a query onto a [`RetrievalPlan`] using a
//! fixed table of named strategies. It reads circuit state but never changes
//! it; the coordinator owns every circuit update.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::circuit::CircuitBreakers;
use super::intent;
use super::plan::{PlannedSource, RetrievalPlan, SynthesisMode};
use crate::core::{Query, SourceFamily, StrategyName};
use crate::source::SourceRegistry;

/// Which planned sources count as required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredSources {
    /// Best effort: no source is required.
    None,
    /// Sources whose family matches detected intent; all when no intent.
    IntentMatched,
    /// Every planned source.
    All,
}

/// One row of the strategy table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyConfig {
    /// Strategy name.
    pub name: StrategyName,
    /// Families eligible for the plan.
    pub families: &'static [SourceFamily],
    /// Items requested from each source.
    pub per_source_cap: usize,
    /// Time budget per adapter call.
    #[serde(serialize_with = "serialize_millis")]
    pub per_source_timeout: Duration,
    /// Total retrieval deadline.
    #[serde(serialize_with = "serialize_millis")]
    pub deadline: Duration,
    /// Items kept after merging.
    pub total_cap: usize,
    /// Required-source policy.
    pub required: RequiredSources,
    /// Synthesis policy.
    pub synthesis: SynthesisMode,
    /// Whether the swarm orchestrator runs this strategy.
    pub multi_agent: bool,
}

const RAPID_FAMILIES: &[SourceFamily] = &[SourceFamily::KnowledgeBase, SourceFamily::Tickets];

impl StrategyConfig {
    /// Looks up the table row for a strategy.
    #[must_use]
    pub const fn for_name(name: StrategyName) -> Self {
        match name {
            StrategyName::Rapid => Self {
                name,
                families: RAPID_FAMILIES,
                per_source_cap: 5,
                per_source_timeout: Duration::from_secs(2),
                deadline: Duration::from_secs(3),
                total_cap: 10,
                required: RequiredSources::None,
                synthesis: SynthesisMode::Optional,
                multi_agent: false,
            },
            StrategyName::Focused => Self {
                name,
                families: &SourceFamily::ALL,
                per_source_cap: 10,
                per_source_timeout: Duration::from_secs(5),
                deadline: Duration::from_secs(8),
                total_cap: 20,
                required: RequiredSources::IntentMatched,
                synthesis: SynthesisMode::Optional,
                multi_agent: false,
            },
            StrategyName::Comprehensive => Self {
                name,
                families: &SourceFamily::ALL,
                per_source_cap: 25,
                per_source_timeout: Duration::from_secs(10),
                deadline: Duration::from_secs(20),
                total_cap: 50,
                required: RequiredSources::All,
                synthesis: SynthesisMode::Required,
                multi_agent: false,
            },
            StrategyName::Swarm => Self {
                name,
                families: &SourceFamily::ALL,
                per_source_cap: 10,
                per_source_timeout: Duration::from_secs(8),
                deadline: Duration::from_secs(30),
                total_cap: 40,
                required: RequiredSources::All,
                synthesis: SynthesisMode::Required,
                multi_agent: true,
            },
        }
    }

    /// The whole table in declaration order.
    #[must_use]
    pub fn table() -> Vec<Self> {
        StrategyName::ALL.into_iter().map(Self::for_name).collect()
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_millis<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Builds plans from the strategy table, the source registry and circuit state.
#[derive(Debug, Clone, Copy)]
pub struct StrategySelector<'a> {
    registry: &'a SourceRegistry,
    breakers: &'a CircuitBreakers,
}

impl<'a> StrategySelector<'a> {
    /// Creates a selector.
    #[must_use]
    pub const fn new(registry: &'a SourceRegistry, breakers: &'a CircuitBreakers) -> Self {
        Self { registry, breakers }
    }

    /// Builds the plan for a query.
    #[must_use]
    pub fn select(&self, query: &Query) -> RetrievalPlan {
        let config = StrategyConfig::for_name(query.strategy);
        let intent = intent::detect(&query.text);
        let order = family_order(config.families, &intent);
        let required = |family: SourceFamily| match config.required {
            RequiredSources::None => false,
            RequiredSources::All => true,
            RequiredSources::IntentMatched => intent.is_empty() || intent.contains(&family),
        };
        self.build(query, &config, &order, intent.clone(), required)
    }

    /// Builds a plan scoped to one family, for a swarm specialist.
    ///
    /// Uses the swarm row's caps and timeouts; every source of the family is
    /// required and synthesis is left to the orchestrator.
    #[must_use]
    pub fn select_scoped(&self, query: &Query, family: SourceFamily) -> RetrievalPlan {
        let config = StrategyConfig::for_name(StrategyName::Swarm);
        let mut plan = self.build(query, &config, &[family], vec![family], |_| true);
        plan.synthesis = SynthesisMode::Optional;
        plan.multi_agent = false;
        plan
    }

    fn build(
        &self,
        query: &Query,
        config: &StrategyConfig,
        order: &[SourceFamily],
        intent: Vec<SourceFamily>,
        required: impl Fn(SourceFamily) -> bool,
    ) -> RetrievalPlan {
        let sources: Vec<PlannedSource> = order
            .iter()
            .flat_map(|family| self.registry.by_family(*family))
            .enumerate()
            .map(|(priority, adapter)| PlannedSource {
                id: adapter.id().clone(),
                family: adapter.family(),
                priority,
                required: required(adapter.family()),
                skipped: self.breakers.is_open(adapter.id()),
            })
            .collect();

        let deadline = query
            .max_latency
            .map_or(config.deadline, |latency| latency.min(config.deadline));
        let per_source_timeout = config.per_source_timeout.min(deadline);

        debug!(
            strategy = %config.name,
            sources = sources.len(),
            skipped = sources.iter().filter(|s| s.skipped).count(),
            intent = ?intent,
            deadline_ms = deadline.as_millis(),
            "plan selected"
        );

        RetrievalPlan {
            strategy: config.name,
            text: query.text.clone(),
            filters: query.filters.clone(),
            sources,
            intent,
            per_source_cap: config.per_source_cap,
            per_source_timeout,
            deadline,
            total_cap: config.total_cap,
            synthesis: config.synthesis,
            multi_agent: config.multi_agent,
        }
    }
}

/// Eligible families with intent-matched ones moved to the front.
fn family_order(eligible: &[SourceFamily], intent: &[SourceFamily]) -> Vec<SourceFamily> {
    let mut order: Vec<SourceFamily> = intent
        .iter()
        .copied()
        .filter(|f| eligible.contains(f))
        .collect();
    order.extend(eligible.iter().copied().filter(|f| !intent.contains(f)));
    order
}
