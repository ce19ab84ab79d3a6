//! Family-scoped specialist agents.
//!
//! A specialist is a strategy selector plus retrieval coordinator restricted
//! to one source family. Its plan borrows the swarm strategy's caps, with the
//! deadline cut to whatever remains of the query budget.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::SubQuery;
use super::handoff::{self, HandoffCandidate};
use crate::core::{Query, SourceFamily, StrategyName};
use crate::retrieval::{RetrievalCoordinator, RetrievalOutcome, RetrievalPlan, StrategySelector};

/// One sub-query's retrieval.
#[derive(Debug, Clone)]
pub struct Dispatch {
    /// The sub-query that ran.
    pub sub_query: SubQuery,
    /// What its sources returned.
    pub outcome: RetrievalOutcome,
}

impl Dispatch {
    /// Hand-offs suggested by this dispatch's evidence.
    #[must_use]
    pub fn handoffs(&self, max: usize) -> Vec<HandoffCandidate> {
        handoff::detect(
            self.sub_query.family,
            self.outcome.sources.iter().flat_map(|s| s.items.iter()),
            max,
        )
    }
}

/// Retrieval agent for one family.
#[derive(Debug, Clone, Copy)]
pub struct Specialist<'a> {
    family: SourceFamily,
    coordinator: &'a RetrievalCoordinator,
}

impl<'a> Specialist<'a> {
    /// Creates the specialist for `family`.
    #[must_use]
    pub const fn new(family: SourceFamily, coordinator: &'a RetrievalCoordinator) -> Self {
        Self { family, coordinator }
    }

    /// Family this specialist searches.
    #[must_use]
    pub const fn family(&self) -> SourceFamily {
        self.family
    }

    /// Plan for `sub_query`, inheriting the caller's filters.
    #[must_use]
    pub fn plan(&self, base: &Query, sub_query: &SubQuery, remaining: Duration) -> RetrievalPlan {
        let scoped = Query::new(sub_query.text.clone(), StrategyName::Swarm).with_filters(base.filters.clone());
        let mut plan = StrategySelector::new(self.coordinator.registry(), self.coordinator.breakers())
            .select_scoped(&scoped, self.family);
        plan.deadline = plan.deadline.min(remaining);
        plan.per_source_timeout = plan.per_source_timeout.min(plan.deadline);
        plan
    }

    /// Runs `sub_query` against this family's sources.
    pub async fn dispatch(
        &self,
        base: &Query,
        sub_query: SubQuery,
        remaining: Duration,
        cancel: &CancellationToken,
    ) -> Dispatch {
        let plan = self.plan(base, &sub_query, remaining);
        debug!(
            family = %self.family,
            depth = sub_query.depth,
            sources = plan.sources.len(),
            deadline_ms = plan.deadline.as_millis(),
            "specialist dispatching"
        );
        let outcome = self.coordinator.execute(&plan, cancel).await;
        Dispatch { sub_query, outcome }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EvidenceItem, QueryFilters, SourceId};
    use crate::error::SourceError;
    use crate::retrieval::CircuitBreakers;
    use crate::source::{Calibration, SourceAdapter, SourceRegistry, SourceRequest};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Fixed {
        id: SourceId,
        family: SourceFamily,
        body: &'static str,
    }

    #[async_trait]
    impl SourceAdapter for Fixed {
        fn id(&self) -> &SourceId {
            &self.id
        }

        fn family(&self) -> SourceFamily {
            self.family
        }

        fn calibration(&self) -> Calibration {
            Calibration::Identity
        }

        async fn retrieve(&self, request: &SourceRequest) -> Result<Vec<EvidenceItem>, SourceError> {
            Ok(vec![EvidenceItem::new(self.id.clone(), request.text.clone(), "", self.body, 0.7)])
        }
    }

    fn coordinator() -> RetrievalCoordinator {
        let registry = SourceRegistry::new()
            .with(Arc::new(Fixed {
                id: SourceId::new("jira"),
                family: SourceFamily::Tickets,
                body: "fixed by a1b2c3d",
            }))
            .and_then(|r| {
                r.with(Arc::new(Fixed {
                    id: SourceId::new("git"),
                    family: SourceFamily::Commits,
                    body: "unused",
                }))
            })
            .unwrap_or_else(|_| unreachable!());
        RetrievalCoordinator::new(Arc::new(registry), Arc::new(CircuitBreakers::default()))
    }

    #[test]
    fn test_plan_is_scoped_and_clamped() {
        let coordinator = coordinator();
        let specialist = Specialist::new(SourceFamily::Tickets, &coordinator);
        let base = Query::new("why", StrategyName::Swarm).with_filters(QueryFilters {
            project: Some("PROJ".to_string()),
            ..QueryFilters::default()
        });
        let plan = specialist.plan(&base, &SubQuery::initial(SourceFamily::Tickets, "PROJ-1".to_string()), Duration::from_secs(2));
        assert_eq!(plan.sources.len(), 1);
        assert_eq!(plan.sources[0].family, SourceFamily::Tickets);
        assert_eq!(plan.text, "PROJ-1");
        assert_eq!(plan.filters.project.as_deref(), Some("PROJ"));
        assert_eq!(plan.deadline, Duration::from_secs(2));
        assert!(plan.per_source_timeout <= plan.deadline);
    }

    #[tokio::test]
    async fn test_dispatch_finds_handoffs() {
        let coordinator = coordinator();
        let specialist = Specialist::new(SourceFamily::Tickets, &coordinator);
        let base = Query::new("why", StrategyName::Swarm);
        let dispatch = specialist
            .dispatch(
                &base,
                SubQuery::initial(SourceFamily::Tickets, "PROJ-1".to_string()),
                Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(dispatch.outcome.sources.len(), 1);
        let handoffs = dispatch.handoffs(2);
        assert_eq!(handoffs.len(), 1);
        assert_eq!(handoffs[0].to, SourceFamily::Commits);
        assert_eq!(handoffs[0].sub_query, "a1b2c3d");
    }
}
