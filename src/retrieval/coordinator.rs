//! Concurrent plan execution.
//!
//! Each active source runs in its own task under the plan's per-source
//! timeout. The coordinator waits for every task or the plan deadline,
//! whichever comes first; at the deadline the cancellation token fires, the
//! remaining tasks are aborted and they are recorded as unavailable.
//! Adapter failures never escape as errors, only as per-source outcomes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::circuit::CircuitBreakers;
use super::merger::SourceBatch;
use super::plan::{PlannedSource, RetrievalPlan};
use crate::core::{EvidenceItem, SourceId, SourceReport, SourceStatus};
use crate::error::SourceError;
use crate::source::{Calibration, SourceRegistry, SourceRequest};

/// Result of one planned source.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    /// The planned source.
    pub source: PlannedSource,
    /// Final status.
    pub status: SourceStatus,
    /// Items returned (empty unless `status` is `Ok`).
    pub items: Vec<EvidenceItem>,
    /// Calibration declared by the adapter.
    pub calibration: Calibration,
    /// Internal error, kept for logging; never shown to callers.
    pub error: Option<SourceError>,
    /// Time spent on the call.
    pub elapsed: Duration,
}

impl SourceOutcome {
    fn failed(source: PlannedSource, status: SourceStatus, error: Option<SourceError>, elapsed: Duration) -> Self {
        Self {
            source,
            status,
            items: Vec::new(),
            calibration: Calibration::Identity,
            error,
            elapsed,
        }
    }

    /// Outcome of a source that was not called because its circuit is open.
    #[must_use]
    pub fn skipped(source: PlannedSource) -> Self {
        Self::failed(source, SourceStatus::Skipped, None, Duration::ZERO)
    }

    /// Caller-facing report for this source.
    #[must_use]
    pub fn report(&self) -> SourceReport {
        let summary = match (&self.error, self.status) {
            (Some(e), _) => Some(e.redacted().to_string()),
            (None, SourceStatus::Skipped) => Some("circuit open; source not called".to_string()),
            (None, _) => None,
        };
        SourceReport {
            source: self.source.id.clone(),
            family: self.source.family,
            status: self.status,
            items: self.items.len(),
            required: self.source.required,
            summary,
            elapsed: self.elapsed,
        }
    }

    /// Items of this outcome as a merger batch.
    #[must_use]
    pub fn batch(&self) -> SourceBatch {
        SourceBatch {
            source: self.source.id.clone(),
            priority: self.source.priority,
            calibration: self.calibration,
            items: self.items.clone(),
        }
    }
}

/// Everything learned from executing one plan.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    /// One entry per planned source, in plan order.
    pub sources: Vec<SourceOutcome>,
    /// Calls abandoned at the deadline.
    pub abandoned: usize,
    /// Wall-clock time of the execution.
    pub elapsed: Duration,
}

impl RetrievalOutcome {
    /// Whether any source returned at least one item.
    #[must_use]
    pub fn has_evidence(&self) -> bool {
        self.sources.iter().any(|o| !o.items.is_empty())
    }

    /// Planned sources that did not finish `Ok`, in plan order.
    #[must_use]
    pub fn degraded_sources(&self) -> Vec<SourceId> {
        self.sources
            .iter()
            .filter(|o| o.status.is_failure())
            .map(|o| o.source.id.clone())
            .collect()
    }

    /// Required sources that did not finish `Ok`.
    #[must_use]
    pub fn failed_required(&self) -> usize {
        self.sources
            .iter()
            .filter(|o| o.source.required && o.status.is_failure())
            .count()
    }

    /// Caller-facing reports in plan order.
    #[must_use]
    pub fn reports(&self) -> Vec<SourceReport> {
        self.sources.iter().map(SourceOutcome::report).collect()
    }

    /// Merger input for every source.
    #[must_use]
    pub fn batches(&self) -> Vec<SourceBatch> {
        self.sources.iter().map(SourceOutcome::batch).collect()
    }
}

/// Fans a plan out to its sources and applies circuit breaking.
#[derive(Debug, Clone)]
pub struct RetrievalCoordinator {
    registry: Arc<SourceRegistry>,
    breakers: Arc<CircuitBreakers>,
}

impl RetrievalCoordinator {
    /// Creates a coordinator over shared registry and breaker state.
    #[must_use]
    pub const fn new(registry: Arc<SourceRegistry>, breakers: Arc<CircuitBreakers>) -> Self {
        Self { registry, breakers }
    }

    /// Shared circuit breakers.
    #[must_use]
    pub fn breakers(&self) -> &CircuitBreakers {
        &self.breakers
    }

    /// Shared source registry.
    #[must_use]
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Executes a plan.
    ///
    /// Returns within the plan deadline (plus scheduling slack) no matter how
    /// many adapters hang. Cancelling `parent` abandons every pending call.
    pub async fn execute(&self, plan: &RetrievalPlan, parent: &CancellationToken) -> RetrievalOutcome {
        let started = Instant::now();
        let deadline = started + plan.deadline;
        let token = parent.child_token();
        let _cancel_on_exit = token.clone().drop_guard();

        let mut slots: Vec<Option<SourceOutcome>> = plan.sources.iter().map(|_| None).collect();
        let mut calibrations: Vec<Calibration> = vec![Calibration::Identity; plan.sources.len()];
        let mut tasks = JoinSet::new();
        let mut task_index = HashMap::new();

        for (idx, planned) in plan.sources.iter().enumerate() {
            if planned.skipped {
                debug!(source = %planned.id, "circuit open, skipping");
                slots[idx] = Some(SourceOutcome::skipped(planned.clone()));
                continue;
            }
            let Some(adapter) = self.registry.get(&planned.id) else {
                slots[idx] = Some(SourceOutcome::failed(
                    planned.clone(),
                    SourceStatus::Unavailable,
                    Some(SourceError::unavailable("source is not registered")),
                    Duration::ZERO,
                ));
                continue;
            };
            // The circuit may have opened since planning.
            if !self.breakers.admit(&planned.id).permits() {
                debug!(source = %planned.id, "circuit rejected call");
                slots[idx] = Some(SourceOutcome::skipped(planned.clone()));
                continue;
            }

            calibrations[idx] = adapter.calibration();
            let adapter = Arc::clone(adapter);
            let timeout = plan.per_source_timeout;
            let request = SourceRequest {
                text: plan.text.clone(),
                filters: plan.filters.clone(),
                max_results: plan.per_source_cap,
                timeout,
                cancel: token.child_token(),
            };
            debug!(source = %planned.id, timeout_ms = timeout.as_millis(), "dispatching");
            let handle = tasks.spawn(async move {
                let call_started = Instant::now();
                let result = tokio::time::timeout(timeout, adapter.retrieve(&request))
                    .await
                    .unwrap_or_else(|_| Err(SourceError::unavailable(format!("timed out after {timeout:?}"))));
                (result, call_started.elapsed())
            });
            task_index.insert(handle.id(), idx);
        }

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next_with_id()).await {
                Ok(Some(Ok((id, (result, elapsed))))) => {
                    if let Some(&idx) = task_index.get(&id) {
                        slots[idx] = Some(self.record(&plan.sources[idx], calibrations[idx], result, elapsed, plan.per_source_cap));
                    }
                }
                Ok(Some(Err(join_error))) => {
                    if let Some(&idx) = task_index.get(&join_error.id()) {
                        let error = SourceError::unavailable(format!("adapter task failed: {join_error}"));
                        slots[idx] = Some(self.record(&plan.sources[idx], calibrations[idx], Err(error), started.elapsed(), 0));
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    token.cancel();
                    tasks.abort_all();
                    break;
                }
            }
        }

        let mut abandoned = 0;
        let sources = slots
            .into_iter()
            .zip(&plan.sources)
            .map(|(slot, planned)| {
                slot.unwrap_or_else(|| {
                    abandoned += 1;
                    self.breakers.record_failure(&planned.id);
                    warn!(source = %planned.id, "abandoned at plan deadline");
                    SourceOutcome::failed(
                        planned.clone(),
                        SourceStatus::Unavailable,
                        Some(SourceError::unavailable("plan deadline passed before the source answered")),
                        plan.deadline,
                    )
                })
            })
            .collect();

        let elapsed = started.elapsed();
        debug!(abandoned, elapsed_ms = elapsed.as_millis(), "plan executed");
        RetrievalOutcome {
            sources,
            abandoned,
            elapsed,
        }
    }

    fn record(
        &self,
        planned: &PlannedSource,
        calibration: Calibration,
        result: Result<Vec<EvidenceItem>, SourceError>,
        elapsed: Duration,
        cap: usize,
    ) -> SourceOutcome {
        match result {
            Ok(mut items) => {
                self.breakers.record_success(&planned.id);
                items.truncate(cap);
                for item in &mut items {
                    // Adapters own their items; pin provenance and range anyway.
                    item.source = planned.id.clone();
                    item.score = if item.score.is_finite() { item.score.clamp(0.0, 1.0) } else { 0.0 };
                }
                debug!(source = %planned.id, items = items.len(), elapsed_ms = elapsed.as_millis(), "source returned");
                SourceOutcome {
                    source: planned.clone(),
                    status: SourceStatus::Ok,
                    items,
                    calibration,
                    error: None,
                    elapsed,
                }
            }
            Err(error) => {
                if error.trips_circuit() {
                    self.breakers.record_failure(&planned.id);
                } else {
                    self.breakers.record_rejected(&planned.id);
                }
                warn!(source = %planned.id, error = %error, elapsed_ms = elapsed.as_millis(), "source failed");
                SourceOutcome::failed(planned.clone(), SourceStatus::from(error.kind()), Some(error), elapsed)
            }
        }
    }
}
