//! Source adapters: one per knowledge store.
//!
//! Every adapter exposes the same read-only capability: given query text and
//! a result budget, return evidence ordered by source-local relevance, or a
//! typed [`SourceError`]. Adapters never retry; retry policy belongs to the
//! coordinator's circuit breaker.
//!
//! # Adapters
//!
//! - [`SqliteAdapter`]: keyword search over an FTS5 table, opened read-only.
//! - [`VectorAdapter`]: embeds the query and searches a [`VectorIndex`].

pub mod calibration;
pub mod sqlite;
pub mod vector;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::{EvidenceItem, QueryFilters, SourceFamily, SourceId};
use crate::error::{ConfigError, SourceError};

pub use calibration::Calibration;
pub use sqlite::SqliteAdapter;
pub use vector::{Embedder, InMemoryIndex, VectorAdapter, VectorHit, VectorIndex};

/// One adapter call.
#[derive(Debug, Clone)]
pub struct SourceRequest {
    /// Query text (possibly a swarm sub-query).
    pub text: String,
    /// Structured filters.
    pub filters: QueryFilters,
    /// Maximum items to return. Fewer is success.
    pub max_results: usize,
    /// Time budget for this call, for adapters that can pass it downstream.
    pub timeout: Duration,
    /// Fires when the plan deadline passes or the query is abandoned.
    pub cancel: CancellationToken,
}

/// Uniform read-only retrieval capability over one knowledge store.
///
/// Implementations must never issue a mutating call to the underlying store
/// and must not retry internally.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier of this source.
    fn id(&self) -> &SourceId;

    /// Family of store this source belongs to.
    fn family(&self) -> SourceFamily;

    /// Mapping from this source's local scores to the shared scale.
    fn calibration(&self) -> Calibration {
        Calibration::Identity
    }

    /// Retrieves up to `request.max_results` items, best first.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] on network failures,
    /// [`SourceError::Invalid`] for queries the store cannot run, and
    /// [`SourceError::Degraded`] when a sub-operation failed.
    async fn retrieve(&self, request: &SourceRequest) -> Result<Vec<EvidenceItem>, SourceError>;
}

/// Registered sources, in registration order.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SourceSpec`] if the id is already registered.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> Result<(), ConfigError> {
        if self.get(adapter.id()).is_some() {
            return Err(ConfigError::SourceSpec {
                spec: adapter.id().to_string(),
                reason: "source id registered twice".to_string(),
            });
        }
        self.sources.push(adapter);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SourceSpec`] if the id is already registered.
    pub fn with(mut self, adapter: Arc<dyn SourceAdapter>) -> Result<Self, ConfigError> {
        self.register(adapter)?;
        Ok(self)
    }

    /// Looks up a source by id.
    #[must_use]
    pub fn get(&self, id: &SourceId) -> Option<&Arc<dyn SourceAdapter>> {
        self.sources.iter().find(|s| s.id() == id)
    }

    /// All sources in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SourceAdapter>> {
        self.sources.iter()
    }

    /// Sources belonging to a family.
    pub fn by_family(&self, family: SourceFamily) -> impl Iterator<Item = &Arc<dyn SourceAdapter>> {
        self.sources.iter().filter(move |s| s.family() == family)
    }

    /// Families with at least one registered source, in priority order.
    #[must_use]
    pub fn families(&self) -> Vec<SourceFamily> {
        SourceFamily::ALL
            .into_iter()
            .filter(|f| self.by_family(*f).next().is_some())
            .collect()
    }

    /// Number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no sources are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.sources.iter().map(|s| (s.id().to_string(), s.family())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        id: SourceId,
        family: SourceFamily,
    }

    #[async_trait]
    impl SourceAdapter for Fixed {
        fn id(&self) -> &SourceId {
            &self.id
        }

        fn family(&self) -> SourceFamily {
            self.family
        }

        async fn retrieve(&self, _request: &SourceRequest) -> Result<Vec<EvidenceItem>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn fixed(id: &str, family: SourceFamily) -> Arc<dyn SourceAdapter> {
        Arc::new(Fixed {
            id: SourceId::new(id),
            family,
        })
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = SourceRegistry::new();
        assert!(registry.register(fixed("kb", SourceFamily::KnowledgeBase)).is_ok());
        assert!(registry.register(fixed("kb", SourceFamily::Tickets)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_families_in_priority_order() {
        let registry = SourceRegistry::new()
            .with(fixed("code", SourceFamily::Code))
            .and_then(|r| r.with(fixed("jira", SourceFamily::Tickets)))
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(
            registry.families(),
            vec![SourceFamily::Tickets, SourceFamily::Code]
        );
        assert_eq!(registry.by_family(SourceFamily::Code).count(), 1);
    }
}
