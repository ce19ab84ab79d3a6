//! Vector-searchable sources.
//!
//! A [`VectorAdapter`] turns query text into the store's embedding space via
//! an [`Embedder`], then searches a [`VectorIndex`]. Both are external
//! collaborators; [`InMemoryIndex`] serves local snapshots and tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{Calibration, SourceAdapter, SourceRequest};
use crate::core::{EvidenceItem, QueryFilters, SourceFamily, SourceId};
use crate::error::SourceError;

/// Text → vector capability.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embedding dimensionality.
    fn dimensions(&self) -> usize;

    /// Embeds one text.
    ///
    /// # Errors
    ///
    /// Returns an error message when the embedding service fails.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String>;
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    /// Stable identifier within the store.
    pub external_id: String,
    /// Display title.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Cosine distance (`0.0` = identical).
    pub distance: f32,
    /// Last update as unix seconds.
    pub updated_at: Option<i64>,
    /// Store-specific metadata.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Read-only nearest-neighbour search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns up to `limit` hits closest to `vector`, nearest first.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] classified by the index implementation.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<VectorHit>, SourceError>;
}

/// Source adapter over an embedder and a vector index.
pub struct VectorAdapter {
    id: SourceId,
    family: SourceFamily,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    calibration: Calibration,
}

impl VectorAdapter {
    /// Creates an adapter; scores are calibrated from cosine distance.
    pub fn new(
        id: SourceId,
        family: SourceFamily,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            id,
            family,
            embedder,
            index,
            calibration: Calibration::Identity,
        }
    }

    /// Overrides the calibration applied by the merger.
    #[must_use]
    pub const fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }
}

#[async_trait]
impl SourceAdapter for VectorAdapter {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn family(&self) -> SourceFamily {
        self.family
    }

    fn calibration(&self) -> Calibration {
        self.calibration
    }

    async fn retrieve(&self, request: &SourceRequest) -> Result<Vec<EvidenceItem>, SourceError> {
        let vector = self.embedder.embed(&request.text).await.map_err(|e| {
            warn!(source = %self.id, error = %e, "query embedding failed");
            SourceError::degraded(format!("embedding failed: {e}"))
        })?;
        if vector.len() != self.embedder.dimensions() {
            return Err(SourceError::degraded(format!(
                "embedding has {} dimensions, expected {}",
                vector.len(),
                self.embedder.dimensions()
            )));
        }

        let hits = self
            .index
            .search(&vector, request.max_results, &request.filters)
            .await?;

        Ok(hits
            .into_iter()
            .take(request.max_results)
            .map(|hit| EvidenceItem {
                source: self.id.clone(),
                external_id: hit.external_id,
                title: hit.title,
                body: hit.body,
                score: Calibration::CosineDistance.apply(f64::from(hit.distance)),
                updated_at: hit.updated_at,
                metadata: hit.metadata,
            })
            .collect())
    }
}

impl std::fmt::Debug for VectorAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorAdapter")
            .field("id", &self.id)
            .field("family", &self.family)
            .field("calibration", &self.calibration)
            .finish_non_exhaustive()
    }
}

/// Entry stored in an [`InMemoryIndex`].
#[derive(Debug, Clone)]
struct IndexEntry {
    vector: Vec<f32>,
    hit: VectorHit,
    project: Option<String>,
}

/// Brute-force cosine index held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIndex {
    entries: Vec<IndexEntry>,
}

impl InMemoryIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document.
    pub fn insert(
        &mut self,
        external_id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        vector: Vec<f32>,
    ) {
        self.entries.push(IndexEntry {
            vector,
            hit: VectorHit {
                external_id: external_id.into(),
                title: title.into(),
                body: body.into(),
                distance: 0.0,
                updated_at: None,
                metadata: BTreeMap::new(),
            },
            project: None,
        });
    }

    /// Tags the most recently inserted document with a project and timestamp.
    pub fn tag_last(&mut self, project: Option<&str>, updated_at: Option<i64>) {
        if let Some(entry) = self.entries.last_mut() {
            entry.project = project.map(str::to_string);
            entry.hit.updated_at = updated_at;
        }
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn matches(entry: &IndexEntry, filters: &QueryFilters) -> bool {
        if let Some(project) = &filters.project
            && entry.project.as_deref() != Some(project.as_str())
        {
            return false;
        }
        let ts = entry.hit.updated_at;
        if filters.since.is_some_and(|s| ts.is_none_or(|t| t < s)) {
            return false;
        }
        if filters.until.is_some_and(|u| ts.is_none_or(|t| t > u)) {
            return false;
        }
        true
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<VectorHit>, SourceError> {
        let mut scored: Vec<VectorHit> = self
            .entries
            .iter()
            .filter(|e| e.vector.len() == vector.len() && Self::matches(e, filters))
            .map(|e| {
                let mut hit = e.hit.clone();
                hit.distance = cosine_distance(&e.vector, vector);
                hit
            })
            .collect();
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(limit);
        Ok(scored)
    }
}

/// Cosine distance in `[0, 2]`; zero vectors are maximally distant.
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 2.0;
    }
    (1.0 - dot / (na * nb)).clamp(0.0, 2.0)
}
