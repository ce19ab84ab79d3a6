//! Evidence items and ranked evidence sets.
//!
//! An [`EvidenceItem`] is produced by exactly one source adapter call and is
//! never mutated afterwards. The merger wraps items in [`ScoredEvidence`] to
//! attach a cross-source score without touching the item itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of a registered source (e.g. `"tickets"`, `"kb-docs"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(Arc<str>);

impl SourceId {
    /// Creates a source identifier.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Family of knowledge store a source belongs to.
///
/// Swarm agents are scoped to one family each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFamily {
    /// Product knowledge base articles.
    KnowledgeBase,
    /// Issue-tracker tickets.
    Tickets,
    /// Source-commit history.
    Commits,
    /// Source-code snapshots.
    Code,
}

impl SourceFamily {
    /// All families in default priority order.
    pub const ALL: [Self; 4] = [Self::KnowledgeBase, Self::Tickets, Self::Commits, Self::Code];

    /// Parses a family name, accepting a few common aliases.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "kb" | "knowledge_base" | "knowledge-base" | "docs" => Some(Self::KnowledgeBase),
            "tickets" | "ticket" | "issues" | "jira" => Some(Self::Tickets),
            "commits" | "commit" | "git" => Some(Self::Commits),
            "code" | "source" | "src" => Some(Self::Code),
            _ => None,
        }
    }

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::KnowledgeBase => "knowledge_base",
            Self::Tickets => "tickets",
            Self::Commits => "commits",
            Self::Code => "code",
        }
    }
}

impl std::fmt::Display for SourceFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retrieved unit: a document, ticket, commit or code excerpt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Source that produced this item.
    pub source: SourceId,
    /// Stable identifier within that source (ticket key, commit hash, path).
    pub external_id: String,
    /// Display title or summary line.
    pub title: String,
    /// Full or truncated body.
    pub body: String,
    /// Source-local relevance in `[0, 1]`.
    pub score: f64,
    /// Last update as unix seconds, when the source knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Source-specific metadata, carried opaquely.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl EvidenceItem {
    /// Creates an item with no timestamp or metadata.
    pub fn new(
        source: SourceId,
        external_id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        score: f64,
    ) -> Self {
        Self {
            source,
            external_id: external_id.into(),
            title: title.into(),
            body: body.into(),
            score,
            updated_at: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Sets the last-updated timestamp.
    #[must_use]
    pub const fn with_updated_at(mut self, ts: i64) -> Self {
        self.updated_at = Some(ts);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Title and body joined, for text matching.
    #[must_use]
    pub fn text(&self) -> String {
        format!("{}\n{}", self.title, self.body)
    }
}

/// An evidence item with its cross-source normalized score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEvidence {
    /// The untouched item.
    pub item: Arc<EvidenceItem>,
    /// Score on the shared `[0, 1]` scale.
    pub normalized_score: f64,
    /// Priority rank of the item's source in the plan (0 = highest).
    pub source_priority: usize,
}

/// Ordered evidence: highest normalized score first.
///
/// The ordering is the contract synthesis depends on. Only the merger
/// constructs non-empty sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankedEvidenceSet {
    items: Vec<ScoredEvidence>,
}

impl RankedEvidenceSet {
    /// Wraps an already-ordered list.
    pub(crate) const fn from_ordered(items: Vec<ScoredEvidence>) -> Self {
        Self { items }
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates in rank order.
    pub fn iter(&self) -> std::slice::Iter<'_, ScoredEvidence> {
        self.items.iter()
    }

    /// Item at the given rank.
    #[must_use]
    pub fn get(&self, rank: usize) -> Option<&ScoredEvidence> {
        self.items.get(rank)
    }

    /// Whether an item with this source and external id is present.
    #[must_use]
    pub fn contains(&self, source: &SourceId, external_id: &str) -> bool {
        self.items
            .iter()
            .any(|e| &e.item.source == source && e.item.external_id == external_id)
    }

    /// `(source, external_id)` pairs in rank order.
    #[must_use]
    pub fn keys(&self) -> Vec<(SourceId, String)> {
        self.items
            .iter()
            .map(|e| (e.item.source.clone(), e.item.external_id.clone()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a RankedEvidenceSet {
    type Item = &'a ScoredEvidence;
    type IntoIter = std::slice::Iter<'a, ScoredEvidence>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
