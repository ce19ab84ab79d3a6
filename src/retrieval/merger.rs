//! Cross-source merging and ranking.
//!
//! Each batch's local scores pass through the source's calibration onto the
//! shared `[0, 1]` scale. Items are then ordered by normalized score
//! descending, source priority ascending, recency descending (items without a
//! timestamp last) and finally original position, so the output is fully
//! deterministic for identical inputs. Duplicates are dropped in rank order,
//! which keeps the higher-scored copy. Truncation to the total cap happens
//! only after merging.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::core::{EvidenceItem, RankedEvidenceSet, ScoredEvidence, SourceId};
use crate::source::Calibration;
use crate::text::{content_tokens, jaccard};

/// Default cross-source near-duplicate threshold.
const DEFAULT_DEDUP_THRESHOLD: f64 = 0.9;

/// Merger tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeConfig {
    /// Token Jaccard similarity at or above which items from different
    /// sources are duplicates.
    pub dedup_threshold: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: DEFAULT_DEDUP_THRESHOLD,
        }
    }
}

/// One source's items, ready for merging.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    /// Producing source.
    pub source: SourceId,
    /// Source priority (0 = highest).
    pub priority: usize,
    /// The source's calibration.
    pub calibration: Calibration,
    /// Items in source-local order.
    pub items: Vec<EvidenceItem>,
}

struct Candidate {
    scored: ScoredEvidence,
    ordinal: usize,
    tokens: BTreeSet<String>,
}

/// Merges batches into one ranked set of at most `total_cap` items.
#[must_use]
pub fn merge<'a>(
    batches: impl IntoIterator<Item = &'a SourceBatch>,
    total_cap: usize,
    config: &MergeConfig,
) -> RankedEvidenceSet {
    let mut candidates: Vec<Candidate> = batches
        .into_iter()
        .flat_map(|batch| batch.items.iter().map(move |item| (batch, item)))
        .enumerate()
        .map(|(ordinal, (batch, item))| Candidate {
            scored: ScoredEvidence {
                normalized_score: batch.calibration.apply(item.score),
                source_priority: batch.priority,
                item: Arc::new(item.clone()),
            },
            ordinal,
            tokens: content_tokens(&item.text()),
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.scored
            .normalized_score
            .total_cmp(&a.scored.normalized_score)
            .then(a.scored.source_priority.cmp(&b.scored.source_priority))
            .then(b.scored.item.updated_at.cmp(&a.scored.item.updated_at))
            .then(a.ordinal.cmp(&b.ordinal))
    });

    let mut seen: HashSet<(SourceId, String)> = HashSet::new();
    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= total_cap {
            break;
        }
        let item = &candidate.scored.item;
        if !seen.insert((item.source.clone(), item.external_id.clone())) {
            continue;
        }
        let near_duplicate = kept.iter().any(|k| {
            k.scored.item.source != item.source
                && jaccard(&k.tokens, &candidate.tokens) >= config.dedup_threshold
        });
        if near_duplicate {
            continue;
        }
        kept.push(candidate);
    }

    RankedEvidenceSet::from_ordered(kept.into_iter().map(|c| c.scored).collect())
}
