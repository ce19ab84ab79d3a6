//! Citation parsing and grounding.
//!
//! The synthesizer cites evidence as `[E1]` or `[E1, E3]`. Labels that do
//! not resolve to an item of the evidence set are stripped from the text so
//! an answer can never cite something it was not given.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::{Citation, RankedEvidenceSet};
use crate::llm::prompt::evidence_label;
use crate::text::static_regex;

static CITATION_GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| static_regex(r"\s*\[\s*(E\d+(?:\s*[,;]\s*E\d+)*)\s*\]"));

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| static_regex(r"E(\d+)"));

static SPACE_BEFORE_PUNCT_RE: LazyLock<Regex> = LazyLock::new(|| static_regex(r"[ \t]+([.,;:!?])"));

/// Result of checking an answer's citations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationCheck {
    /// Answer text with unresolvable labels removed.
    pub text: String,
    /// Resolved citations in order of first appearance.
    pub citations: Vec<Citation>,
    /// Labels that did not resolve, in order of appearance.
    pub invalid: Vec<String>,
}

/// Zero-based evidence rank for a label like `E3`.
fn rank_of(label: &str, evidence_len: usize) -> Option<usize> {
    let n: usize = label.strip_prefix('E')?.parse().ok()?;
    (1..=evidence_len).contains(&n).then(|| n - 1)
}

/// Evidence ranks cited anywhere in `text` that resolve against a set of
/// `evidence_len` items.
#[must_use]
pub fn cited_ranks(text: &str, evidence_len: usize) -> Vec<usize> {
    let mut ranks: Vec<usize> = CITATION_GROUP_RE
        .captures_iter(text)
        .flat_map(|caps| {
            LABEL_RE
                .find_iter(caps.get(1).map_or("", |m| m.as_str()))
                .filter_map(|m| rank_of(m.as_str(), evidence_len))
                .collect::<Vec<_>>()
        })
        .collect();
    ranks.dedup();
    ranks
}

/// Removes every citation marker from `text`.
#[must_use]
pub fn strip_markers(text: &str) -> String {
    CITATION_GROUP_RE.replace_all(text, "").into_owned()
}

/// Resolves citations against `evidence`, dropping unknown labels.
#[must_use]
pub fn check(text: &str, evidence: &RankedEvidenceSet) -> CitationCheck {
    let mut citations: Vec<Citation> = Vec::new();
    let mut invalid: Vec<String> = Vec::new();

    let rewritten = CITATION_GROUP_RE.replace_all(text, |caps: &Captures<'_>| {
        let mut kept: Vec<String> = Vec::new();
        for label in LABEL_RE.find_iter(caps.get(1).map_or("", |m| m.as_str())) {
            let label = label.as_str();
            match rank_of(label, evidence.len()).and_then(|rank| evidence.get(rank).map(|e| (rank, e))) {
                Some((rank, scored)) => {
                    let canonical = evidence_label(rank);
                    if !citations.iter().any(|c| c.label == canonical) {
                        citations.push(Citation {
                            label: canonical.clone(),
                            source: scored.item.source.clone(),
                            external_id: scored.item.external_id.clone(),
                        });
                    }
                    if !kept.contains(&canonical) {
                        kept.push(canonical);
                    }
                }
                None => invalid.push(label.to_string()),
            }
        }
        if kept.is_empty() {
            String::new()
        } else {
            format!(" [{}]", kept.join(", "))
        }
    });

    let text = SPACE_BEFORE_PUNCT_RE.replace_all(&rewritten, "$1").trim().to_string();
    CitationCheck {
        text,
        citations,
        invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EvidenceItem, ScoredEvidence, SourceId};
    use std::sync::Arc;

    fn evidence(n: usize) -> RankedEvidenceSet {
        RankedEvidenceSet::from_ordered(
            (0..n)
                .map(|i| ScoredEvidence {
                    item: Arc::new(EvidenceItem::new(SourceId::new("kb"), format!("KB-{i}"), "t", "b", 0.5)),
                    normalized_score: 0.5,
                    source_priority: 0,
                })
                .collect(),
        )
    }

    #[test]
    fn test_valid_citations_resolve() {
        let result = check("Sessions restart nightly [E1]. Logs rotate [E2, E1].", &evidence(2));
        assert!(result.invalid.is_empty());
        assert_eq!(result.citations.len(), 2);
        assert_eq!(result.citations[0].external_id, "KB-0");
        assert_eq!(result.text, "Sessions restart nightly [E1]. Logs rotate [E2, E1].");
    }

    #[test]
    fn test_invalid_labels_are_stripped() {
        let result = check("Sessions restart nightly [E7]. Logs rotate [E1; E9].", &evidence(2));
        assert_eq!(result.invalid, vec!["E7".to_string(), "E9".to_string()]);
        assert_eq!(result.text, "Sessions restart nightly. Logs rotate [E1].");
        assert_eq!(result.citations.len(), 1);
    }

    #[test]
    fn test_zero_label_is_invalid() {
        let result = check("Claim [E0].", &evidence(1));
        assert_eq!(result.invalid, vec!["E0".to_string()]);
        assert!(result.citations.is_empty());
    }

    #[test]
    fn test_cited_ranks_and_strip() {
        assert_eq!(cited_ranks("a [E2] b [E1, E5]", 3), vec![1, 0]);
        assert_eq!(strip_markers("Restarts nightly [E1]."), "Restarts nightly.");
    }
}
