//! Hand-off detection.
//!
//! An agent's evidence may name an identifier that another family owns: a
//! ticket key, a commit hash or a source path. Each such identifier becomes a
//! refined sub-query for that family's agent.

use std::collections::HashSet;

use crate::core::{EvidenceItem, SourceFamily, SourceId};
use crate::retrieval::intent::{FILE_PATH_RE, HEX_RUN_RE, TICKET_KEY_RE, is_commit_hash};

/// A hand-off proposed by one agent's evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffCandidate {
    /// Receiving family.
    pub to: SourceFamily,
    /// Refined sub-query (the identifier found).
    pub sub_query: String,
    /// Source of the triggering item.
    pub trigger_source: SourceId,
    /// External id of the triggering item.
    pub trigger_id: String,
}

fn identifiers(text: &str) -> Vec<(SourceFamily, &str)> {
    let mut found: Vec<(usize, SourceFamily, &str)> = TICKET_KEY_RE
        .find_iter(text)
        .map(|m| (m.start(), SourceFamily::Tickets, m.as_str()))
        .chain(
            HEX_RUN_RE
                .find_iter(text)
                .filter(|m| is_commit_hash(m.as_str()))
                .map(|m| (m.start(), SourceFamily::Commits, m.as_str())),
        )
        .chain(FILE_PATH_RE.find_iter(text).map(|m| (m.start(), SourceFamily::Code, m.as_str())))
        .collect();
    found.sort_by_key(|(start, _, _)| *start);
    found.into_iter().map(|(_, family, id)| (family, id)).collect()
}

/// Hand-offs triggered by `items`, in item order then text order.
///
/// Never targets `from`, never repeats a `(target, sub-query)` pair and
/// stops after `max` candidates.
#[must_use]
pub fn detect<'a>(from: SourceFamily, items: impl IntoIterator<Item = &'a EvidenceItem>, max: usize) -> Vec<HandoffCandidate> {
    let mut seen: HashSet<(SourceFamily, String)> = HashSet::new();
    let mut candidates = Vec::new();
    for item in items {
        for (to, identifier) in identifiers(&item.text()) {
            if candidates.len() >= max {
                return candidates;
            }
            if to == from || item.external_id == identifier || !seen.insert((to, identifier.to_string())) {
                continue;
            }
            candidates.push(HandoffCandidate {
                to,
                sub_query: identifier.to_string(),
                trigger_source: item.source.clone(),
                trigger_id: item.external_id.clone(),
            });
        }
    }
    candidates
}
