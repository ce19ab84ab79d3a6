//! Regex-based query intent detection.
//!
//! Scores each source family with deterministic pattern hits: identifier
//! shapes (ticket keys, commit hashes, file paths) score higher than
//! vocabulary hits. Intent only reorders source priority; it never removes
//! a source from a plan.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::SourceFamily;
use crate::text::static_regex;

/// Minimum score for a family to count as matched.
const MATCH_THRESHOLD: f32 = 10.0;

// --- Identifier shapes (also used by swarm hand-off detection) ---

pub(crate) static TICKET_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| static_regex(r"\b[A-Z][A-Z0-9]{1,9}-[0-9]{1,7}\b"));

pub(crate) static HEX_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| static_regex(r"\b[0-9a-f]{7,40}\b"));

pub(crate) static FILE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(
        r"\b(?:[\w.-]+/)*[\w-]+\.(?:rs|py|ts|tsx|js|jsx|go|java|kt|c|cc|cpp|h|hpp|rb|cs|swift|sql|toml|ya?ml)\b",
    )
});

// --- Vocabulary ---

static TICKET_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(
        r"(?i)\b(tickets?|issues?|bugs?|jira|incidents?|regressions?|reported|customers?|escalat\w*|outages?)\b",
    )
});

static COMMIT_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(
        r"(?i)\b(commits?|committed|merged?|pull\s+requests?|changelog|revert(ed)?|introduced|blame|diff)\b",
    )
});

static CODE_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(
        r"(?i)\b(functions?|methods?|class(es)?|structs?|modules?|implementation|source\s+code|stack\s*trace|exceptions?|endpoints?)\b",
    )
});

static CODE_IDENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(r"\b[a-z][a-z0-9]*(?:_[a-z0-9]+)+\b|\b[a-z]+[A-Z]\w*\b|\w+::\w+|\b\w+\(\)")
});

static KB_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(
        r"(?i)\b(what\s+(does|is)|means?|stands?\s+for|definitions?|define|how\s+(do|to|can)|guides?|documentation|docs|configure|setup|overview)\b",
    )
});

/// Whether a hex run looks like a commit hash rather than a word or number.
pub(crate) fn is_commit_hash(candidate: &str) -> bool {
    candidate.bytes().any(|b| b.is_ascii_digit()) && candidate.bytes().any(|b| b.is_ascii_alphabetic())
}

fn score_tickets(query: &str) -> f32 {
    let mut score = 0.0;
    if TICKET_KEY_RE.is_match(query) {
        score += 15.0;
    }
    if TICKET_WORD_RE.is_match(query) {
        score += 10.0;
    }
    score
}

fn score_commits(query: &str) -> f32 {
    let mut score = 0.0;
    if HEX_RUN_RE
        .find_iter(query)
        .any(|m| is_commit_hash(m.as_str()))
    {
        score += 15.0;
    }
    if COMMIT_WORD_RE.is_match(query) {
        score += 10.0;
    }
    score
}

fn score_code(query: &str) -> f32 {
    let mut score = 0.0;
    if FILE_PATH_RE.is_match(query) {
        score += 15.0;
    }
    if CODE_IDENT_RE.is_match(query) {
        score += 12.0;
    }
    if CODE_WORD_RE.is_match(query) {
        score += 10.0;
    }
    score
}

fn score_knowledge_base(query: &str) -> f32 {
    if KB_WORD_RE.is_match(query) { 10.0 } else { 0.0 }
}

/// Per-family intent scores for a query.
#[must_use]
pub fn score(query: &str) -> [(SourceFamily, f32); 4] {
    [
        (SourceFamily::KnowledgeBase, score_knowledge_base(query)),
        (SourceFamily::Tickets, score_tickets(query)),
        (SourceFamily::Commits, score_commits(query)),
        (SourceFamily::Code, score_code(query)),
    ]
}

/// Families the query appears to target, strongest first.
///
/// Ties keep default family priority. Empty when nothing matched.
#[must_use]
pub fn detect(query: &str) -> Vec<SourceFamily> {
    let mut matched: Vec<(SourceFamily, f32)> = score(query)
        .into_iter()
        .filter(|(_, s)| *s >= MATCH_THRESHOLD)
        .collect();
    matched.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    matched.into_iter().map(|(family, _)| family).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("what does USM mean", &[SourceFamily::KnowledgeBase] ; "definition")]
    #[test_case("PROJ-1234 login fails", &[SourceFamily::Tickets] ; "ticket key")]
    #[test_case("which commit introduced 3f9a2c1e", &[SourceFamily::Commits] ; "commit hash")]
    #[test_case("panic in src/session/manager.rs", &[SourceFamily::Code] ; "file path")]
    #[test_case("session restart", &[] ; "no intent")]
    fn test_detect(query: &str, expected: &[SourceFamily]) {
        assert_eq!(detect(query), expected);
    }

    #[test]
    fn test_detect_orders_by_strength() {
        // Ticket key + vocabulary (25) beats commit vocabulary (10).
        let families = detect("bug PROJ-9 was merged last week");
        assert_eq!(families, vec![SourceFamily::Tickets, SourceFamily::Commits]);
    }

    #[test_case("3f9a2c1", true ; "mixed")]
    #[test_case("1234567", false ; "digits only")]
    #[test_case("deadbeef", false ; "letters only")]
    fn test_is_commit_hash(candidate: &str, expected: bool) {
        assert_eq!(is_commit_hash(candidate), expected);
    }

    #[test]
    fn test_ticket_key_requires_uppercase() {
        assert!(TICKET_KEY_RE.is_match("see ABC-12"));
        assert!(!TICKET_KEY_RE.is_match("utf-8 text"));
    }
}
