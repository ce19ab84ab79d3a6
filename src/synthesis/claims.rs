//! Atomic claim extraction from answer text.

use std::collections::BTreeSet;

use unicode_segmentation::UnicodeSegmentation;

use super::citation;
use crate::text::content_tokens;

/// One sentence-level assertion from a draft answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// Sentence exactly as it appears in the answer, citations included.
    pub raw: String,
    /// Sentence with citation markers removed.
    pub text: String,
    /// Zero-based evidence ranks the sentence cites.
    pub cited: Vec<usize>,
    /// Content tokens of `text`.
    pub tokens: BTreeSet<String>,
}

/// Splits `answer` into claims, skipping sentences with fewer than
/// `min_tokens` content tokens.
///
/// Questions are skipped as well: they assert nothing.
#[must_use]
pub fn extract(answer: &str, min_tokens: usize, evidence_len: usize) -> Vec<Claim> {
    answer
        .split_sentence_bounds()
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .filter_map(|raw| {
            let text = citation::strip_markers(raw).trim().to_string();
            if text.ends_with('?') {
                return None;
            }
            let tokens = content_tokens(&text);
            (tokens.len() >= min_tokens).then(|| Claim {
                raw: raw.to_string(),
                cited: citation::cited_ranks(raw, evidence_len),
                text,
                tokens,
            })
        })
        .collect()
}
