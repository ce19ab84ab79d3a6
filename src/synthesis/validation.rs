//! Claim validation against the evidence set.
//!
//! Support is lexical: the share of a claim's content tokens that appear in
//! an evidence item. Two contradiction heuristics run on top of it. A claim
//! that expands an acronym differently from the evidence is contradicted, and
//! so is a well-supported claim whose negation polarity differs from its
//! best-matching evidence sentence.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use super::claims::Claim;
use crate::core::{ClaimReason, FlaggedClaim, RankedEvidenceSet, Severity};
use crate::text::{content_tokens, static_regex};

/// `USM stands for Unified Session Manager`, `USM: Unified Session Manager`.
static ACRONYM_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(
        r"\b([A-Z][A-Z0-9]{1,9})\b\s*(?:stands\s+for|is\s+short\s+for|refers\s+to|means|is|:|=)\s*(?:the\s+|an?\s+)?([A-Z][\w-]*(?:\s+(?:of|for|and|the|to|[A-Z][\w-]*))*)",
    )
});

/// `Unified Session Manager (USM)`.
static ACRONYM_LAST_RE: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(r"((?:[A-Z][\w-]*\s+(?:(?:of|for|and|the|to)\s+)?){1,8})\(([A-Z][A-Z0-9]{1,9})\)")
});

static NEGATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(
        r"(?i)\b(?:not|no|never|none|cannot|can't|doesn't|don't|isn't|aren't|wasn't|weren't|won't|without)\b",
    )
});

const CONNECTORS: &[&str] = &["of", "for", "and", "the", "to"];

/// Validation thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationConfig {
    /// Support at or above which a claim counts as supported.
    pub support_threshold: f64,
    /// Support at or above which an unsupported claim is only low-confidence.
    pub weak_support_threshold: f64,
    /// Sentences with fewer content tokens are not treated as claims.
    pub min_claim_tokens: usize,
    /// Remove contradicted claims from the answer text.
    pub redact_contradicted: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            support_threshold: 0.5,
            weak_support_threshold: 0.25,
            min_claim_tokens: 3,
            redact_contradicted: true,
        }
    }
}

impl ValidationConfig {
    /// Sets the support threshold.
    #[must_use]
    pub const fn with_support_threshold(mut self, threshold: f64) -> Self {
        self.support_threshold = threshold;
        self
    }

    /// Sets the weak-support threshold.
    #[must_use]
    pub const fn with_weak_support_threshold(mut self, threshold: f64) -> Self {
        self.weak_support_threshold = threshold;
        self
    }

    /// Sets the minimum claim size.
    #[must_use]
    pub const fn with_min_claim_tokens(mut self, tokens: usize) -> Self {
        self.min_claim_tokens = tokens;
        self
    }

    /// Enables or disables redaction of contradicted claims.
    #[must_use]
    pub const fn with_redact_contradicted(mut self, redact: bool) -> Self {
        self.redact_contradicted = redact;
        self
    }
}

/// Outcome of checking one claim.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimAssessment {
    /// The claim.
    pub claim: Claim,
    /// Best support over all evidence items.
    pub support: f64,
    /// Rank of the best-supporting item, if any token overlapped.
    pub best_rank: Option<usize>,
    /// Set when the claim was flagged.
    pub flag: Option<FlaggedClaim>,
}

impl ClaimAssessment {
    /// Whether the claim counts as supported.
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        self.flag.is_none()
    }

    /// Whether the claim contradicts the evidence.
    #[must_use]
    pub fn is_contradicted(&self) -> bool {
        self.flag
            .as_ref()
            .is_some_and(|f| f.reason == ClaimReason::Contradicted)
    }
}

/// Validation result for a whole answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Per-claim assessments in answer order.
    pub assessments: Vec<ClaimAssessment>,
    /// Ranks of evidence items that supported at least one claim.
    pub supporting_ranks: BTreeSet<usize>,
}

impl ValidationReport {
    /// Number of supported claims.
    #[must_use]
    pub fn supported(&self) -> usize {
        self.assessments.iter().filter(|a| a.is_supported()).count()
    }

    /// Flags in answer order.
    #[must_use]
    pub fn flags(&self) -> Vec<FlaggedClaim> {
        self.assessments.iter().filter_map(|a| a.flag.clone()).collect()
    }

    /// Claims that contradict the evidence.
    pub fn contradicted(&self) -> impl Iterator<Item = &Claim> {
        self.assessments
            .iter()
            .filter(|a| a.is_contradicted())
            .map(|a| &a.claim)
    }
}

struct EvidenceProfile {
    tokens: BTreeSet<String>,
    sentences: Vec<(String, BTreeSet<String>)>,
}

/// Checks claims against the evidence set.
#[derive(Debug, Clone)]
pub struct Validator<'a> {
    evidence: &'a RankedEvidenceSet,
    config: ValidationConfig,
}

impl<'a> Validator<'a> {
    /// Creates a validator over `evidence`.
    #[must_use]
    pub const fn new(evidence: &'a RankedEvidenceSet, config: ValidationConfig) -> Self {
        Self { evidence, config }
    }

    /// Assesses every claim.
    #[must_use]
    pub fn validate(&self, claims: Vec<Claim>) -> ValidationReport {
        let profiles: Vec<EvidenceProfile> = self
            .evidence
            .iter()
            .map(|scored| {
                let text = scored.item.text();
                EvidenceProfile {
                    tokens: content_tokens(&text),
                    sentences: text
                        .split_sentence_bounds()
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|s| (s.to_string(), content_tokens(s)))
                        .collect(),
                }
            })
            .collect();
        let definitions = acronym_definitions(profiles.iter().flat_map(|p| p.sentences.iter().map(|(s, _)| s.as_str())));

        let mut report = ValidationReport::default();
        for claim in claims {
            let assessment = self.assess(claim, &profiles, &definitions);
            if assessment.is_supported() {
                report.supporting_ranks.extend(self.supporting_ranks(&assessment, &profiles));
            }
            report.assessments.push(assessment);
        }
        report
    }

    fn assess(
        &self,
        claim: Claim,
        profiles: &[EvidenceProfile],
        definitions: &BTreeMap<String, BTreeSet<String>>,
    ) -> ClaimAssessment {
        let (best_rank, support) = profiles
            .iter()
            .enumerate()
            .map(|(rank, p)| (rank, overlap(&claim.tokens, &p.tokens)))
            .filter(|(_, support)| *support > 0.0)
            .fold((None, 0.0_f64), |best, (rank, support)| {
                if support > best.1 { (Some(rank), support) } else { best }
            });

        let flag = if let Some(detail) = acronym_conflict(&claim.text, definitions) {
            Some((ClaimReason::Contradicted, Severity::High, detail))
        } else if support >= self.config.support_threshold
            && let Some(detail) = negation_conflict(&claim, profiles)
        {
            Some((ClaimReason::Contradicted, Severity::High, detail))
        } else if support >= self.config.support_threshold {
            None
        } else if support >= self.config.weak_support_threshold {
            Some((
                ClaimReason::LowConfidence,
                Severity::Low,
                format!("only {:.0}% of the claim's terms appear in the evidence", support * 100.0),
            ))
        } else {
            Some((
                ClaimReason::Unsupported,
                Severity::Medium,
                "no evidence item backs this claim".to_string(),
            ))
        };

        ClaimAssessment {
            flag: flag.map(|(reason, severity, detail)| FlaggedClaim {
                claim: claim.text.clone(),
                reason,
                severity,
                support,
                detail,
            }),
            claim,
            support,
            best_rank,
        }
    }

    /// The best item plus any cited item that also clears the threshold.
    fn supporting_ranks(&self, assessment: &ClaimAssessment, profiles: &[EvidenceProfile]) -> Vec<usize> {
        let cited = assessment.claim.cited.iter().copied().filter(|&rank| {
            profiles
                .get(rank)
                .is_some_and(|p| overlap(&assessment.claim.tokens, &p.tokens) >= self.config.support_threshold)
        });
        assessment.best_rank.into_iter().chain(cited).collect()
    }
}

/// Share of `claim` tokens present in `evidence`.
fn overlap(claim: &BTreeSet<String>, evidence: &BTreeSet<String>) -> f64 {
    if claim.is_empty() {
        return 0.0;
    }
    let shared = claim.intersection(evidence).count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = shared as f64 / claim.len() as f64;
    ratio
}

fn expansion_words(expansion: &str) -> Vec<String> {
    let mut words: Vec<String> = expansion
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    while words.last().is_some_and(|w| CONNECTORS.contains(&w.as_str())) {
        words.pop();
    }
    words
}

fn normalize_expansion(expansion: &str) -> String {
    expansion_words(expansion).join(" ")
}

/// Keeps the trailing words of a parenthesised definition, one content word
/// per acronym letter, so leading sentence words are not part of it.
fn trailing_expansion(expansion: &str, acronym: &str) -> String {
    let words = expansion_words(expansion);
    let wanted = acronym.chars().count();
    let mut seen = 0;
    let mut start = words.len();
    while start > 0 && seen < wanted {
        start -= 1;
        if !CONNECTORS.contains(&words[start].as_str()) {
            seen += 1;
        }
    }
    words[start..].join(" ")
}

/// Acronym definitions found in `sentences`, keyed by acronym.
fn acronym_definitions<'s>(sentences: impl Iterator<Item = &'s str>) -> BTreeMap<String, BTreeSet<String>> {
    let mut definitions: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for sentence in sentences {
        for (acronym, expansion) in definitions_in(sentence) {
            definitions.entry(acronym).or_default().insert(expansion);
        }
    }
    definitions
}

fn definitions_in(sentence: &str) -> Vec<(String, String)> {
    let first = ACRONYM_FIRST_RE
        .captures_iter(sentence)
        .filter_map(|caps| Some((caps.get(1)?.as_str().to_string(), normalize_expansion(caps.get(2)?.as_str()))));
    let last = ACRONYM_LAST_RE
        .captures_iter(sentence)
        .filter_map(|caps| {
            let acronym = caps.get(2)?.as_str();
            Some((acronym.to_string(), trailing_expansion(caps.get(1)?.as_str(), acronym)))
        });
    first
        .chain(last)
        .filter(|(_, expansion)| expansion.contains(' '))
        .collect()
}

fn acronym_conflict(claim: &str, evidence: &BTreeMap<String, BTreeSet<String>>) -> Option<String> {
    definitions_in(claim).into_iter().find_map(|(acronym, expansion)| {
        let known = evidence.get(&acronym)?;
        (!known.contains(&expansion)).then(|| {
            let known: Vec<&str> = known.iter().map(String::as_str).collect();
            format!(
                "claim expands {acronym} as \"{expansion}\" but the evidence defines it as \"{}\"",
                known.join("\" or \"")
            )
        })
    })
}

fn negation_conflict(claim: &Claim, profiles: &[EvidenceProfile]) -> Option<String> {
    let (sentence, _) = profiles
        .iter()
        .flat_map(|p| p.sentences.iter())
        .map(|(sentence, tokens)| (sentence, overlap(&claim.tokens, tokens)))
        .fold((None::<&String>, 0.0_f64), |best, (sentence, score)| {
            if score > best.1 { (Some(sentence), score) } else { best }
        });
    let sentence = sentence?;
    let claim_negated = NEGATION_RE.is_match(&claim.text);
    (claim_negated != NEGATION_RE.is_match(sentence)).then(|| {
        if claim_negated {
            "claim negates what the evidence states".to_string()
        } else {
            "evidence negates what the claim states".to_string()
        }
    })
}
