//! Synthesis and validation.
//!
//! The synthesizer asks the completion service for an answer over labelled
//! evidence, then grounds the draft: unknown citation labels are stripped,
//! each sentence is checked against the evidence, contradicted sentences are
//! redacted and a confidence score is computed. When the service is missing
//! or fails, the caller gets [`SynthesisOutcome::Unavailable`] and returns
//! evidence alone.

pub mod agent;
pub mod citation;
pub mod claims;
pub mod confidence;
pub mod validation;

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

pub use agent::SynthesizerAgent;
pub use confidence::{ConfidenceInputs, ConfidenceWeights};
pub use validation::{ClaimAssessment, ValidationConfig, ValidationReport, Validator};

use crate::config::EngineConfig;
use crate::core::{Answer, ClaimReason, FlaggedClaim, RankedEvidenceSet, Severity};
use crate::llm::prompt::build_synthesizer_prompt;
use crate::llm::{Agent, LlmProvider, PromptSet};
use crate::retrieval::SynthesisMode;
use crate::text::static_regex;

static SPACE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| static_regex(r"[ \t]{2,}"));

/// Result of one synthesis attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisOutcome {
    /// A grounded answer.
    Answered(Answer),
    /// Synthesis was not attempted: no evidence, or no completion service
    /// on a strategy where synthesis is optional.
    Skipped,
    /// Synthesis was required or attempted and produced no answer.
    Unavailable {
        /// Redacted reason.
        summary: String,
    },
}

/// Runs the synthesizer agent and grounds its output.
pub struct Synthesizer {
    provider: Option<Arc<dyn LlmProvider>>,
    agent: SynthesizerAgent,
    validation: ValidationConfig,
    weights: ConfidenceWeights,
    timeout: Duration,
}

impl Synthesizer {
    /// Creates a synthesizer; `provider` is `None` without a completion service.
    #[must_use]
    pub fn new(config: &EngineConfig, prompts: &PromptSet, provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self {
            provider,
            agent: SynthesizerAgent::new(config, prompts.synthesizer.clone()),
            validation: config.validation,
            weights: config.confidence,
            timeout: config.synthesis_timeout,
        }
    }

    /// Synthesizes and validates an answer for `query` over `evidence`.
    ///
    /// `unavailable_required` counts required sources that produced nothing
    /// usable; each lowers confidence by the configured penalty.
    pub async fn synthesize(
        &self,
        query: &str,
        evidence: &RankedEvidenceSet,
        mode: SynthesisMode,
        unavailable_required: usize,
    ) -> SynthesisOutcome {
        if evidence.is_empty() {
            debug!("no evidence, skipping synthesis");
            return SynthesisOutcome::Skipped;
        }
        let Some(provider) = self.provider.as_deref() else {
            return match mode {
                SynthesisMode::Optional => SynthesisOutcome::Skipped,
                SynthesisMode::Required => SynthesisOutcome::Unavailable {
                    summary: "no completion service configured".to_string(),
                },
            };
        };

        info!(
            provider = provider.name(),
            model = self.agent.model(),
            evidence = evidence.len(),
            "synthesizing answer"
        );
        let prompt = build_synthesizer_prompt(query, evidence);
        match self.agent.execute_within(provider, &prompt, self.timeout).await {
            Ok(response) => {
                debug!(
                    total_tokens = response.usage.total_tokens,
                    finish_reason = response.finish_reason.as_deref().unwrap_or("unknown"),
                    "draft answer received"
                );
                SynthesisOutcome::Answered(self.ground(&response.content, evidence, unavailable_required))
            }
            Err(e) => {
                warn!(error = %e, "synthesis failed");
                SynthesisOutcome::Unavailable {
                    summary: e.redacted(),
                }
            }
        }
    }

    /// Grounds a draft answer against `evidence`.
    #[must_use]
    pub fn ground(&self, draft: &str, evidence: &RankedEvidenceSet, unavailable_required: usize) -> Answer {
        let checked = citation::check(draft, evidence);
        let mut flagged: Vec<FlaggedClaim> = checked
            .invalid
            .iter()
            .map(|label| FlaggedClaim {
                claim: format!("[{label}]"),
                reason: ClaimReason::Unsupported,
                severity: Severity::Medium,
                support: 0.0,
                detail: format!("cites {label}, which is not in the evidence set; citation removed"),
            })
            .collect();

        let claims = claims::extract(&checked.text, self.validation.min_claim_tokens, evidence.len());
        let report = Validator::new(evidence, self.validation).validate(claims);

        let mut text = checked.text;
        if self.validation.redact_contradicted {
            for claim in report.contradicted() {
                text = text.replacen(&claim.raw, "", 1);
            }
            text = SPACE_RUN_RE.replace_all(&text, " ").trim().to_string();
        }
        let citations = citation::check(&text, evidence).citations;

        let claim_relevance: Vec<Option<f64>> = report
            .assessments
            .iter()
            .map(|a| {
                a.is_supported().then(|| {
                    a.best_rank
                        .and_then(|rank| evidence.get(rank))
                        .map_or(0.0, |e| e.normalized_score)
                })
            })
            .collect();
        let mean_relevance = confidence::mean_claim_relevance(&claim_relevance);

        let inputs = ConfidenceInputs {
            claims_total: report.assessments.len(),
            claims_supported: report.supported(),
            mean_relevance,
            unavailable_required,
        };
        let confidence = confidence::score(&inputs, &self.weights);
        flagged.extend(report.flags());

        debug!(
            claims = inputs.claims_total,
            supported = inputs.claims_supported,
            flagged = flagged.len(),
            confidence,
            "answer validated"
        );

        Answer {
            text,
            evidence: evidence.clone(),
            confidence,
            flagged,
            citations,
            claims_total: inputs.claims_total,
            claims_supported: inputs.claims_supported,
            handoffs: Vec::new(),
        }
    }
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .field("model", &self.agent.model())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EvidenceItem, ScoredEvidence, SourceId};
    use crate::error::AgentError;
    use crate::llm::{ChatRequest, ChatResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        answer: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatResponse {
                content: self.answer.clone(),
                ..ChatResponse::default()
            })
        }
    }

    struct Down;

    #[async_trait]
    impl LlmProvider for Down {
        fn name(&self) -> &'static str {
            "down"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            Err(AgentError::ApiRequest {
                message: "connection refused to https://internal.example:8443 (key sk-123)".to_string(),
                status: None,
            })
        }
    }

    fn glossary() -> RankedEvidenceSet {
        RankedEvidenceSet::from_ordered(vec![ScoredEvidence {
            item: Arc::new(EvidenceItem::new(
                SourceId::new("kb"),
                "KB-7",
                "Glossary",
                "USM: Unified Session Manager",
                0.92,
            )),
            normalized_score: 0.92,
            source_priority: 0,
        }])
    }

    fn synthesizer(provider: Option<Arc<dyn LlmProvider>>) -> Synthesizer {
        Synthesizer::new(&EngineConfig::default(), &PromptSet::defaults(), provider)
    }

    fn fixed(answer: &str) -> Arc<Fixed> {
        Arc::new(Fixed {
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_grounded_answer() {
        let provider = fixed("USM stands for Unified Session Manager [E1].");
        let outcome = synthesizer(Some(provider.clone()))
            .synthesize("what does USM mean", &glossary(), SynthesisMode::Optional, 0)
            .await;
        let SynthesisOutcome::Answered(answer) = outcome else {
            unreachable!("expected an answer");
        };
        assert!(answer.text.contains("Unified Session Manager"));
        assert!(answer.confidence >= 0.8);
        assert!(answer.flagged.is_empty());
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].external_id, "KB-7");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_conflicting_expansion_is_redacted() {
        let answer = synthesizer(None).ground(
            "USM stands for Unified Session Manager [E1]. USM stands for Universal Service Module [E1].",
            &glossary(),
            0,
        );
        assert_eq!(answer.text, "USM stands for Unified Session Manager [E1].");
        assert!(!answer.text.contains("Universal Service Module"));
        assert_eq!(answer.flagged.len(), 1);
        assert_eq!(answer.flagged[0].reason, ClaimReason::Contradicted);
        assert_eq!(answer.claims_supported, 1);
        assert_eq!(answer.claims_total, 2);
    }

    #[test]
    fn test_unknown_labels_are_flagged_and_removed() {
        let answer = synthesizer(None).ground("USM stands for Unified Session Manager [E4].", &glossary(), 0);
        assert!(!answer.text.contains("E4"));
        assert!(answer.citations.is_empty());
        assert!(answer.flagged.iter().any(|f| f.claim == "[E4]" && f.reason == ClaimReason::Unsupported));
    }

    #[test]
    fn test_unavailable_required_sources_lower_confidence() {
        let s = synthesizer(None);
        let draft = "USM stands for Unified Session Manager [E1].";
        let full = s.ground(draft, &glossary(), 0).confidence;
        let penalized = s.ground(draft, &glossary(), 1).confidence;
        assert!((full - penalized - 0.15).abs() < 1e-9);
    }

    fn scored(id: &str, body: &str, score: f64) -> ScoredEvidence {
        ScoredEvidence {
            item: Arc::new(EvidenceItem::new(SourceId::new("kb"), id, "Runbook", body, score)),
            normalized_score: score,
            source_priority: 0,
        }
    }

    #[test]
    fn test_losing_a_weakly_backed_claim_lowers_confidence() {
        let evidence = RankedEvidenceSet::from_ordered(vec![
            scored(
                "KB-1",
                "Sessions restart nightly at two. Tokens expire after one hour. \
                 Logs rotate every morning. Backups run weekly on Sunday.",
                0.9,
            ),
            scored("KB-2", "Omega psi chi rotates.", 0.05),
        ]);
        let base = "Sessions restart nightly at two [E1]. Tokens expire after one hour [E1]. \
                    Logs rotate every morning [E1]. Backups run weekly on Sunday [E1].";
        let s = synthesizer(None);

        let backed = s.ground(&format!("{base} Omega psi chi rotates [E2]."), &evidence, 0);
        let unbacked = s.ground(&format!("{base} Quux corge grault frobnicates."), &evidence, 0);

        assert!(backed.flagged.is_empty());
        assert_eq!(backed.claims_supported, 5);
        assert_eq!(unbacked.claims_total, 5);
        assert_eq!(unbacked.claims_supported, 4);
        assert!((backed.confidence - 0.892).abs() < 1e-9, "{}", backed.confidence);
        assert!((unbacked.confidence - 0.768).abs() < 1e-9, "{}", unbacked.confidence);
        assert!(unbacked.confidence < backed.confidence);
    }

    #[tokio::test]
    async fn test_missing_provider() {
        let s = synthesizer(None);
        assert_eq!(
            s.synthesize("q", &glossary(), SynthesisMode::Optional, 0).await,
            SynthesisOutcome::Skipped
        );
        assert!(matches!(
            s.synthesize("q", &glossary(), SynthesisMode::Required, 0).await,
            SynthesisOutcome::Unavailable { .. }
        ));
    }

    #[tokio::test]
    async fn test_provider_failure_is_redacted() {
        let outcome = synthesizer(Some(Arc::new(Down)))
            .synthesize("q", &glossary(), SynthesisMode::Optional, 0)
            .await;
        let SynthesisOutcome::Unavailable { summary } = outcome else {
            unreachable!("expected unavailable");
        };
        assert!(!summary.contains("sk-123"));
        assert!(!summary.contains("internal.example"));
    }

    #[tokio::test]
    async fn test_empty_evidence_skips_call() {
        let provider = fixed("anything");
        let outcome = synthesizer(Some(provider.clone()))
            .synthesize("q", &RankedEvidenceSet::default(), SynthesisMode::Required, 0)
            .await;
        assert_eq!(outcome, SynthesisOutcome::Skipped);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
