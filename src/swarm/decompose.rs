//! Query decomposition for the swarm.
//!
//! The decomposer agent proposes sub-queries per source family. When no
//! completion service is configured, or its output cannot be used, a
//! deterministic heuristic takes over: one sub-query per available family,
//! intent-matched families first.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::SubQuery;
use crate::config::EngineConfig;
use crate::core::SourceFamily;
use crate::error::AgentError;
use crate::llm::prompt::build_decomposer_prompt;
use crate::llm::{Agent, LlmProvider};
use crate::retrieval::intent;

/// Where a decomposition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionSource {
    /// Proposed by the decomposer agent.
    Agent,
    /// Deterministic fallback.
    Heuristic,
}

#[derive(Debug, Deserialize)]
struct Decomposition {
    #[serde(default)]
    sub_queries: Vec<ProposedSubQuery>,
}

#[derive(Debug, Deserialize)]
struct ProposedSubQuery {
    family: String,
    query: String,
}

/// Agent that splits a question into per-family sub-queries.
pub struct DecomposerAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl DecomposerAgent {
    /// Creates a decomposer from configuration and a system prompt.
    #[must_use]
    pub fn new(config: &EngineConfig, system_prompt: String) -> Self {
        Self {
            model: config.decomposer_model.clone(),
            max_tokens: config.decomposer_max_tokens,
            system_prompt,
        }
    }

    /// Asks the agent for at most `max` sub-queries over `families`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on provider failure, timeout, or when the
    /// response holds no usable sub-query.
    pub async fn decompose(
        &self,
        provider: &dyn LlmProvider,
        query: &str,
        families: &[SourceFamily],
        max: usize,
        timeout: Duration,
    ) -> Result<Vec<SubQuery>, AgentError> {
        let user_msg = build_decomposer_prompt(query, families, max);
        let response = self.execute_within(provider, &user_msg, timeout).await?;
        Self::parse_sub_queries(&response.content, families, max)
    }

    /// Parses the agent's JSON, keeping valid, distinct sub-queries for
    /// available families.
    fn parse_sub_queries(content: &str, families: &[SourceFamily], max: usize) -> Result<Vec<SubQuery>, AgentError> {
        let trimmed = content.trim();

        // Models sometimes wrap JSON in a markdown fence.
        let json_str = if trimmed.starts_with("```") {
            trimmed
                .trim_start_matches("```json")
                .trim_start_matches("```")
                .trim_end_matches("```")
                .trim()
        } else {
            trimmed
        };

        let decomposition: Decomposition =
            serde_json::from_str(json_str).map_err(|e| AgentError::ResponseParse {
                message: format!("failed to parse decomposition: {e}"),
                content: content.to_string(),
            })?;

        let mut seen = HashSet::new();
        let sub_queries: Vec<SubQuery> = decomposition
            .sub_queries
            .into_iter()
            .filter_map(|proposed| {
                let family = SourceFamily::parse(proposed.family.trim())?;
                let text = proposed.query.trim().to_string();
                (!text.is_empty() && families.contains(&family)).then(|| SubQuery::initial(family, text))
            })
            .filter(|sub| seen.insert((sub.family, sub.text.clone())))
            .take(max)
            .collect();

        if sub_queries.is_empty() {
            return Err(AgentError::ResponseParse {
                message: "decomposition contained no usable sub-queries".to_string(),
                content: content.to_string(),
            });
        }
        Ok(sub_queries)
    }
}

#[async_trait]
impl Agent for DecomposerAgent {
    fn name(&self) -> &'static str {
        "decomposer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn json_mode(&self) -> bool {
        true
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// One sub-query per available family, intent-matched families first.
#[must_use]
pub fn heuristic(query: &str, families: &[SourceFamily], max: usize) -> Vec<SubQuery> {
    let detected = intent::detect(query);
    let matched = detected.iter().copied().filter(|f| families.contains(f));
    let rest = SourceFamily::ALL
        .into_iter()
        .filter(|f| families.contains(f) && !detected.contains(f));
    matched
        .chain(rest)
        .take(max)
        .map(|family| SubQuery::initial(family, query.trim().to_string()))
        .collect()
}
