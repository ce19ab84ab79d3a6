//! Agent trait shared by the synthesizer and the decomposer.

use std::time::Duration;

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse, TokenUsage, system_message, user_message};
use super::provider::LlmProvider;
use crate::error::AgentError;

/// Response from an agent execution.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// The agent's text output.
    pub content: String,
    /// Token usage for this call.
    pub usage: TokenUsage,
    /// Why the model stopped generating.
    pub finish_reason: Option<String>,
}

/// A role with a fixed system prompt and model configuration.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging.
    fn name(&self) -> &'static str;

    /// Model identifier.
    fn model(&self) -> &str;

    /// System prompt defining the agent's role.
    fn system_prompt(&self) -> &str;

    /// Whether to request JSON output.
    fn json_mode(&self) -> bool {
        false
    }

    /// Sampling temperature.
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum response tokens.
    fn max_tokens(&self) -> u32 {
        2048
    }

    /// Executes the agent once with the given user message.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on provider failures.
    async fn execute(
        &self,
        provider: &dyn LlmProvider,
        user_msg: &str,
    ) -> Result<AgentResponse, AgentError> {
        let request = ChatRequest {
            model: self.model().to_string(),
            messages: vec![system_message(self.system_prompt()), user_message(user_msg)],
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            json_mode: self.json_mode(),
        };

        let response: ChatResponse = provider.chat(&request).await?;

        Ok(AgentResponse {
            content: response.content,
            usage: response.usage,
            finish_reason: response.finish_reason,
        })
    }

    /// [`execute`](Agent::execute) bounded by a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Timeout`] when the budget elapses first.
    async fn execute_within(
        &self,
        provider: &dyn LlmProvider,
        user_msg: &str,
        timeout: Duration,
    ) -> Result<AgentResponse, AgentError> {
        tokio::time::timeout(timeout, self.execute(provider, user_msg))
            .await
            .map_err(|_| AgentError::Timeout { elapsed: timeout })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl LlmProvider for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            Ok(ChatResponse {
                content: request.last_user_content().unwrap_or_default().to_string(),
                ..ChatResponse::default()
            })
        }
    }

    struct Stalled;

    #[async_trait]
    impl LlmProvider for Stalled {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            std::future::pending().await
        }
    }

    struct Plain;

    #[async_trait]
    impl Agent for Plain {
        fn name(&self) -> &'static str {
            "plain"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        fn system_prompt(&self) -> &str {
            "be brief"
        }
    }

    #[tokio::test]
    async fn test_execute_round_trips_user_message() {
        let response = Plain
            .execute(&Echo, "hello")
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(response.content, "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_within_times_out() {
        let result = Plain
            .execute_within(&Stalled, "hello", Duration::from_secs(2))
            .await;
        assert!(matches!(result, Err(AgentError::Timeout { .. })));
    }
}
