//! Synthesizer agent.
//!
//! Turns the ranked evidence into a cited natural-language answer. It has no
//! tools: everything it may say is in the prompt.

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::llm::Agent;

/// Agent that writes the answer from labelled evidence.
pub struct SynthesizerAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl SynthesizerAgent {
    /// Creates a synthesizer from configuration and a system prompt.
    #[must_use]
    pub fn new(config: &EngineConfig, system_prompt: String) -> Self {
        Self {
            model: config.synthesizer_model.clone(),
            max_tokens: config.synthesizer_max_tokens,
            system_prompt,
        }
    }
}

#[async_trait]
impl Agent for SynthesizerAgent {
    fn name(&self) -> &'static str {
        "synthesizer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        0.1
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}
