//! Completion-service and embedding capabilities.
//!
//! Agents (the synthesizer and the swarm decomposer) are thin wrappers over
//! a pluggable [`LlmProvider`]. Provider construction lives in [`client`];
//! the `openai` feature enables the `async-openai` backend.

pub mod client;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod traits;

pub use client::{create_embedder, create_provider};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use traits::{Agent, AgentResponse};
