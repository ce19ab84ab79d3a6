//! Concrete completion and embedding backends.

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "openai")]
pub use openai::{OpenAiEmbedder, OpenAiProvider};
