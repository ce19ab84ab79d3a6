//! # crosscite
//!
//! Cross-source retrieval and synthesis engine.
//!
//! One question fans out to heterogeneous knowledge stores (knowledge base,
//! tickets, commit history, code) under a named strategy. Results are
//! normalized onto a shared relevance scale, deduplicated and ranked, and
//! optionally synthesized into an answer whose every claim is checked
//! against the retrieved evidence.
//!
//! ## Architecture
//!
//! - **Sources**: read-only [`SourceAdapter`]s, one per store
//! - **Retrieval**: strategy selection, parallel fan-out with per-source
//!   timeouts and circuit breakers, cross-source merging
//! - **Swarm**: family-scoped specialists that hand refined sub-queries to
//!   each other up to a depth bound
//! - **Synthesis**: cited answers, claim validation and a confidence score
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use crosscite::{Engine, EngineConfig, Query, SourceFamily, SourceId, SourceRegistry, SqliteAdapter, StrategyName};
//!
//! # async fn run() -> crosscite::Result<()> {
//! let kb = SqliteAdapter::new(SourceId::new("kb"), SourceFamily::KnowledgeBase, "kb.db", "articles")?;
//! let registry = SourceRegistry::new().with(Arc::new(kb))?;
//! let engine = Engine::new(EngineConfig::from_env()?, registry)?;
//!
//! let response = engine.query(Query::new("what does USM mean", StrategyName::Rapid)).await;
//! let _status = response.status;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod llm;
pub mod retrieval;
pub mod source;
pub mod swarm;
pub mod synthesis;
pub mod text;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use crate::core::{
    AgentHandoff, Answer, Citation, ClaimReason, EngineWarning, ErrorSummary, EvidenceItem,
    FlaggedClaim, Query, QueryFilters, QueryResponse, QueryStatus, RankedEvidenceSet,
    ScoredEvidence, Severity, SourceFamily, SourceId, SourceReport, SourceStatus, StrategyName,
};
pub use engine::Engine;
pub use error::{AgentError, ConfigError, EngineError, Error, ErrorKind, Result, SourceError};
pub use llm::{LlmProvider, PromptSet};
pub use retrieval::{CircuitBreakers, CircuitConfig, RetrievalPlan, StrategyConfig};
pub use source::{
    Calibration, Embedder, SourceAdapter, SourceRegistry, SourceRequest, SqliteAdapter,
    VectorAdapter, VectorIndex,
};
pub use swarm::{SwarmConfig, SwarmState, SwarmTrace};
