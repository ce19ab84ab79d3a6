//! Retrieval: strategy selection, concurrent execution and merging.
//!
//! ```text
//! Query ──▶ StrategySelector ──▶ RetrievalPlan ──▶ RetrievalCoordinator
//!                 ▲                                   │        │
//!                 └────── CircuitBreakers ◀───────────┘        ▼
//!                                                     merge ──▶ RankedEvidenceSet
//! ```

pub mod circuit;
pub mod coordinator;
pub mod intent;
pub mod merger;
pub mod plan;
pub mod strategy;

pub use circuit::{Admission, CircuitBreakers, CircuitConfig, CircuitSnapshot, CircuitState};
pub use coordinator::{RetrievalCoordinator, RetrievalOutcome, SourceOutcome};
pub use merger::{MergeConfig, SourceBatch, merge};
pub use plan::{PlannedSource, RetrievalPlan, SynthesisMode};
pub use strategy::{RequiredSources, StrategyConfig, StrategySelector};
