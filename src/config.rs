//! Engine configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment
//! variables → defaults. A missing API key is not an error; the engine then
//! runs without a completion service.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::retrieval::{CircuitConfig, MergeConfig};
use crate::swarm::SwarmConfig;
use crate::synthesis::{ConfidenceWeights, ValidationConfig};

/// Default completion provider.
const DEFAULT_PROVIDER: &str = "openai";
/// Default synthesizer model.
const DEFAULT_SYNTHESIZER_MODEL: &str = "gpt-5.2-2025-12-11";
/// Default decomposer model.
const DEFAULT_DECOMPOSER_MODEL: &str = "gpt-5-mini-2025-08-07";
/// Default embedding model.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Default embedding dimensionality for the default model.
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;
/// Default synthesizer max tokens.
const DEFAULT_SYNTHESIZER_MAX_TOKENS: u32 = 2048;
/// Default decomposer max tokens.
const DEFAULT_DECOMPOSER_MAX_TOKENS: u32 = 1024;
/// Default completion timeout in seconds.
const DEFAULT_SYNTHESIS_TIMEOUT_SECS: u64 = 30;

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Completion provider name (e.g., `"openai"`).
    pub provider: String,
    /// API key; `None` disables synthesis and LLM decomposition.
    pub api_key: Option<String>,
    /// Optional base URL override for compatible APIs.
    pub base_url: Option<String>,
    /// Model for the synthesizer.
    pub synthesizer_model: String,
    /// Model for the swarm decomposer.
    pub decomposer_model: String,
    /// Model for query embeddings.
    pub embedding_model: String,
    /// Dimensionality of `embedding_model`.
    pub embedding_dimensions: usize,
    /// Maximum tokens for synthesized answers.
    pub synthesizer_max_tokens: u32,
    /// Maximum tokens for decomposition output.
    pub decomposer_max_tokens: u32,
    /// Time budget for one completion call.
    pub synthesis_timeout: Duration,
    /// Directory containing prompt templates.
    pub prompt_dir: Option<PathBuf>,
    /// Circuit breaker tuning.
    pub circuit: CircuitConfig,
    /// Claim validation thresholds.
    pub validation: ValidationConfig,
    /// Confidence formula weights.
    pub confidence: ConfidenceWeights,
    /// Swarm bounds.
    pub swarm: SwarmConfig,
    /// Merger tuning.
    pub merge: MergeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            api_key: None,
            base_url: None,
            synthesizer_model: DEFAULT_SYNTHESIZER_MODEL.to_string(),
            decomposer_model: DEFAULT_DECOMPOSER_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            synthesizer_max_tokens: DEFAULT_SYNTHESIZER_MAX_TOKENS,
            decomposer_max_tokens: DEFAULT_DECOMPOSER_MAX_TOKENS,
            synthesis_timeout: Duration::from_secs(DEFAULT_SYNTHESIS_TIMEOUT_SECS),
            prompt_dir: None,
            circuit: CircuitConfig::default(),
            validation: ValidationConfig::default(),
            confidence: ConfidenceWeights::default(),
            swarm: SwarmConfig::default(),
            merge: MergeConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an environment value is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().from_env().build()
    }

    /// Whether a completion service can be created.
    #[must_use]
    pub fn has_completion_service(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    synthesizer_model: Option<String>,
    decomposer_model: Option<String>,
    embedding_model: Option<String>,
    embedding_dimensions: Option<usize>,
    synthesizer_max_tokens: Option<u32>,
    decomposer_max_tokens: Option<u32>,
    synthesis_timeout: Option<Duration>,
    prompt_dir: Option<PathBuf>,
    circuit: Option<CircuitConfig>,
    validation: Option<ValidationConfig>,
    confidence: Option<ConfidenceWeights>,
    swarm: Option<SwarmConfig>,
    merge: Option<MergeConfig>,
    circuit_threshold: Option<u32>,
    max_handoff_depth: Option<usize>,
}

impl EngineConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("CROSSCITE_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("CROSSCITE_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("CROSSCITE_BASE_URL"))
                .ok();
        }
        if self.synthesizer_model.is_none() {
            self.synthesizer_model = std::env::var("CROSSCITE_SYNTHESIZER_MODEL").ok();
        }
        if self.decomposer_model.is_none() {
            self.decomposer_model = std::env::var("CROSSCITE_DECOMPOSER_MODEL").ok();
        }
        if self.embedding_model.is_none() {
            self.embedding_model = std::env::var("CROSSCITE_EMBEDDING_MODEL").ok();
        }
        if self.embedding_dimensions.is_none() {
            self.embedding_dimensions = env_parse("CROSSCITE_EMBEDDING_DIMENSIONS");
        }
        if self.synthesis_timeout.is_none() {
            self.synthesis_timeout =
                env_parse::<u64>("CROSSCITE_SYNTHESIS_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("CROSSCITE_PROMPT_DIR").ok().map(PathBuf::from);
        }
        if self.circuit_threshold.is_none() {
            self.circuit_threshold = env_parse("CROSSCITE_CIRCUIT_THRESHOLD");
        }
        if self.max_handoff_depth.is_none() {
            self.max_handoff_depth = env_parse("CROSSCITE_MAX_HANDOFF_DEPTH");
        }
        self
    }

    /// Sets the provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the synthesizer model.
    #[must_use]
    pub fn synthesizer_model(mut self, model: impl Into<String>) -> Self {
        self.synthesizer_model = Some(model.into());
        self
    }

    /// Sets the decomposer model.
    #[must_use]
    pub fn decomposer_model(mut self, model: impl Into<String>) -> Self {
        self.decomposer_model = Some(model.into());
        self
    }

    /// Sets the embedding model and its dimensionality.
    #[must_use]
    pub fn embedding_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.embedding_model = Some(model.into());
        self.embedding_dimensions = Some(dimensions);
        self
    }

    /// Sets the synthesizer max tokens.
    #[must_use]
    pub const fn synthesizer_max_tokens(mut self, n: u32) -> Self {
        self.synthesizer_max_tokens = Some(n);
        self
    }

    /// Sets the decomposer max tokens.
    #[must_use]
    pub const fn decomposer_max_tokens(mut self, n: u32) -> Self {
        self.decomposer_max_tokens = Some(n);
        self
    }

    /// Sets the completion timeout.
    #[must_use]
    pub const fn synthesis_timeout(mut self, timeout: Duration) -> Self {
        self.synthesis_timeout = Some(timeout);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Sets circuit breaker tuning.
    #[must_use]
    pub const fn circuit(mut self, circuit: CircuitConfig) -> Self {
        self.circuit = Some(circuit);
        self
    }

    /// Sets claim validation thresholds.
    #[must_use]
    pub const fn validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = Some(validation);
        self
    }

    /// Sets confidence weights.
    #[must_use]
    pub const fn confidence(mut self, confidence: ConfidenceWeights) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Sets swarm bounds.
    #[must_use]
    pub const fn swarm(mut self, swarm: SwarmConfig) -> Self {
        self.swarm = Some(swarm);
        self
    }

    /// Sets merger tuning.
    #[must_use]
    pub const fn merge(mut self, merge: MergeConfig) -> Self {
        self.merge = Some(merge);
        self
    }

    /// Builds and validates the [`EngineConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for zero budgets or thresholds outside `[0, 1]`.
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let defaults = EngineConfig::default();

        let mut circuit = self.circuit.unwrap_or(defaults.circuit);
        if let Some(threshold) = self.circuit_threshold {
            circuit.failure_threshold = threshold;
        }
        let mut swarm = self.swarm.unwrap_or(defaults.swarm);
        if let Some(depth) = self.max_handoff_depth {
            swarm.max_handoff_depth = depth;
        }

        let config = EngineConfig {
            provider: self.provider.unwrap_or(defaults.provider),
            api_key: self.api_key.filter(|k| !k.trim().is_empty()),
            base_url: self.base_url,
            synthesizer_model: self.synthesizer_model.unwrap_or(defaults.synthesizer_model),
            decomposer_model: self.decomposer_model.unwrap_or(defaults.decomposer_model),
            embedding_model: self.embedding_model.unwrap_or(defaults.embedding_model),
            embedding_dimensions: self
                .embedding_dimensions
                .unwrap_or(defaults.embedding_dimensions),
            synthesizer_max_tokens: self
                .synthesizer_max_tokens
                .unwrap_or(defaults.synthesizer_max_tokens),
            decomposer_max_tokens: self
                .decomposer_max_tokens
                .unwrap_or(defaults.decomposer_max_tokens),
            synthesis_timeout: self.synthesis_timeout.unwrap_or(defaults.synthesis_timeout),
            prompt_dir: self.prompt_dir,
            circuit,
            validation: self.validation.unwrap_or(defaults.validation),
            confidence: self.confidence.unwrap_or(defaults.confidence),
            swarm,
            merge: self.merge.unwrap_or(defaults.merge),
        };
        validate(&config)?;
        Ok(config)
    }
}

fn unit_range(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: 1.0,
        })
    }
}

fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.circuit.failure_threshold == 0 {
        return Err(ConfigError::Zero {
            field: "circuit.failure_threshold",
        });
    }
    if config.synthesis_timeout.is_zero() {
        return Err(ConfigError::Zero {
            field: "synthesis_timeout",
        });
    }
    if config.swarm.max_sub_queries == 0 {
        return Err(ConfigError::Zero {
            field: "swarm.max_sub_queries",
        });
    }
    if config.validation.min_claim_tokens == 0 {
        return Err(ConfigError::Zero {
            field: "validation.min_claim_tokens",
        });
    }
    if config.embedding_dimensions == 0 {
        return Err(ConfigError::Zero {
            field: "embedding_dimensions",
        });
    }
    unit_range("validation.support_threshold", config.validation.support_threshold)?;
    unit_range("validation.weak_support_threshold", config.validation.weak_support_threshold)?;
    if config.validation.weak_support_threshold > config.validation.support_threshold {
        return Err(ConfigError::OutOfRange {
            field: "validation.weak_support_threshold",
            value: config.validation.weak_support_threshold,
            min: 0.0,
            max: config.validation.support_threshold,
        });
    }
    unit_range("confidence.support_weight", config.confidence.support_weight)?;
    unit_range("confidence.relevance_weight", config.confidence.relevance_weight)?;
    unit_range("confidence.unavailable_penalty", config.confidence.unavailable_penalty)?;
    unit_range("merge.dedup_threshold", config.merge.dedup_threshold)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = EngineConfig::builder()
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "openai");
        assert!(config.api_key.is_none());
        assert!(!config.has_completion_service());
        assert_eq!(config.circuit.failure_threshold, 3);
        assert_eq!(config.swarm.max_handoff_depth, 2);
        assert_eq!(config.synthesis_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_blank_api_key_is_absent() {
        let config = EngineConfig::builder()
            .api_key("  ")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = EngineConfig::builder()
            .api_key("key")
            .synthesizer_model("gpt-4o")
            .synthesis_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert!(config.has_completion_service());
        assert_eq!(config.synthesizer_model, "gpt-4o");
        assert_eq!(config.synthesis_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_out_of_range_weights() {
        let result = EngineConfig::builder()
            .confidence(ConfidenceWeights {
                support_weight: 1.5,
                ..ConfidenceWeights::default()
            })
            .build();
        assert!(matches!(result, Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn test_rejects_inverted_support_thresholds() {
        let result = EngineConfig::builder()
            .validation(ValidationConfig {
                support_threshold: 0.3,
                weak_support_threshold: 0.6,
                ..ValidationConfig::default()
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let result = EngineConfig::builder()
            .circuit(CircuitConfig {
                failure_threshold: 0,
                ..CircuitConfig::default()
            })
            .build();
        assert_eq!(
            result.err(),
            Some(ConfigError::Zero {
                field: "circuit.failure_threshold"
            })
        );
    }
}
