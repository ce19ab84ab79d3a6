//! Error types for the retrieval engine.
//!
//! Source adapter failures never escape the coordinator as errors; they are
//! folded into per-source reports. The types here describe those failures
//! internally and give callers a redacted summary instead of raw upstream text.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for fallible engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// A source adapter failed.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The completion service failed.
    #[error(transparent)]
    Agent(#[from] AgentError),
    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The query itself was rejected.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// A CLI command failed.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Failure classification for a single source adapter call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Network failure, timeout, or the store refused the connection.
    #[error("source unavailable: {message}")]
    Unavailable {
        /// Internal detail (logged, never returned to callers).
        message: String,
    },
    /// The query was malformed for this store. Never retried.
    #[error("invalid source query: {message}")]
    Invalid {
        /// Internal detail (logged, never returned to callers).
        message: String,
    },
    /// The store answered but a sub-operation (such as embedding) failed.
    #[error("source degraded: {message}")]
    Degraded {
        /// Internal detail (logged, never returned to callers).
        message: String,
    },
}

impl SourceError {
    /// Creates an [`SourceError::Unavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates an [`SourceError::Invalid`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Creates an [`SourceError::Degraded`].
    pub fn degraded(message: impl Into<String>) -> Self {
        Self::Degraded {
            message: message.into(),
        }
    }

    /// Returns the failure classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::Invalid { .. } => ErrorKind::Invalid,
            Self::Degraded { .. } => ErrorKind::Degraded,
        }
    }

    /// Caller-safe summary with upstream detail removed.
    #[must_use]
    pub const fn redacted(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "source could not be reached",
            Self::Invalid { .. } => "query was rejected by the source",
            Self::Degraded { .. } => "source answered with reduced capability",
        }
    }

    /// Whether the circuit breaker should count this as a failure.
    ///
    /// Invalid queries are the caller's fault, not the store's.
    #[must_use]
    pub const fn trips_circuit(&self) -> bool {
        !matches!(self, Self::Invalid { .. })
    }
}

/// Typed classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient failure.
    Unavailable,
    /// Caller or configuration error.
    Invalid,
    /// Partial capability loss.
    Degraded,
    /// Completion service down; evidence returned without an answer.
    SynthesisUnavailable,
    /// Swarm hand-off depth exceeded.
    Exhausted,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unavailable => "unavailable",
            Self::Invalid => "invalid",
            Self::Degraded => "degraded",
            Self::SynthesisUnavailable => "synthesis_unavailable",
            Self::Exhausted => "exhausted",
        })
    }
}

/// Errors from the completion service and the agents that call it.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key was configured.
    #[error("no API key configured (set OPENAI_API_KEY or CROSSCITE_API_KEY)")]
    ApiKeyMissing,

    /// The configured provider name is not known.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name as configured.
        name: String,
    },

    /// The provider request failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Upstream error message.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// The provider response could not be interpreted.
    #[error("failed to parse response: {message}")]
    ResponseParse {
        /// What went wrong.
        message: String,
        /// Raw content that failed to parse.
        content: String,
    },

    /// The provider did not answer in time.
    #[error("completion timed out after {elapsed:?}")]
    Timeout {
        /// Time budget that elapsed.
        elapsed: Duration,
    },
}

impl AgentError {
    /// Caller-safe summary without upstream detail.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::ApiKeyMissing => "no completion service configured".to_string(),
            Self::UnsupportedProvider { name } => format!("unsupported completion provider '{name}'"),
            Self::ApiRequest {
                status: Some(status), ..
            } => format!("completion service returned HTTP {status}"),
            Self::ApiRequest { status: None, .. } => "completion service could not be reached".to_string(),
            Self::ResponseParse { .. } => "completion service returned an unreadable response".to_string(),
            Self::Timeout { elapsed } => format!("completion service timed out after {}ms", elapsed.as_millis()),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A threshold or weight fell outside its valid range.
    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        /// Configuration field name.
        field: &'static str,
        /// Rejected value.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },

    /// A count that must be positive was zero.
    #[error("{field} must be greater than zero")]
    Zero {
        /// Configuration field name.
        field: &'static str,
    },

    /// A `--source` specification could not be parsed.
    #[error("invalid source specification '{spec}': {reason}")]
    SourceSpec {
        /// Raw specification.
        spec: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Query-level errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The query was rejected before any source was contacted.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Why it was rejected.
        message: String,
    },

    /// No strategy with this name exists.
    #[error("unknown strategy: {name}")]
    UnknownStrategy {
        /// Requested name.
        name: String,
    },
}

/// CLI command failures.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command could not run to completion.
    #[error("command failed: {0}")]
    ExecutionFailed(String),

    /// Output could not be written.
    #[error("output error: {0}")]
    OutputError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_hides_upstream_detail() {
        let err = SourceError::unavailable("connect to 10.0.0.5:5432 refused (password=hunter2)");
        assert!(!err.redacted().contains("hunter2"));
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn test_invalid_does_not_trip_circuit() {
        assert!(!SourceError::invalid("bad").trips_circuit());
        assert!(SourceError::unavailable("down").trips_circuit());
        assert!(SourceError::degraded("embedding").trips_circuit());
    }

    #[test]
    fn test_agent_error_redacted() {
        let err = AgentError::ApiRequest {
            message: "401 from https://proxy.internal (key sk-abc)".to_string(),
            status: Some(401),
        };
        assert_eq!(err.redacted(), "completion service returned HTTP 401");
        let timeout = AgentError::Timeout {
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(timeout.redacted(), "completion service timed out after 2000ms");
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::SynthesisUnavailable).unwrap_or_default();
        assert_eq!(json, "\"synthesis_unavailable\"");
        assert_eq!(ErrorKind::Exhausted.to_string(), "exhausted");
    }
}
