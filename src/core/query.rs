//! Caller queries and strategy names.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Maximum query length in bytes.
pub const MAX_QUERY_LEN: usize = 10_000;

/// Named retrieval strategy chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyName {
    /// Few sources, small caps, short timeout.
    Rapid,
    /// All sources, intent-matched ones preferred and required.
    Focused,
    /// All sources, large caps, mandatory synthesis.
    Comprehensive,
    /// Multi-agent decomposition with hand-offs.
    Swarm,
}

impl StrategyName {
    /// All strategies in table order.
    pub const ALL: [Self; 4] = [Self::Rapid, Self::Focused, Self::Comprehensive, Self::Swarm];

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rapid => "rapid",
            Self::Focused => "focused",
            Self::Comprehensive => "comprehensive",
            Self::Swarm => "swarm",
        }
    }
}

impl std::fmt::Display for StrategyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyName {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rapid" | "quick" => Ok(Self::Rapid),
            "focused" => Ok(Self::Focused),
            "comprehensive" | "deep" => Ok(Self::Comprehensive),
            "swarm" => Ok(Self::Swarm),
            other => Err(EngineError::UnknownStrategy {
                name: other.to_string(),
            }),
        }
    }
}

/// Optional structured filters passed through to adapters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilters {
    /// Project key (e.g. `"PROJ"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Inclusive lower bound on `updated_at`, unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    /// Inclusive upper bound on `updated_at`, unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
}

impl QueryFilters {
    /// Whether no filter is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.project.is_none() && self.since.is_none() && self.until.is_none()
    }
}

/// One caller question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Raw question text.
    pub text: String,
    /// Structured filters.
    pub filters: QueryFilters,
    /// Strategy to run.
    pub strategy: StrategyName,
    /// Caller's latency ceiling; tightens the strategy deadline.
    pub max_latency: Option<Duration>,
}

impl Query {
    /// Creates a query with no filters or latency ceiling.
    pub fn new(text: impl Into<String>, strategy: StrategyName) -> Self {
        Self {
            text: text.into(),
            filters: QueryFilters::default(),
            strategy,
            max_latency: None,
        }
    }

    /// Sets the filters.
    #[must_use]
    pub fn with_filters(mut self, filters: QueryFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Sets the latency ceiling.
    #[must_use]
    pub const fn with_max_latency(mut self, latency: Duration) -> Self {
        self.max_latency = Some(latency);
        self
    }

    /// Rejects empty, oversized, or inverted-range queries.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidQuery`] describing the problem.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.text.trim().is_empty() {
            return Err(EngineError::InvalidQuery {
                message: "query cannot be empty".to_string(),
            });
        }
        if self.text.len() > MAX_QUERY_LEN {
            return Err(EngineError::InvalidQuery {
                message: format!(
                    "query exceeds maximum length ({} bytes, max {MAX_QUERY_LEN})",
                    self.text.len()
                ),
            });
        }
        if let (Some(since), Some(until)) = (self.filters.since, self.filters.until)
            && since > until
        {
            return Err(EngineError::InvalidQuery {
                message: format!("date range is inverted (since {since} > until {until})"),
            });
        }
        if self.max_latency.is_some_and(|d| d.is_zero()) {
            return Err(EngineError::InvalidQuery {
                message: "max latency must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse() {
        assert_eq!("Rapid".parse::<StrategyName>(), Ok(StrategyName::Rapid));
        assert_eq!("deep".parse::<StrategyName>(), Ok(StrategyName::Comprehensive));
        assert!("turbo".parse::<StrategyName>().is_err());
    }

    #[test]
    fn test_validate_empty() {
        let q = Query::new("   ", StrategyName::Rapid);
        assert!(q.validate().is_err());
    }

    #[test]
    fn test_validate_too_long() {
        let q = Query::new("x".repeat(MAX_QUERY_LEN + 1), StrategyName::Rapid);
        assert!(q.validate().is_err());
    }

    #[test]
    fn test_validate_inverted_range() {
        let q = Query::new("login bug", StrategyName::Focused).with_filters(QueryFilters {
            project: None,
            since: Some(200),
            until: Some(100),
        });
        assert!(q.validate().is_err());
    }

    #[test]
    fn test_validate_ok() {
        let q = Query::new("what does USM mean", StrategyName::Rapid)
            .with_max_latency(Duration::from_secs(1));
        assert!(q.validate().is_ok());
    }
}
