//! Severity of a flagged claim.

use serde::{Deserialize, Serialize};

/// Severity of a flagged claim, ordered from most to least severe.
///
/// Discriminants are inverted (`High = 0`, `Low = 2`) so that the derived
/// [`Ord`] sorts the most severe flags first.
/// [`at_least`](Severity::at_least) relies on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Minor: weakly supported wording.
    Low = 2,
    /// The claim has no backing in the evidence.
    Medium = 1,
    /// The claim conflicts with the evidence.
    High = 0,
}

impl Severity {
    /// Parses a severity string (case-insensitive), defaulting to `Low`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }

    /// Returns `true` if this severity is at or above `threshold`.
    #[must_use]
    pub const fn at_least(self, threshold: Self) -> bool {
        (self as u8) <= (threshold as u8)
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::High < Severity::Medium);
        assert!(Severity::Medium < Severity::Low);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("HIGH"), Severity::High);
        assert_eq!(Severity::parse("medium"), Severity::Medium);
        assert_eq!(Severity::parse("whatever"), Severity::Low);
    }

    #[test]
    fn test_severity_threshold() {
        assert!(Severity::High.at_least(Severity::Medium));
        assert!(Severity::Medium.at_least(Severity::Medium));
        assert!(!Severity::Low.at_least(Severity::Medium));
    }
}
