//! Extraction provenance: how an entity or relationship came to exist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Escalation level of extraction effort.
///
/// - `Deterministic` (1): regex pattern matching from a schema document
/// - `Assisted` (2): AI-assisted disambiguation of an ambiguous candidate
/// - `Discovery` (3): full AI discovery over an unrecognized file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Deterministic,
    Assisted,
    Discovery,
}

impl Tier {
    /// Numeric tier as reported in statistics and stored records.
    pub fn as_u8(self) -> u8 {
        match self {
            Tier::Deterministic => 1,
            Tier::Assisted => 2,
            Tier::Discovery => 3,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Metadata recording how and with what confidence a graph element was produced.
///
/// Provenance is immutable: corrections create new provenance-tagged
/// replacements rather than rewriting history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    /// Extraction tier that produced the element.
    pub tier: Tier,

    /// Schema document that matched, if any (absent for Tier-3 discovery
    /// and for placeholder file entities).
    pub schema: Option<String>,

    /// Confidence in [0, 1].
    pub confidence: f64,

    /// When the element was extracted.
    pub extracted_at: DateTime<Utc>,
}

impl Provenance {
    /// Tier-1 provenance from a named schema.
    pub fn deterministic(schema: impl Into<String>, confidence: f64) -> Self {
        Self {
            tier: Tier::Deterministic,
            schema: Some(schema.into()),
            confidence: confidence.clamp(0.0, 1.0),
            extracted_at: Utc::now(),
        }
    }

    /// Tier-2 provenance after assisted disambiguation.
    pub fn assisted(schema: Option<String>, confidence: f64) -> Self {
        Self {
            tier: Tier::Assisted,
            schema,
            confidence: confidence.clamp(0.0, 1.0),
            extracted_at: Utc::now(),
        }
    }

    /// Tier-3 provenance from full discovery.
    pub fn discovery(confidence: f64) -> Self {
        Self {
            tier: Tier::Discovery,
            schema: None,
            confidence: confidence.clamp(0.0, 1.0),
            extracted_at: Utc::now(),
        }
    }

    /// Provenance for a file recorded without any matching schema:
    /// tier 1, zero confidence, no schema.
    pub fn unmatched() -> Self {
        Self {
            tier: Tier::Deterministic,
            schema: None,
            confidence: 0.0,
            extracted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_numbering() {
        assert_eq!(Tier::Deterministic.as_u8(), 1);
        assert_eq!(Tier::Assisted.as_u8(), 2);
        assert_eq!(Tier::Discovery.as_u8(), 3);
    }

    #[test]
    fn test_confidence_clamped() {
        let p = Provenance::deterministic("base-rust", 1.7);
        assert_eq!(p.confidence, 1.0);
        let p = Provenance::discovery(-0.2);
        assert_eq!(p.confidence, 0.0);
    }

    #[test]
    fn test_unmatched_is_tier1_zero_confidence() {
        let p = Provenance::unmatched();
        assert_eq!(p.tier, Tier::Deterministic);
        assert_eq!(p.confidence, 0.0);
        assert!(p.schema.is_none());
    }
}
