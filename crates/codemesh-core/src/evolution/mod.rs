//! Schema evolution queue and health reporting.
//!
//! Corrections from Tier-2 and suggestions from Tier-3 accumulate here as
//! evidence. Once enough evidence piles up for one (language, pattern) the
//! queue emits a proposal for a human (or an agent) to act on. Everything in
//! this module is best-effort: extraction never blocks on it and never fails
//! because of it.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TrustConfig;
use crate::trust::{TrustLedger, TrustLevel};

/// Where a piece of schema evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    /// Tier-2 corrected a candidate this pattern produced.
    Tier2Correction,
    /// Tier-3 discovery proposed a pattern no schema covers.
    Tier3Discovery,
}

/// One piece of evidence that a schema pattern should change or be created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSuggestion {
    pub language: String,
    /// Pattern rule name (existing) or proposed name (new).
    pub pattern: String,
    /// Schema the evidence concerns, absent for brand-new patterns.
    pub schema: Option<String>,
    /// Regex proposed by discovery, when it offered one.
    pub suggested_regex: Option<String>,
    pub source: SuggestionSource,
    /// Free-form description of what went wrong or what was found.
    pub detail: String,
}

/// An emitted proposal: enough evidence accumulated for one pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaProposal {
    pub language: String,
    pub pattern: String,
    pub evidence: Vec<SchemaSuggestion>,
}

/// Health report for one schema pattern, derived from the trust ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaHealth {
    pub schema_id: String,
    pub pattern: String,
    pub language: String,
    pub trust_level: TrustLevel,
    pub accuracy: f64,
    pub correction_rate: f64,
    pub rejection_rate: f64,
    pub total_extractions: u64,
    pub needs_evolution: bool,
}

/// Accumulates correction/discovery evidence and periodically proposes
/// schema updates.
pub struct EvolutionQueue {
    suggestions: Mutex<Vec<SchemaSuggestion>>,
}

impl EvolutionQueue {
    pub fn new() -> Self {
        Self {
            suggestions: Mutex::new(Vec::new()),
        }
    }

    /// Queue one piece of evidence. Infallible by design.
    pub fn push(&self, suggestion: SchemaSuggestion) {
        debug!(
            language = %suggestion.language,
            pattern = %suggestion.pattern,
            source = ?suggestion.source,
            "queued schema evidence"
        );
        self.suggestions
            .lock()
            .expect("evolution queue lock poisoned")
            .push(suggestion);
    }

    /// Number of queued suggestions.
    pub fn len(&self) -> usize {
        self.suggestions
            .lock()
            .expect("evolution queue lock poisoned")
            .len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Emit proposals for every (language, pattern) with at least
    /// `min_evidence` suggestions, draining their evidence from the queue.
    /// Groups below the threshold stay queued.
    pub fn proposals(&self, min_evidence: usize) -> Vec<SchemaProposal> {
        let mut suggestions = self
            .suggestions
            .lock()
            .expect("evolution queue lock poisoned");

        let mut groups: HashMap<(String, String), Vec<SchemaSuggestion>> = HashMap::new();
        for suggestion in suggestions.drain(..) {
            groups
                .entry((suggestion.language.clone(), suggestion.pattern.clone()))
                .or_default()
                .push(suggestion);
        }

        let mut proposals = Vec::new();
        for ((language, pattern), evidence) in groups {
            if evidence.len() >= min_evidence {
                proposals.push(SchemaProposal {
                    language,
                    pattern,
                    evidence,
                });
            } else {
                suggestions.extend(evidence);
            }
        }

        proposals.sort_by(|a, b| {
            (a.language.as_str(), a.pattern.as_str()).cmp(&(b.language.as_str(), b.pattern.as_str()))
        });
        proposals
    }
}

impl Default for EvolutionQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive a per-pattern health report from the trust ledger.
///
/// A pattern needs evolution when its correction or rejection rate exceeds
/// the configured thresholds with enough samples to mean anything.
pub fn schema_health(ledger: &TrustLedger, config: &TrustConfig) -> Vec<SchemaHealth> {
    ledger
        .all()
        .into_iter()
        .map(|record| {
            let enough_samples = record.total >= config.min_samples_for_evolution;
            let needs_evolution = enough_samples
                && (record.correction_rate() > config.evolution_correction_rate
                    || record.rejection_rate() > config.evolution_rejection_rate);

            SchemaHealth {
                schema_id: record.schema_id.clone(),
                pattern: record.pattern.clone(),
                language: record.language.clone(),
                trust_level: record.trust_level,
                accuracy: record.accuracy_score(),
                correction_rate: record.correction_rate(),
                rejection_rate: record.rejection_rate(),
                total_extractions: record.total,
                needs_evolution,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::Outcome;

    fn suggestion(language: &str, pattern: &str) -> SchemaSuggestion {
        SchemaSuggestion {
            language: language.to_string(),
            pattern: pattern.to_string(),
            schema: None,
            suggested_regex: None,
            source: SuggestionSource::Tier3Discovery,
            detail: "example".to_string(),
        }
    }

    #[test]
    fn test_proposal_requires_min_evidence() {
        let queue = EvolutionQueue::new();
        for _ in 0..4 {
            queue.push(suggestion("java", "annotation_class"));
        }
        assert!(queue.proposals(5).is_empty());
        // Evidence below threshold stays queued.
        assert_eq!(queue.len(), 4);

        queue.push(suggestion("java", "annotation_class"));
        let proposals = queue.proposals(5);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].evidence.len(), 5);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_groups_are_independent() {
        let queue = EvolutionQueue::new();
        for _ in 0..5 {
            queue.push(suggestion("java", "annotation_class"));
        }
        queue.push(suggestion("go", "func_def"));

        let proposals = queue.proposals(5);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].language, "java");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_schema_health_flags_high_correction() {
        let ledger = TrustLedger::in_memory();
        for _ in 0..15 {
            ledger.record("base-js", "arrow_fn", "javascript", Outcome::Verified);
        }
        for _ in 0..5 {
            ledger.record("base-js", "arrow_fn", "javascript", Outcome::Corrected);
        }

        let config = TrustConfig::default();
        let health = schema_health(&ledger, &config);
        assert_eq!(health.len(), 1);
        let report = &health[0];
        assert_eq!(report.total_extractions, 20);
        assert!(report.correction_rate > config.evolution_correction_rate);
        assert!(report.needs_evolution);
    }

    #[test]
    fn test_schema_health_needs_samples() {
        let ledger = TrustLedger::in_memory();
        ledger.record("base-js", "arrow_fn", "javascript", Outcome::Corrected);

        let health = schema_health(&ledger, &TrustConfig::default());
        // 100% correction rate but one sample: not flagged.
        assert!(!health[0].needs_evolution);
    }
}
