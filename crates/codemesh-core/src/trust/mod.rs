//! Trust scoring with adaptive verification sampling.
//!
//! The ledger keeps one reliability record per (schema, pattern, language)
//! and derives from its accumulated outcomes a trust level and a sampling
//! rate: the probability that the next extraction by that pattern gets
//! expensive verification. A pattern that keeps proving itself is sampled
//! less; one that regresses is sampled more. Regression all the way back to
//! `Low` is intentional — it protects against schema drift and framework
//! upgrades silently corrupting extraction quality.

mod store;

pub use store::TrustStore;

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{
    HIGH_MAX_CORRECTION_RATE, HIGH_MIN_ACCURACY, HIGH_MIN_SAMPLES, HIGH_SAMPLING_RATE,
    LOW_SAMPLING_RATE, MEDIUM_MIN_ACCURACY, MEDIUM_MIN_SAMPLES, MEDIUM_SAMPLING_RATE,
    TRUSTED_MAX_CORRECTION_RATE, TRUSTED_MIN_ACCURACY, TRUSTED_MIN_SAMPLES, TRUSTED_SAMPLING_RATE,
};

/// Errors raised by trust persistence.
#[derive(Debug, Error)]
pub enum TrustError {
    #[error("Failed to write trust store {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize trust store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outcome of verifying one extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Verification confirmed the extraction unchanged.
    Verified,
    /// Verification altered the extraction.
    Corrected,
    /// Verification explicitly rejected the extraction.
    Rejected,
}

/// Coarse trust bucket derived from accuracy/correction history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Low,
    Medium,
    High,
    Trusted,
}

impl TrustLevel {
    /// The verification sampling rate this level implies.
    pub fn sampling_rate(self) -> f64 {
        match self {
            TrustLevel::Trusted => TRUSTED_SAMPLING_RATE,
            TrustLevel::High => HIGH_SAMPLING_RATE,
            TrustLevel::Medium => MEDIUM_SAMPLING_RATE,
            TrustLevel::Low => LOW_SAMPLING_RATE,
        }
    }
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrustLevel::Low => "low",
            TrustLevel::Medium => "medium",
            TrustLevel::High => "high",
            TrustLevel::Trusted => "trusted",
        };
        write!(f, "{s}")
    }
}

/// Key identifying one trust record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrustKey {
    pub schema_id: String,
    pub pattern: String,
}

impl TrustKey {
    pub fn new(schema_id: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            schema_id: schema_id.into(),
            pattern: pattern.into(),
        }
    }
}

/// Reliability statistics for one (schema, pattern, language).
///
/// Records are never deleted: a retired pattern's history stays queryable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustRecord {
    pub schema_id: String,
    pub pattern: String,
    pub language: String,

    pub total: u64,
    pub verified: u64,
    pub corrected: u64,
    pub rejected: u64,

    pub trust_level: TrustLevel,
    pub sampling_rate: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrustRecord {
    /// Fresh record at the bootstrap level: always verify.
    fn bootstrap(key: &TrustKey, language: &str) -> Self {
        let now = Utc::now();
        Self {
            schema_id: key.schema_id.clone(),
            pattern: key.pattern.clone(),
            language: language.to_string(),
            total: 0,
            verified: 0,
            corrected: 0,
            rejected: 0,
            trust_level: TrustLevel::Low,
            sampling_rate: LOW_SAMPLING_RATE,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fraction of outcomes confirmed unchanged.
    pub fn accuracy_score(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.verified as f64 / self.total as f64
        }
    }

    /// Fraction of outcomes that needed correction.
    pub fn correction_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.corrected as f64 / self.total as f64
        }
    }

    /// Fraction of outcomes explicitly rejected.
    pub fn rejection_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.rejected as f64 / self.total as f64
        }
    }

    fn apply(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Verified => self.verified += 1,
            Outcome::Corrected => self.corrected += 1,
            Outcome::Rejected => self.rejected += 1,
        }
        self.updated_at = Utc::now();
        self.recompute_level();
    }

    /// Recompute the trust level from counts accumulated so far.
    ///
    /// Transitions go both ways: later outcomes can demote a `Trusted`
    /// pattern back to `Low`.
    fn recompute_level(&mut self) {
        let accuracy = self.accuracy_score();
        let correction = self.correction_rate();

        let level = if accuracy >= TRUSTED_MIN_ACCURACY
            && correction <= TRUSTED_MAX_CORRECTION_RATE
            && self.total >= TRUSTED_MIN_SAMPLES
        {
            TrustLevel::Trusted
        } else if accuracy >= HIGH_MIN_ACCURACY
            && correction <= HIGH_MAX_CORRECTION_RATE
            && self.total >= HIGH_MIN_SAMPLES
        {
            TrustLevel::High
        } else if accuracy >= MEDIUM_MIN_ACCURACY && self.total >= MEDIUM_MIN_SAMPLES {
            TrustLevel::Medium
        } else {
            TrustLevel::Low
        };

        if level != self.trust_level {
            info!(
                schema = %self.schema_id,
                pattern = %self.pattern,
                from = %self.trust_level,
                to = %level,
                accuracy,
                total = self.total,
                "trust level transition"
            );
        }
        self.trust_level = level;
        self.sampling_rate = level.sampling_rate();
    }
}

/// The shared, mutable trust ledger.
///
/// Updates are atomic per key: the whole map sits behind one mutex, and
/// every read-modify-write happens inside it. The map is loaded eagerly from
/// the durable snapshot at startup and written back on explicit [`flush`],
/// batching disk I/O behind a dirty flag.
///
/// [`flush`]: TrustLedger::flush
pub struct TrustLedger {
    records: Mutex<HashMap<TrustKey, TrustRecord>>,
    store: Option<TrustStore>,
    dirty: Mutex<bool>,
}

impl TrustLedger {
    /// In-memory ledger with no durable store (tests, one-shot runs).
    pub fn in_memory() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            store: None,
            dirty: Mutex::new(false),
        }
    }

    /// Ledger backed by a durable snapshot file.
    ///
    /// A corrupt or missing snapshot is non-fatal: the ledger starts empty
    /// and every pattern reverts to bootstrap/always-verify.
    pub fn open(store: TrustStore) -> Self {
        let records = store.load();
        debug!(records = records.len(), "trust ledger loaded");
        Self {
            records: Mutex::new(records),
            store: Some(store),
            dirty: Mutex::new(false),
        }
    }

    /// Current record for a pattern, if one exists.
    pub fn score(&self, schema_id: &str, pattern: &str) -> Option<TrustRecord> {
        self.records
            .lock()
            .expect("trust ledger lock poisoned")
            .get(&TrustKey::new(schema_id, pattern))
            .cloned()
    }

    /// Decide whether this extraction should get expensive verification.
    ///
    /// Bootstrap invariant: a pattern with no record is always verified.
    /// Otherwise the decision is a uniform random draw against the record's
    /// sampling rate — probabilistic per call, convergent in aggregate.
    pub fn should_verify(&self, schema_id: &str, pattern: &str) -> bool {
        let rate = match self.score(schema_id, pattern) {
            None => return true,
            Some(record) => record.sampling_rate,
        };
        rand::thread_rng().gen::<f64>() < rate
    }

    /// Record one verification outcome, creating the record lazily.
    pub fn record(&self, schema_id: &str, pattern: &str, language: &str, outcome: Outcome) {
        let key = TrustKey::new(schema_id, pattern);
        let mut records = self.records.lock().expect("trust ledger lock poisoned");
        let record = records
            .entry(key.clone())
            .or_insert_with(|| TrustRecord::bootstrap(&key, language));
        record.apply(outcome);
        drop(records);

        *self.dirty.lock().expect("trust ledger lock poisoned") = true;
    }

    /// Record a batch of outcomes under one lock acquisition.
    pub fn record_batch(&self, outcomes: &[(String, String, String, Outcome)]) {
        if outcomes.is_empty() {
            return;
        }
        let mut records = self.records.lock().expect("trust ledger lock poisoned");
        for (schema_id, pattern, language, outcome) in outcomes {
            let key = TrustKey::new(schema_id.clone(), pattern.clone());
            let record = records
                .entry(key.clone())
                .or_insert_with(|| TrustRecord::bootstrap(&key, language));
            record.apply(*outcome);
        }
        drop(records);

        *self.dirty.lock().expect("trust ledger lock poisoned") = true;
    }

    /// All records, sorted by (schema, pattern).
    pub fn all(&self) -> Vec<TrustRecord> {
        let records = self.records.lock().expect("trust ledger lock poisoned");
        let mut all: Vec<TrustRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| {
            (a.schema_id.as_str(), a.pattern.as_str()).cmp(&(b.schema_id.as_str(), b.pattern.as_str()))
        });
        all
    }

    /// Write the snapshot if anything changed since the last flush.
    pub fn flush(&self) -> Result<(), TrustError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let mut dirty = self.dirty.lock().expect("trust ledger lock poisoned");
        if !*dirty {
            return Ok(());
        }

        let records = self.records.lock().expect("trust ledger lock poisoned");
        store.save(&records)?;
        drop(records);

        *dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_always_verifies() {
        let ledger = TrustLedger::in_memory();
        for _ in 0..50 {
            assert!(ledger.should_verify("base-go", "func_def"));
        }
    }

    #[test]
    fn test_accuracy_and_rates() {
        let ledger = TrustLedger::in_memory();
        for _ in 0..20 {
            ledger.record("s", "p", "go", Outcome::Verified);
        }
        ledger.record("s", "p", "go", Outcome::Corrected);

        let record = ledger.score("s", "p").unwrap();
        assert_eq!(record.total, 21);
        assert!((record.accuracy_score() - 20.0 / 21.0).abs() < 1e-9);
        assert!((record.correction_rate() - 1.0 / 21.0).abs() < 1e-9);
        // 21 samples, accuracy ~0.952: medium (total < 50 blocks high)
        assert_eq!(record.trust_level, TrustLevel::Medium);
        assert_eq!(record.sampling_rate, MEDIUM_SAMPLING_RATE);
    }

    #[test]
    fn test_level_progression_and_regression() {
        let ledger = TrustLedger::in_memory();

        for i in 0..150u64 {
            ledger.record("s", "p", "go", Outcome::Verified);
            let level = ledger.score("s", "p").unwrap().trust_level;
            match i + 1 {
                n if n < MEDIUM_MIN_SAMPLES => assert_eq!(level, TrustLevel::Low),
                n if n < HIGH_MIN_SAMPLES => assert_eq!(level, TrustLevel::Medium),
                n if n < TRUSTED_MIN_SAMPLES => assert_eq!(level, TrustLevel::High),
                _ => assert_eq!(level, TrustLevel::Trusted),
            }
        }

        // Degrade: a run of rejections drags accuracy under every floor.
        for _ in 0..60 {
            ledger.record("s", "p", "go", Outcome::Rejected);
        }
        let record = ledger.score("s", "p").unwrap();
        assert!(record.accuracy_score() < MEDIUM_MIN_ACCURACY);
        assert_eq!(record.trust_level, TrustLevel::Low);
        assert_eq!(record.sampling_rate, LOW_SAMPLING_RATE);
    }

    #[test]
    fn test_sampling_converges_statistically() {
        let ledger = TrustLedger::in_memory();
        for _ in 0..200 {
            ledger.record("s", "p", "go", Outcome::Verified);
        }
        assert_eq!(
            ledger.score("s", "p").unwrap().trust_level,
            TrustLevel::Trusted
        );

        // Trusted samples at 5%; over 10k draws the observed rate should be
        // within a loose band around it. Statistical, not exact.
        let trials = 10_000;
        let verified = (0..trials)
            .filter(|_| ledger.should_verify("s", "p"))
            .count();
        let rate = verified as f64 / trials as f64;
        assert!(rate > 0.02 && rate < 0.10, "observed rate {rate}");
    }

    #[test]
    fn test_record_batch_matches_sequential() {
        let a = TrustLedger::in_memory();
        let b = TrustLedger::in_memory();

        let outcomes: Vec<_> = (0..30)
            .map(|_| ("s".to_string(), "p".to_string(), "go".to_string(), Outcome::Verified))
            .collect();
        a.record_batch(&outcomes);
        for _ in 0..30 {
            b.record("s", "p", "go", Outcome::Verified);
        }

        let ra = a.score("s", "p").unwrap();
        let rb = b.score("s", "p").unwrap();
        assert_eq!(ra.total, rb.total);
        assert_eq!(ra.trust_level, rb.trust_level);
    }
}
