use codemesh_core::trust::{Outcome, TrustLedger, TrustLevel, TrustStore};
use tempfile::TempDir;

#[test]
fn test_bootstrap_always_verifies() {
    let ledger = TrustLedger::in_memory();
    // No record exists: every draw must verify, regardless of randomness.
    for _ in 0..100 {
        assert!(ledger.should_verify("base-go", "func_def"));
    }
}

#[test]
fn test_twenty_verified_one_corrected_is_medium() {
    // 20 verified then 1 corrected: accuracy 20/21 ≈ 0.952, correction
    // ≈ 0.048, but total = 21 < 50, so the level stays medium at 0.5.
    let ledger = TrustLedger::in_memory();
    for _ in 0..20 {
        ledger.record("S", "P", "go", Outcome::Verified);
    }
    ledger.record("S", "P", "go", Outcome::Corrected);

    let record = ledger.score("S", "P").unwrap();
    assert_eq!(record.total, 21);
    assert!((record.accuracy_score() - 0.952).abs() < 0.001);
    assert!((record.correction_rate() - 0.048).abs() < 0.001);
    assert_eq!(record.trust_level, TrustLevel::Medium);
    assert!((record.sampling_rate - 0.5).abs() < f64::EPSILON);
}

#[test]
fn test_levels_never_skip_on_gradual_growth() {
    // Pure verified outcomes: the level must pass through medium and high
    // on the way to trusted, never jumping a threshold it hasn't reached.
    let ledger = TrustLedger::in_memory();
    let mut seen = Vec::new();

    for _ in 0..120 {
        ledger.record("S", "P", "go", Outcome::Verified);
        let level = ledger.score("S", "P").unwrap().trust_level;
        if seen.last() != Some(&level) {
            seen.push(level);
        }
    }

    assert_eq!(
        seen,
        vec![
            TrustLevel::Low,
            TrustLevel::Medium,
            TrustLevel::High,
            TrustLevel::Trusted
        ]
    );
}

#[test]
fn test_trusted_pattern_can_regress_to_low() {
    let ledger = TrustLedger::in_memory();
    for _ in 0..200 {
        ledger.record("S", "P", "go", Outcome::Verified);
    }
    assert_eq!(ledger.score("S", "P").unwrap().trust_level, TrustLevel::Trusted);

    for _ in 0..120 {
        ledger.record("S", "P", "go", Outcome::Rejected);
    }
    let record = ledger.score("S", "P").unwrap();
    assert_eq!(record.trust_level, TrustLevel::Low);
    assert!((record.sampling_rate - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_sampling_rate_converges_over_many_draws() {
    // The verify decision is a random draw, so assert convergence over many
    // trials instead of exact counts.
    let ledger = TrustLedger::in_memory();
    for _ in 0..60 {
        ledger.record("S", "P", "go", Outcome::Verified);
    }
    let record = ledger.score("S", "P").unwrap();
    assert_eq!(record.trust_level, TrustLevel::High);

    let trials = 20_000;
    let verified = (0..trials).filter(|_| ledger.should_verify("S", "P")).count();
    let observed = verified as f64 / trials as f64;
    assert!(
        (observed - record.sampling_rate).abs() < 0.05,
        "observed {observed}, expected ~{}",
        record.sampling_rate
    );
}

#[test]
fn test_snapshot_round_trip() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("trust.json");

    let ledger = TrustLedger::open(TrustStore::new(&path));
    for _ in 0..30 {
        ledger.record("base-ts", "class_def", "typescript", Outcome::Verified);
    }
    ledger.record("base-ts", "class_def", "typescript", Outcome::Rejected);
    ledger.flush().unwrap();

    let reloaded = TrustLedger::open(TrustStore::new(&path));
    let record = reloaded.score("base-ts", "class_def").unwrap();
    assert_eq!(record.total, 31);
    assert_eq!(record.verified, 30);
    assert_eq!(record.rejected, 1);
    assert_eq!(record.trust_level, TrustLevel::Medium);
}

#[test]
fn test_corrupt_snapshot_is_nonfatal() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("trust.json");
    std::fs::write(&path, "definitely not json").unwrap();

    // Extraction must never crash over a bad trust file: the ledger starts
    // empty and everything reverts to bootstrap.
    let ledger = TrustLedger::open(TrustStore::new(&path));
    assert!(ledger.all().is_empty());
    assert!(ledger.should_verify("any", "pattern"));
}

#[test]
fn test_records_survive_retirement() {
    let ledger = TrustLedger::in_memory();
    ledger.record("old-schema", "dead_pattern", "perl", Outcome::Verified);

    // Nothing ever deletes a record; history stays queryable.
    let all = ledger.all();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].schema_id, "old-schema");
}
