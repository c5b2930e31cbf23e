//! Durable snapshot of trust records.
//!
//! The snapshot is a versioned JSON file: read once at startup, written on
//! explicit flush. Corruption or absence is non-fatal by design — trust
//! data is an optimization, and losing it only means patterns revert to
//! bootstrap/always-verify.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{TrustError, TrustKey, TrustRecord};
use crate::config::TRUST_STORE_FORMAT_VERSION;

/// On-disk snapshot format.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    /// Format version for forward compatibility.
    version: u32,
    records: Vec<TrustRecord>,
}

/// File-backed trust record store.
pub struct TrustStore {
    path: PathBuf,
}

impl TrustStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load all records. Missing, unreadable, corrupt, or future-versioned
    /// snapshots all yield an empty map — never an error.
    pub fn load(&self) -> HashMap<TrustKey, TrustRecord> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(_) => return HashMap::new(),
        };

        let snapshot: Snapshot = match serde_json::from_str(&json) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "trust store unreadable, starting empty");
                return HashMap::new();
            }
        };

        if snapshot.version > TRUST_STORE_FORMAT_VERSION {
            warn!(
                path = %self.path.display(),
                version = snapshot.version,
                "trust store from a newer format, starting empty"
            );
            return HashMap::new();
        }

        snapshot
            .records
            .into_iter()
            .map(|r| (TrustKey::new(r.schema_id.clone(), r.pattern.clone()), r))
            .collect()
    }

    /// Write a snapshot of the given records.
    pub fn save(&self, records: &HashMap<TrustKey, TrustRecord>) -> Result<(), TrustError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| TrustError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }

        let mut sorted: Vec<TrustRecord> = records.values().cloned().collect();
        sorted.sort_by(|a, b| {
            (a.schema_id.as_str(), a.pattern.as_str()).cmp(&(b.schema_id.as_str(), b.pattern.as_str()))
        });

        let snapshot = Snapshot {
            version: TRUST_STORE_FORMAT_VERSION,
            records: sorted,
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&self.path, json).map_err(|source| TrustError::Io {
            path: self.path.display().to_string(),
            source,
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::{Outcome, TrustLedger};

    #[test]
    fn test_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("trust.json");

        let ledger = TrustLedger::open(TrustStore::new(&path));
        for _ in 0..25 {
            ledger.record("base-go", "func_def", "go", Outcome::Verified);
        }
        ledger.flush().unwrap();

        let reloaded = TrustLedger::open(TrustStore::new(&path));
        let record = reloaded.score("base-go", "func_def").unwrap();
        assert_eq!(record.total, 25);
        assert_eq!(record.language, "go");
    }

    #[test]
    fn test_corrupt_store_starts_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("trust.json");
        fs::write(&path, "{ not json at all").unwrap();

        let ledger = TrustLedger::open(TrustStore::new(&path));
        assert!(ledger.score("s", "p").is_none());
        assert!(ledger.should_verify("s", "p"));
    }

    #[test]
    fn test_future_version_starts_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("trust.json");
        fs::write(&path, r#"{"version": 999, "records": []}"#).unwrap();

        let store = TrustStore::new(&path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_flush_is_idempotent_when_clean() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("trust.json");

        let ledger = TrustLedger::open(TrustStore::new(&path));
        ledger.record("s", "p", "go", Outcome::Verified);
        ledger.flush().unwrap();

        let mtime = fs::metadata(&path).unwrap().modified().unwrap();
        ledger.flush().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), mtime);
    }
}
