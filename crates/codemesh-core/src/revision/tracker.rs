//! Versioned extraction state over the mesh store.

use std::sync::Arc;

use tracing::{debug, info};

use super::{ChangeKind, FileChange, GitRepository, RevisionError};
use crate::mesh::model::ExtractionRun;
use crate::mesh::MeshDb;

/// The changed-file plan for an incremental run.
#[derive(Debug, Default)]
pub struct ChangeSet {
    /// Files to (re-)extract.
    pub extract: Vec<String>,
    /// Files whose entities should be dropped.
    pub remove: Vec<String>,
    /// High-similarity renames to apply as structural moves: (old, new).
    pub moves: Vec<(String, String)>,
}

/// Split a diff into extract / remove / move actions.
///
/// A rename at or above the similarity cutoff preserves entity identity
/// (move); below it the old path's entities are dropped and the new path
/// re-extracted.
pub fn plan_changes(changes: Vec<FileChange>, rename_similarity: u32) -> ChangeSet {
    let mut plan = ChangeSet::default();

    for change in changes {
        match change.kind {
            ChangeKind::Added | ChangeKind::Modified => plan.extract.push(change.path),
            ChangeKind::Deleted => plan.remove.push(change.path),
            ChangeKind::Renamed => {
                let old_path = change.old_path.unwrap_or_default();
                let similar = change
                    .similarity
                    .map(|s| s >= rename_similarity)
                    .unwrap_or(false);
                if similar {
                    plan.moves.push((old_path, change.path));
                } else {
                    plan.remove.push(old_path);
                    plan.extract.push(change.path);
                }
            }
        }
    }

    plan
}

/// Tracks extraction runs against repository revisions.
///
/// Owns the append-only, per-(project, branch) run history and translates
/// git diffs into incremental extraction plans.
pub struct RevisionTracker {
    db: Arc<MeshDb>,
    /// Rename similarity at or above which a rename is a structural move.
    rename_similarity: u32,
}

impl RevisionTracker {
    pub fn new(db: Arc<MeshDb>, rename_similarity: u32) -> Self {
        Self {
            db,
            rename_similarity,
        }
    }

    /// The last recorded extraction for a (project, branch), if any.
    pub async fn last_extraction(
        &self,
        project_id: &str,
        branch: &str,
    ) -> Result<Option<ExtractionRun>, RevisionError> {
        Ok(self.db.latest_run(project_id, branch).await?)
    }

    /// Ordered run history for a (project, branch), oldest first.
    pub async fn history(
        &self,
        project_id: &str,
        branch: &str,
    ) -> Result<Vec<ExtractionRun>, RevisionError> {
        Ok(self.db.run_history(project_id, branch).await?)
    }

    /// Append a run record, chained to its predecessor.
    ///
    /// Must be called only after all per-file results of the run are
    /// finalized; the chain append is transactional per (project, branch).
    pub async fn record_run(&self, run: &ExtractionRun) -> Result<(), RevisionError> {
        self.db.append_run(run).await?;
        info!(
            project = %run.project_id,
            branch = %run.branch,
            commit = %run.commit_sha[..7.min(run.commit_sha.len())],
            files = run.files_extracted,
            nodes = run.total_nodes,
            edges = run.total_edges,
            complete = run.complete,
            "recorded extraction run"
        );
        Ok(())
    }

    /// Compute the incremental plan between the last recorded run and the
    /// repository's current HEAD. Returns `None` when there is no prior run
    /// for this (project, branch) — the caller falls back to a full walk.
    pub async fn change_set(
        &self,
        repo: &GitRepository,
        project_id: &str,
        branch: &str,
        head_sha: &str,
    ) -> Result<Option<ChangeSet>, RevisionError> {
        let Some(last) = self.last_extraction(project_id, branch).await? else {
            return Ok(None);
        };

        if last.commit_sha == head_sha {
            debug!(project_id, branch, "no commits since last extraction");
            return Ok(Some(ChangeSet::default()));
        }

        let changes = repo.diff(&last.commit_sha, head_sha).await?;
        Ok(Some(plan_changes(changes, self.rename_similarity)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_similarity_rename_is_a_move() {
        let changes = vec![FileChange {
            kind: ChangeKind::Renamed,
            path: "src/new.rs".to_string(),
            old_path: Some("src/old.rs".to_string()),
            similarity: Some(95),
        }];
        let plan = plan_changes(changes, 80);
        assert_eq!(
            plan.moves,
            vec![("src/old.rs".to_string(), "src/new.rs".to_string())]
        );
        assert!(plan.extract.is_empty());
        assert!(plan.remove.is_empty());
    }

    #[test]
    fn test_low_similarity_rename_is_remove_plus_extract() {
        let changes = vec![FileChange {
            kind: ChangeKind::Renamed,
            path: "src/new.rs".to_string(),
            old_path: Some("src/old.rs".to_string()),
            similarity: Some(40),
        }];
        let plan = plan_changes(changes, 80);
        assert!(plan.moves.is_empty());
        assert_eq!(plan.remove, vec!["src/old.rs".to_string()]);
        assert_eq!(plan.extract, vec!["src/new.rs".to_string()]);
    }

    #[test]
    fn test_adds_modifies_deletes() {
        let changes = vec![
            FileChange {
                kind: ChangeKind::Added,
                path: "a.rs".to_string(),
                old_path: None,
                similarity: None,
            },
            FileChange {
                kind: ChangeKind::Modified,
                path: "b.rs".to_string(),
                old_path: None,
                similarity: None,
            },
            FileChange {
                kind: ChangeKind::Deleted,
                path: "c.rs".to_string(),
                old_path: None,
                similarity: None,
            },
        ];
        let plan = plan_changes(changes, 80);
        assert_eq!(plan.extract, vec!["a.rs", "b.rs"]);
        assert_eq!(plan.remove, vec!["c.rs"]);
    }
}
