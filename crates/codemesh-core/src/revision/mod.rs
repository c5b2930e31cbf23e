//! Git-aware revision tracking.
//!
//! Every extraction pass is anchored to a commit. This module wraps the
//! `git` binary for repository introspection and diffs, manages clones of
//! remote repositories, and (via [`RevisionTracker`]) persists the
//! append-only, per-branch-ordered history of extraction runs.

mod git;
mod sync;
mod tracker;

pub use git::{ChangeKind, CommitContext, FileChange, GitRepository};
pub use sync::{RepoSync, SyncAction, SyncResult};
pub use tracker::{plan_changes, ChangeSet, RevisionTracker};

use thiserror::Error;

/// Errors raised by revision-control operations.
///
/// These are environment-class: a failing `git` invocation that cannot be
/// degraded aborts the run rather than writing partial history.
#[derive(Debug, Error)]
pub enum RevisionError {
    #[error("Failed to execute git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("Not a git repository: {0}")]
    NotARepository(String),

    #[error("Repository has no commits")]
    NoCommits,

    #[error("Mesh store error: {0}")]
    Store(#[from] crate::mesh::MeshError),
}
