//! Extraction run records: one per end-to-end pass over a project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::revision::CommitContext;

/// Immutable record of one extraction pass, anchored to a commit.
///
/// Created exclusively by the revision tracker at the end of a pass and
/// chained to the previous run for the same (project, branch) via a single
/// "next" edge, so each branch's history is a linked list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRun {
    pub id: String,
    pub project_id: String,
    pub branch: String,
    pub commit_sha: String,
    pub commit_message: String,
    pub author: String,
    pub committed_at: DateTime<Utc>,
    pub run_at: DateTime<Utc>,
    pub files_extracted: u64,
    pub total_nodes: u64,
    pub total_edges: u64,
    pub tags: Vec<String>,
    /// Whether the working tree was clean at extraction time.
    pub clean: bool,
    pub remote_url: Option<String>,
    /// False when the run was cancelled and committed best-effort partial
    /// results; such a record never implies full coverage.
    pub complete: bool,
}

impl ExtractionRun {
    /// Build a run record from a commit context and pass totals.
    pub fn from_context(
        project_id: impl Into<String>,
        context: &CommitContext,
        files_extracted: u64,
        total_nodes: u64,
        total_edges: u64,
        complete: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            branch: context.branch.clone(),
            commit_sha: context.sha.clone(),
            commit_message: context.message.clone(),
            author: context.author.clone(),
            committed_at: context.committed_at,
            run_at: Utc::now(),
            files_extracted,
            total_nodes,
            total_edges,
            tags: context.tags.clone(),
            clean: context.clean,
            remote_url: context.remote_url.clone(),
            complete,
        }
    }
}
