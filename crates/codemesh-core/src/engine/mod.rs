//! The extraction engine: one end-to-end pass over a project.
//!
//! Resolves the commit context, computes the file set (full walk or
//! incremental diff since the last recorded run), routes every file through
//! the tiered extraction router on a bounded worker pool, commits nodes
//! before edges, and finally — single writer, after all per-file results are
//! in — appends the run record to the branch's history chain.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use ignore::WalkBuilder;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ExtractionConfig;
use crate::mesh::model::ExtractionRun;
use crate::mesh::{MeshDb, MeshError};
use crate::revision::{GitRepository, RevisionError, RevisionTracker};
use crate::router::{ExtractionRouter, FileExtractionResult};
use crate::trust::TrustLedger;

/// Engine-level (environment-class) errors: these abort the run and no
/// run-history record is written.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Revision error: {0}")]
    Revision(#[from] RevisionError),

    #[error("Mesh store error: {0}")]
    Mesh(#[from] MeshError),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Parameters for one extraction pass.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub project_id: String,
    pub repo_path: PathBuf,
    /// Force a full walk even when incremental state exists.
    pub full: bool,
}

/// Statistics summary of one pass.
#[derive(Debug)]
pub struct RunSummary {
    pub project_id: String,
    pub branch: String,
    pub commit_sha: String,
    /// Every file submitted for extraction has exactly one entry here.
    pub results: Vec<FileExtractionResult>,
    pub files_extracted: u64,
    /// Files the cancellation flag prevented from being processed.
    pub files_skipped: u64,
    pub total_nodes: u64,
    pub total_edges: u64,
    pub unresolved_patterns: u64,
    pub errors: u64,
    /// Edges dropped because an endpoint did not exist (data errors).
    pub dangling_edges: u64,
    pub complete: bool,
    /// Id of the recorded run; absent when cancellation struck before any
    /// file finished.
    pub run_id: Option<String>,
}

/// Orchestrates full and incremental extraction passes.
pub struct ExtractionEngine {
    db: Arc<MeshDb>,
    router: Arc<ExtractionRouter>,
    tracker: RevisionTracker,
    ledger: Arc<TrustLedger>,
    config: ExtractionConfig,
}

impl ExtractionEngine {
    pub fn new(
        db: Arc<MeshDb>,
        router: Arc<ExtractionRouter>,
        ledger: Arc<TrustLedger>,
        config: ExtractionConfig,
    ) -> Self {
        let tracker = RevisionTracker::new(Arc::clone(&db), config.rename_similarity);
        Self {
            db,
            router,
            tracker,
            ledger,
            config,
        }
    }

    /// Run one pass. See [`run_with_cancel`](Self::run_with_cancel).
    pub async fn run(&self, request: &RunRequest) -> Result<RunSummary, EngineError> {
        self.run_with_cancel(request, Arc::new(AtomicBool::new(false)))
            .await
    }

    /// Run one pass, honoring a cancellation flag.
    ///
    /// Cancellation is best-effort: files already completed are committed,
    /// no new files are dispatched, and the run record — if one is written
    /// at all — carries `complete = false`.
    pub async fn run_with_cancel(
        &self,
        request: &RunRequest,
        cancel: Arc<AtomicBool>,
    ) -> Result<RunSummary, EngineError> {
        let repo = GitRepository::open(&request.repo_path).await?;
        let context = repo.context().await?;

        // Decide the file set: incremental when we have prior state, full
        // walk otherwise.
        let files = if request.full {
            self.walk_files(&request.repo_path)?
        } else {
            match self
                .tracker
                .change_set(&repo, &request.project_id, &context.branch, &context.sha)
                .await?
            {
                None => self.walk_files(&request.repo_path)?,
                Some(plan) => {
                    for (old, new) in &plan.moves {
                        self.db
                            .move_file_entities(&request.project_id, old, new)
                            .await?;
                    }
                    for path in &plan.remove {
                        self.db
                            .remove_file_entities(&request.project_id, path)
                            .await?;
                    }
                    plan.extract
                        .into_iter()
                        .filter(|p| self.should_extract(Path::new(p)))
                        .collect()
                }
            }
        };

        info!(
            project = %request.project_id,
            branch = %context.branch,
            commit = %context.short_sha,
            files = files.len(),
            "starting extraction pass"
        );

        // Route files through the bounded worker pool. Tier-1 work and any
        // Tier-2/3 escalation latency interleave freely across files.
        let submitted = files.len() as u64;
        let repo_root = request.repo_path.clone();
        let project_id = request.project_id.clone();

        let results: Vec<Option<FileExtractionResult>> = futures::stream::iter(
            files.into_iter().map(|rel_path| {
                let router = Arc::clone(&self.router);
                let cancel = Arc::clone(&cancel);
                let repo_root = repo_root.clone();
                let project_id = project_id.clone();
                async move {
                    if cancel.load(Ordering::Relaxed) {
                        return None;
                    }
                    Some(extract_one(&router, &repo_root, &project_id, &rel_path).await)
                }
            }),
        )
        .buffer_unordered(self.config.worker_pool_width)
        .collect()
        .await;

        let results: Vec<FileExtractionResult> = results.into_iter().flatten().collect();
        let files_extracted = results.len() as u64;
        let files_skipped = submitted - files_extracted;
        let cancelled = cancel.load(Ordering::Relaxed);

        // Commit all nodes before any edge: an edge may reference an entity
        // from any file of the same run.
        let mut total_nodes = 0u64;
        for result in &results {
            self.db
                .remove_file_entities(&request.project_id, &result.file_path)
                .await?;
            for node in &result.nodes {
                self.db.upsert_entity(node).await?;
                total_nodes += 1;
            }
        }

        let mut total_edges = 0u64;
        let mut dangling_edges = 0u64;
        for result in &results {
            for edge in &result.edges {
                match self.db.upsert_relation(edge).await {
                    Ok(()) => total_edges += 1,
                    // Data error: log and skip the edge, keep the run.
                    Err(MeshError::DanglingRelation { relation, entity }) => {
                        warn!(relation, entity, file = %result.file_path, "skipping dangling edge");
                        dangling_edges += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        // End-of-run barrier: the run record is written only after every
        // per-file result is finalized. A cancelled pass that committed
        // nothing writes no record at all.
        let complete = !cancelled;
        let run_id = if complete || files_extracted > 0 {
            let run = ExtractionRun::from_context(
                &request.project_id,
                &context,
                files_extracted,
                total_nodes,
                total_edges,
                complete,
            );
            self.tracker.record_run(&run).await?;
            Some(run.id)
        } else {
            None
        };

        if let Err(e) = self.ledger.flush() {
            warn!(error = %e, "trust ledger flush failed");
        }

        let unresolved_patterns = results
            .iter()
            .map(|r| r.unresolved_patterns.len() as u64)
            .sum();
        let errors = results.iter().map(|r| r.errors.len() as u64).sum();

        Ok(RunSummary {
            project_id: request.project_id.clone(),
            branch: context.branch,
            commit_sha: context.sha,
            results,
            files_extracted,
            files_skipped,
            total_nodes,
            total_edges,
            unresolved_patterns,
            errors,
            dangling_edges,
            complete,
            run_id,
        })
    }

    /// Walk the project tree for a full extraction.
    fn walk_files(&self, root: &Path) -> Result<Vec<String>, EngineError> {
        let mut files = Vec::new();

        let walker = WalkBuilder::new(root).hidden(true).git_ignore(true).build();
        for entry in walker.flatten() {
            let path = entry.path();
            if !path.is_file() || !self.should_extract(path) {
                continue;
            }
            if let Ok(metadata) = path.metadata() {
                if metadata.len() > self.config.max_file_size {
                    continue;
                }
            }

            let rel = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();
            files.push(rel);
        }

        files.sort();
        Ok(files)
    }

    /// Extension and directory filters.
    fn should_extract(&self, path: &Path) -> bool {
        let excluded = path.components().any(|c| {
            c.as_os_str()
                .to_str()
                .map(|name| self.config.exclude_dirs.iter().any(|d| d == name))
                .unwrap_or(false)
        });
        if excluded {
            return false;
        }

        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.config.include_extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }
}

/// Extract one file, turning read failures into an error-carrying result so
/// every submitted file appears in exactly one record.
async fn extract_one(
    router: &ExtractionRouter,
    repo_root: &Path,
    project_id: &str,
    rel_path: &str,
) -> FileExtractionResult {
    let abs = repo_root.join(rel_path);
    match tokio::fs::read_to_string(&abs).await {
        Ok(content) => router.extract_file(project_id, rel_path, &content).await,
        Err(e) => FileExtractionResult {
            file_path: rel_path.to_string(),
            nodes: Vec::new(),
            edges: Vec::new(),
            confidence: 0.0,
            tier: crate::mesh::model::Tier::Deterministic,
            schemas_used: Vec::new(),
            unresolved_patterns: Vec::new(),
            errors: vec![format!("failed to read {rel_path}: {e}")],
        },
    }
}
