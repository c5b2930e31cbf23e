//! Clone and refresh remote repositories for extraction.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::info;

use super::{GitRepository, RevisionError};

/// What a sync operation actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Cloned,
    Pulled,
    /// Already up to date.
    Noop,
}

/// Result of a clone/pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub action: SyncAction,
    /// HEAD after the sync.
    pub commit: String,
    /// Files changed between the previous and new HEAD (empty for clones).
    pub changed_files: Vec<String>,
}

/// Manages local clones of remote repositories under one directory.
pub struct RepoSync {
    clone_dir: PathBuf,
}

impl RepoSync {
    pub fn new(clone_dir: impl Into<PathBuf>) -> Self {
        Self {
            clone_dir: clone_dir.into(),
        }
    }

    /// Local path a remote URL maps to: the repository name with any
    /// `.git` suffix stripped.
    pub fn repo_path(&self, repo_url: &str) -> PathBuf {
        let name = repo_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(repo_url);
        let name = name.strip_suffix(".git").unwrap_or(name);
        self.clone_dir.join(name)
    }

    /// Clone if absent, otherwise fetch and hard-reset to origin.
    pub async fn sync(&self, repo_url: &str, branch: &str) -> Result<SyncResult, RevisionError> {
        let path = self.repo_path(repo_url);
        if path.exists() {
            self.pull(&path, branch).await
        } else {
            self.clone(repo_url, branch, &path).await
        }
    }

    async fn clone(
        &self,
        repo_url: &str,
        branch: &str,
        path: &Path,
    ) -> Result<SyncResult, RevisionError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!(url = repo_url, branch, path = %path.display(), "cloning repository");
        let target = path.display().to_string();
        run_git(
            None,
            &[
                "clone",
                "--branch",
                branch,
                "--single-branch",
                repo_url,
                &target,
            ],
        )
        .await?;

        let repo = GitRepository::open(path).await?;
        let context = repo.context().await?;

        Ok(SyncResult {
            action: SyncAction::Cloned,
            commit: context.sha,
            changed_files: Vec::new(),
        })
    }

    async fn pull(&self, path: &Path, branch: &str) -> Result<SyncResult, RevisionError> {
        let repo = GitRepository::open(path).await?;
        let old = repo.context().await?.sha;

        run_git(Some(path), &["fetch", "origin", branch]).await?;
        let origin_ref = format!("origin/{branch}");
        run_git(Some(path), &["reset", "--hard", &origin_ref]).await?;

        let new = repo.context().await?.sha;
        if old == new {
            return Ok(SyncResult {
                action: SyncAction::Noop,
                commit: new,
                changed_files: Vec::new(),
            });
        }

        let changed_files = repo
            .diff(&old, &new)
            .await?
            .into_iter()
            .map(|c| c.path)
            .collect();

        info!(path = %path.display(), commit = %new[..7.min(new.len())], "pulled repository");

        Ok(SyncResult {
            action: SyncAction::Pulled,
            commit: new,
            changed_files,
        })
    }
}

async fn run_git(cwd: Option<&Path>, args: &[&str]) -> Result<(), RevisionError> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    let output = cmd.output().await?;

    if !output.status.success() {
        return Err(RevisionError::Command {
            command: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_path_from_url() {
        let sync = RepoSync::new("/tmp/repos");
        assert_eq!(
            sync.repo_path("https://github.com/acme/widgets.git"),
            PathBuf::from("/tmp/repos/widgets")
        );
        assert_eq!(
            sync.repo_path("git@github.com:acme/widgets.git"),
            PathBuf::from("/tmp/repos/widgets")
        );
        assert_eq!(
            sync.repo_path("https://github.com/acme/widgets/"),
            PathBuf::from("/tmp/repos/widgets")
        );
    }
}
