//! Thin wrapper over the `git` binary.
//!
//! We spawn git instead of binding libgit2: process spawn cost is negligible
//! next to extraction work, it works with whatever git the host has, and
//! name-status diffs with rename scoring come for free.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::RevisionError;

/// Metadata for the repository's current HEAD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitContext {
    pub sha: String,
    pub short_sha: String,
    pub message: String,
    pub author: String,
    pub committed_at: DateTime<Utc>,
    /// Branch name; in detached-HEAD state this degrades to the short sha.
    pub branch: String,
    /// Tags pointing at HEAD.
    pub tags: Vec<String>,
    /// Whether the working tree has no uncommitted changes.
    pub clean: bool,
    /// `origin` URL, absent when no remote is configured.
    pub remote_url: Option<String>,
}

/// How a file changed between two revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// One entry of a name-status diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub kind: ChangeKind,
    /// Current path (new path for renames).
    pub path: String,
    /// Previous path, only set for renames.
    pub old_path: Option<String>,
    /// Rename similarity percentage (git's score), only set for renames.
    pub similarity: Option<u32>,
}

/// A local git repository.
pub struct GitRepository {
    root: PathBuf,
}

impl GitRepository {
    /// Open a repository at `root`, verifying it is actually one.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, RevisionError> {
        let repo = Self {
            root: root.as_ref().to_path_buf(),
        };
        let inside = repo
            .git(&["rev-parse", "--is-inside-work-tree"])
            .await
            .map_err(|_| RevisionError::NotARepository(repo.root.display().to_string()))?;
        if inside.trim() != "true" {
            return Err(RevisionError::NotARepository(
                repo.root.display().to_string(),
            ));
        }
        Ok(repo)
    }

    /// Repository root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current commit context with best-effort degradation: detached HEAD
    /// reports the short sha as branch, a missing remote reports no URL.
    /// A repository with no commits at all is an error.
    pub async fn context(&self) -> Result<CommitContext, RevisionError> {
        let head = self
            .git(&["log", "-1", "--format=%H%x00%h%x00%an <%ae>%x00%aI%x00%s"])
            .await
            .map_err(|e| match e {
                RevisionError::Command { .. } => RevisionError::NoCommits,
                other => other,
            })?;

        let mut parts = head.trim_end().split('\0');
        let sha = parts.next().unwrap_or_default().to_string();
        let short_sha = parts.next().unwrap_or_default().to_string();
        let author = parts.next().unwrap_or_default().to_string();
        let committed_at = parts
            .next()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let message = parts.next().unwrap_or_default().to_string();

        if sha.is_empty() {
            return Err(RevisionError::NoCommits);
        }

        // Detached HEAD: fall back to the short sha as the branch name.
        let branch = match self.git(&["symbolic-ref", "--short", "HEAD"]).await {
            Ok(name) => name.trim().to_string(),
            Err(_) => short_sha.clone(),
        };

        let tags = self
            .git(&["tag", "--points-at", "HEAD"])
            .await
            .map(|out| {
                out.lines()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let clean = self
            .git(&["status", "--porcelain"])
            .await
            .map(|out| out.trim().is_empty())
            .unwrap_or(false);

        let remote_url = self
            .git(&["remote", "get-url", "origin"])
            .await
            .ok()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        debug!(sha = %short_sha, %branch, clean, "resolved commit context");

        Ok(CommitContext {
            sha,
            short_sha,
            message,
            author,
            committed_at,
            branch,
            tags,
            clean,
            remote_url,
        })
    }

    /// Name-status diff between two revisions, with rename detection.
    pub async fn diff(&self, from: &str, to: &str) -> Result<Vec<FileChange>, RevisionError> {
        let out = self
            .git(&["diff", "--name-status", "-M", from, to])
            .await?;
        Ok(parse_name_status(&out))
    }

    /// All files tracked at HEAD.
    pub async fn tracked_files(&self) -> Result<Vec<String>, RevisionError> {
        let out = self.git(&["ls-files"]).await?;
        Ok(out
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    async fn git(&self, args: &[&str]) -> Result<String, RevisionError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .await?;

        if !output.status.success() {
            return Err(RevisionError::Command {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parse `git diff --name-status -M` output.
///
/// Lines look like:
/// ```text
/// A\tsrc/new.rs
/// M\tsrc/changed.rs
/// D\tsrc/gone.rs
/// R087\tsrc/old.rs\tsrc/renamed.rs
/// ```
pub(crate) fn parse_name_status(out: &str) -> Vec<FileChange> {
    let mut changes = Vec::new();

    for line in out.lines() {
        let mut fields = line.split('\t');
        let Some(status) = fields.next() else { continue };
        let status = status.trim();
        if status.is_empty() {
            continue;
        }

        match status.chars().next() {
            Some('A') => {
                if let Some(path) = fields.next() {
                    changes.push(FileChange {
                        kind: ChangeKind::Added,
                        path: path.to_string(),
                        old_path: None,
                        similarity: None,
                    });
                }
            }
            Some('M') => {
                if let Some(path) = fields.next() {
                    changes.push(FileChange {
                        kind: ChangeKind::Modified,
                        path: path.to_string(),
                        old_path: None,
                        similarity: None,
                    });
                }
            }
            Some('D') => {
                if let Some(path) = fields.next() {
                    changes.push(FileChange {
                        kind: ChangeKind::Deleted,
                        path: path.to_string(),
                        old_path: None,
                        similarity: None,
                    });
                }
            }
            Some('R') => {
                let similarity = status[1..].parse::<u32>().ok();
                if let (Some(old_path), Some(new_path)) = (fields.next(), fields.next()) {
                    changes.push(FileChange {
                        kind: ChangeKind::Renamed,
                        path: new_path.to_string(),
                        old_path: Some(old_path.to_string()),
                        similarity,
                    });
                }
            }
            // Copies, type changes, unmerged: treat as modifications of the
            // final path so they are never silently dropped.
            Some(_) => {
                if let Some(path) = fields.last() {
                    changes.push(FileChange {
                        kind: ChangeKind::Modified,
                        path: path.to_string(),
                        old_path: None,
                        similarity: None,
                    });
                }
            }
            None => {}
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_status() {
        let out = "A\tsrc/new.rs\nM\tsrc/changed.rs\nD\tsrc/gone.rs\nR087\tsrc/old.rs\tsrc/renamed.rs\n";
        let changes = parse_name_status(out);
        assert_eq!(changes.len(), 4);

        assert_eq!(changes[0].kind, ChangeKind::Added);
        assert_eq!(changes[0].path, "src/new.rs");

        assert_eq!(changes[1].kind, ChangeKind::Modified);
        assert_eq!(changes[2].kind, ChangeKind::Deleted);

        assert_eq!(changes[3].kind, ChangeKind::Renamed);
        assert_eq!(changes[3].old_path.as_deref(), Some("src/old.rs"));
        assert_eq!(changes[3].path, "src/renamed.rs");
        assert_eq!(changes[3].similarity, Some(87));
    }

    #[test]
    fn test_parse_name_status_ignores_blank_lines() {
        let changes = parse_name_status("\n\nM\ta.rs\n\n");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "a.rs");
    }

    #[test]
    fn test_parse_copy_falls_back_to_modified() {
        let changes = parse_name_status("C075\tsrc/a.rs\tsrc/b.rs\n");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Modified);
        assert_eq!(changes[0].path, "src/b.rs");
    }
}
