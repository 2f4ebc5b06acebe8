//! Git collaborator: repository lookups through git2, mutations through the
//! `git` CLI so hooks and credential helpers behave as they do for the user.

use super::{capture, run_checked, VersionControl};
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use git2::{BranchType, Repository};
use std::path::{Path, PathBuf};

/// Author name: git `user.name`, then `$USER` / `$USERNAME`, then "unknown"
pub fn author_name(dir: &Path) -> String {
    if let Ok(repo) = Repository::discover(dir) {
        if let Ok(config) = repo.config() {
            if let Ok(name) = config.get_string("user.name") {
                return name;
            }
        }
    }

    if let Ok(user) = std::env::var("USER") {
        return user;
    }
    if let Ok(user) = std::env::var("USERNAME") {
        return user;
    }

    "unknown".to_string()
}

#[derive(Debug, Clone)]
pub struct GitCli {
    command: String,
    remote: String,
    cwd: PathBuf,
}

impl GitCli {
    pub fn new(command: impl Into<String>, remote: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            remote: remote.into(),
            cwd: cwd.into(),
        }
    }

    async fn git(&self, args: &[&str]) -> PipelineResult<String> {
        run_checked(&self.command, args, &self.cwd).await
    }

    fn repository(&self) -> PipelineResult<Repository> {
        Repository::discover(&self.cwd)
            .map_err(|e| PipelineError::collaborator("git", None, e.message().to_string()))
    }
}

#[async_trait(?Send)]
impl VersionControl for GitCli {
    async fn current_branch(&self) -> PipelineResult<String> {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    async fn branch_exists(&self, branch: &str) -> PipelineResult<bool> {
        let repo = self.repository()?;
        if repo.find_branch(branch, BranchType::Local).is_ok() {
            return Ok(true);
        }
        let remote_name = format!("{}/{}", self.remote, branch);
        let exists = repo.find_branch(&remote_name, BranchType::Remote).is_ok();
        Ok(exists)
    }

    async fn is_dirty(&self) -> PipelineResult<bool> {
        let status = self.git(&["status", "--porcelain"]).await?;
        Ok(!status.is_empty())
    }

    async fn stash_push(&self, message: &str) -> PipelineResult<()> {
        self.git(&["stash", "push", "--include-untracked", "-m", message])
            .await
            .map(|_| ())
    }

    async fn stash_pop(&self) -> PipelineResult<()> {
        self.git(&["stash", "pop"]).await.map(|_| ())
    }

    async fn checkout(&self, branch: &str) -> PipelineResult<()> {
        self.git(&["checkout", branch]).await.map(|_| ())
    }

    async fn create_branch(&self, branch: &str) -> PipelineResult<()> {
        self.git(&["checkout", "-b", branch]).await.map(|_| ())
    }

    async fn stage_all(&self) -> PipelineResult<()> {
        self.git(&["add", "-A"]).await.map(|_| ())
    }

    async fn commit(&self, message: &str) -> PipelineResult<bool> {
        // `diff --cached --quiet` exits 0 when the index matches HEAD
        let staged = capture(&self.command, &["diff", "--cached", "--quiet"], &self.cwd).await?;
        if staged.status.success() {
            tracing::info!("nothing staged, skipping commit");
            return Ok(false);
        }
        self.git(&["commit", "-m", message]).await?;
        Ok(true)
    }

    async fn push(&self, remote: &str, branch: &str) -> PipelineResult<()> {
        self.git(&["push", "--set-upstream", remote, branch])
            .await
            .map(|_| ())
    }

    async fn user_name(&self) -> Option<String> {
        let repo = Repository::discover(&self.cwd).ok()?;
        let config = repo.config().ok()?;
        config.get_string("user.name").ok()
    }
}
