//! External Collaborators
//!
//! The pipeline reaches git, the code-review CLI and the project's test
//! runner only through the traits in this module. The binary wires in the
//! process-backed implementations; tests substitute in-memory fakes.

pub mod git;
pub mod review;
pub mod test_runner;

use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;

pub use git::{author_name, GitCli};
pub use review::GhCli;
pub use test_runner::CommandTestRunner;

/// Result of one test-runner invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub passed: bool,
    pub exit_code: Option<i32>,
    /// Combined stdout/stderr
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub url: String,
    pub number: Option<u64>,
}

/// Version-control operations used by the version, commit and PR stages
#[async_trait(?Send)]
pub trait VersionControl {
    async fn current_branch(&self) -> PipelineResult<String>;

    /// Local or remote-tracking branch with this name exists
    async fn branch_exists(&self, branch: &str) -> PipelineResult<bool>;

    /// Working tree has staged, unstaged or untracked changes
    async fn is_dirty(&self) -> PipelineResult<bool>;

    async fn stash_push(&self, message: &str) -> PipelineResult<()>;

    async fn stash_pop(&self) -> PipelineResult<()>;

    async fn checkout(&self, branch: &str) -> PipelineResult<()>;

    /// Create a branch from HEAD and switch to it
    async fn create_branch(&self, branch: &str) -> PipelineResult<()>;

    async fn stage_all(&self) -> PipelineResult<()>;

    /// Commit staged changes; `Ok(false)` when there was nothing to commit
    async fn commit(&self, message: &str) -> PipelineResult<bool>;

    async fn push(&self, remote: &str, branch: &str) -> PipelineResult<()>;

    /// Configured author name, if any
    async fn user_name(&self) -> Option<String>;
}

/// Code-review host (pull requests)
#[async_trait(?Send)]
pub trait ReviewService {
    /// Open pull request whose head is `branch`
    async fn find_pull_request(&self, branch: &str) -> PipelineResult<Option<PullRequest>>;

    async fn create_pull_request(
        &self,
        branch: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> PipelineResult<PullRequest>;
}

#[async_trait(?Send)]
pub trait TestRunner {
    /// Program that must resolve on PATH for the tooling stage
    fn program(&self) -> &str;

    /// Human-readable command line
    fn describe(&self) -> String;

    async fn run(&self) -> PipelineResult<TestOutcome>;
}

/// The full set of collaborators a pipeline run needs
pub struct Collaborators {
    pub vcs: Box<dyn VersionControl>,
    pub review: Box<dyn ReviewService>,
    pub tests: Box<dyn TestRunner>,
}

impl Collaborators {
    /// Process-backed collaborators rooted at the project directory
    pub fn from_config(config: &Config, project_root: &Path, show_progress: bool) -> Self {
        Self {
            vcs: Box::new(GitCli::new(&config.git.command, &config.git.remote, project_root)),
            review: Box::new(GhCli::new(&config.pull_request.command, project_root)),
            tests: Box::new(CommandTestRunner::new(
                &config.tests.command,
                config.tests.args.clone(),
                project_root,
                show_progress,
            )),
        }
    }
}

/// Run a program to completion, capturing its output.
///
/// A program that cannot be spawned is a collaborator failure without an
/// exit code; a non-zero exit is returned as-is for the caller to judge.
pub(crate) async fn capture(program: &str, args: &[&str], cwd: &Path) -> PipelineResult<Output> {
    tracing::debug!(program, ?args, cwd = %cwd.display(), "running collaborator");
    Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            let message = if e.kind() == std::io::ErrorKind::NotFound {
                format!(
                    "command '{}' not found. Please ensure it is installed and in your PATH.",
                    program
                )
            } else {
                e.to_string()
            };
            PipelineError::collaborator(program, None, message)
        })
}

/// Like [`capture`], but a non-zero exit becomes a `CollaboratorFailure`
/// carrying stderr. Returns trimmed stdout.
pub(crate) async fn run_checked(program: &str, args: &[&str], cwd: &Path) -> PipelineResult<String> {
    let output = capture(program, args, cwd).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(PipelineError::collaborator(
            format!("{} {}", program, args.first().copied().unwrap_or_default()),
            output.status.code(),
            stderr,
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
