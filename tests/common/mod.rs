#![allow(dead_code)]

use async_trait::async_trait;
use changegate::collaborators::{
    Collaborators, PullRequest, ReviewService, TestOutcome, TestRunner, VersionControl,
};
use changegate::config::Config;
use changegate::engine::{Engine, RunMode};
use changegate::error::{PipelineError, PipelineResult, StageFailure};
use changegate::models::Stage;
use changegate::StageReport;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;
use walkdir::WalkDir;

pub const CHANGE: &str = "add-oauth";

// =============================================================================
// Fakes
// =============================================================================

#[derive(Debug, Default)]
pub struct VcsState {
    pub current: String,
    pub branches: BTreeSet<String>,
    pub dirty: bool,
    pub stashes: usize,
    pub commits: Vec<String>,
    pub pushes: Vec<(String, String)>,
    pub fail_commit: bool,
}

#[derive(Clone)]
pub struct FakeVcs(pub Rc<RefCell<VcsState>>);

impl FakeVcs {
    pub fn new() -> Self {
        let state = VcsState {
            current: "main".to_string(),
            branches: ["main".to_string()].into_iter().collect(),
            ..VcsState::default()
        };
        Self(Rc::new(RefCell::new(state)))
    }
}

#[async_trait(?Send)]
impl VersionControl for FakeVcs {
    async fn current_branch(&self) -> PipelineResult<String> {
        Ok(self.0.borrow().current.clone())
    }

    async fn branch_exists(&self, branch: &str) -> PipelineResult<bool> {
        Ok(self.0.borrow().branches.contains(branch))
    }

    async fn is_dirty(&self) -> PipelineResult<bool> {
        Ok(self.0.borrow().dirty)
    }

    async fn stash_push(&self, _message: &str) -> PipelineResult<()> {
        self.0.borrow_mut().stashes += 1;
        Ok(())
    }

    async fn stash_pop(&self) -> PipelineResult<()> {
        let mut state = self.0.borrow_mut();
        state.stashes = state.stashes.saturating_sub(1);
        Ok(())
    }

    async fn checkout(&self, branch: &str) -> PipelineResult<()> {
        self.0.borrow_mut().current = branch.to_string();
        Ok(())
    }

    async fn create_branch(&self, branch: &str) -> PipelineResult<()> {
        let mut state = self.0.borrow_mut();
        state.branches.insert(branch.to_string());
        state.current = branch.to_string();
        Ok(())
    }

    async fn stage_all(&self) -> PipelineResult<()> {
        Ok(())
    }

    async fn commit(&self, message: &str) -> PipelineResult<bool> {
        let mut state = self.0.borrow_mut();
        if state.fail_commit {
            return Err(PipelineError::collaborator("git commit", Some(1), "hook rejected commit"));
        }
        state.commits.push(message.to_string());
        Ok(true)
    }

    async fn push(&self, remote: &str, branch: &str) -> PipelineResult<()> {
        self.0
            .borrow_mut()
            .pushes
            .push((remote.to_string(), branch.to_string()));
        Ok(())
    }

    async fn user_name(&self) -> Option<String> {
        Some("alice".to_string())
    }
}

#[derive(Debug, Default)]
pub struct ReviewState {
    pub open: BTreeMap<String, PullRequest>,
    pub created: Vec<(String, String, String)>,
}

#[derive(Clone, Default)]
pub struct FakeReview(pub Rc<RefCell<ReviewState>>);

#[async_trait(?Send)]
impl ReviewService for FakeReview {
    async fn find_pull_request(&self, branch: &str) -> PipelineResult<Option<PullRequest>> {
        Ok(self.0.borrow().open.get(branch).cloned())
    }

    async fn create_pull_request(
        &self,
        branch: &str,
        base: &str,
        title: &str,
        _body: &str,
    ) -> PipelineResult<PullRequest> {
        let mut state = self.0.borrow_mut();
        let number = state.open.len() as u64 + 1;
        let pr = PullRequest {
            url: format!("https://example.test/pr/{}", number),
            number: Some(number),
        };
        state.open.insert(branch.to_string(), pr.clone());
        state
            .created
            .push((branch.to_string(), base.to_string(), title.to_string()));
        Ok(pr)
    }
}

#[derive(Clone)]
pub struct FakeTests {
    pub passed: Rc<RefCell<bool>>,
    pub runs: Rc<RefCell<usize>>,
}

impl FakeTests {
    pub fn new() -> Self {
        Self {
            passed: Rc::new(RefCell::new(true)),
            runs: Rc::new(RefCell::new(0)),
        }
    }
}

#[async_trait(?Send)]
impl TestRunner for FakeTests {
    fn program(&self) -> &str {
        // Must resolve on PATH for the tooling stage
        "sh"
    }

    fn describe(&self) -> String {
        "sh run-tests".to_string()
    }

    async fn run(&self) -> PipelineResult<TestOutcome> {
        *self.runs.borrow_mut() += 1;
        let passed = *self.passed.borrow();
        Ok(TestOutcome {
            passed,
            exit_code: Some(if passed { 0 } else { 1 }),
            output: if passed { "ok".to_string() } else { "1 failed".to_string() },
        })
    }
}

// =============================================================================
// Project fixture
// =============================================================================

pub struct Project {
    pub temp: TempDir,
    pub config: Config,
    pub vcs: FakeVcs,
    pub review: FakeReview,
    pub tests: FakeTests,
    pub collaborators: Collaborators,
}

impl Project {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::write(
            root.join("Cargo.toml"),
            "[package]\nname = \"demo\"\nversion = \"0.1.37\"\nedition = \"2021\"\n",
        )
        .unwrap();
        std::fs::write(root.join("CHANGELOG.md"), "# Changelog\n\n## [0.1.37] - 2026-01-01\n\n- Earlier\n").unwrap();
        std::fs::write(
            root.join("README.md"),
            "# Demo\n\n![version](https://img.shields.io/badge/version-0.1.37-blue)\n",
        )
        .unwrap();

        let vcs = FakeVcs::new();
        let review = FakeReview::default();
        let tests = FakeTests::new();
        let collaborators = Collaborators {
            vcs: Box::new(vcs.clone()),
            review: Box::new(review.clone()),
            tests: Box::new(tests.clone()),
        };

        Self {
            temp,
            config,
            vcs,
            review,
            tests,
            collaborators,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn engine(&self) -> Engine<'_> {
        Engine::new(&self.config, self.root(), &self.collaborators).unwrap()
    }

    pub fn change_dir(&self) -> PathBuf {
        self.config.changes_root(self.root()).join(CHANGE)
    }

    pub async fn run(&self, stage: Stage) -> Result<StageReport, StageFailure> {
        self.engine().run(CHANGE, stage, RunMode::Execute).await
    }

    pub async fn dry_run(&self, stage: Stage) -> Result<StageReport, StageFailure> {
        self.engine().run(CHANGE, stage, RunMode::DryRun).await
    }

    pub fn write(&self, file: &str, content: &str) {
        std::fs::write(self.change_dir().join(file), content).unwrap();
    }

    pub fn read(&self, file: &str) -> String {
        std::fs::read_to_string(self.change_dir().join(file)).unwrap()
    }

    /// Run every stage up to and including `last`, filling in documents the
    /// way an operator would
    pub async fn advance_to(&self, last: Stage) {
        for stage in Stage::ALL.iter().copied().take_while(|s| *s <= last) {
            if let Some((file, content)) = filled(stage) {
                // Let the stage draft the document first, then fill it in
                let _ = self.run(stage).await;
                self.write(file, content);
            }
            if stage == Stage::Implementation {
                let ticked = self.read("tasks.md").replace("- [ ]", "- [x]");
                self.write("tasks.md", &ticked);
            }
            self.run(stage)
                .await
                .unwrap_or_else(|e| panic!("stage {} failed: {}", stage, e));
        }
    }
}

pub const PROPOSAL: &str = "# Proposal: Add OAuth

## Summary

Add OAuth login for the web app.

## Why

Users asked for single sign-on.

## What Changes

- Add OAuth provider config
- Add login callback endpoint

## Impact

Web users.

## Affected Files

- `src/auth.rs`
";

pub const SPECIFICATION: &str = "# Specification: Add OAuth

## Overview

Add OAuth login for the web app.

## Requirements

- R1: Add OAuth provider config
- R2: Add login callback endpoint

## Acceptance Criteria

- [ ] R1: provider config loads from settings
- [ ] R2: callback endpoint exchanges the code for a session

## Affected Files

- `src/auth.rs`
";

pub const TEST_PLAN: &str = "# Test Plan: Add OAuth

## Strategy

Integration tests against a stub provider.

## Test Cases

- TC1: provider config loads from settings
- TC2: callback endpoint exchanges the code for a session
";

/// Operator-filled content for document stages
pub fn filled(stage: Stage) -> Option<(&'static str, &'static str)> {
    match stage {
        Stage::Proposal => Some(("proposal.md", PROPOSAL)),
        Stage::Specification => Some(("specification.md", SPECIFICATION)),
        Stage::TestPlan => Some(("test_plan.md", TEST_PLAN)),
        _ => None,
    }
}

/// Every file under `dir` with its bytes
pub fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            (
                e.path().strip_prefix(dir).unwrap().to_path_buf(),
                std::fs::read(e.path()).unwrap(),
            )
        })
        .collect()
}
