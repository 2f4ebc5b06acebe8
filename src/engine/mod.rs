//! Stage orchestration engine
//!
//! Runs one stage of one change: checks prerequisites, dispatches to the
//! stage handler, then records status, checksums, advisory validation and a
//! checkpoint. Sequencing is checked before anything is written, so a refused
//! invocation leaves the change untouched.

pub mod context;
pub mod stages;
pub mod synthesis;

pub use context::{RunOptions, StageContext};
pub use stages::{StageHandler, StageOutcome};

use crate::checkpoint::CheckpointManager;
use crate::collaborators::git::author_name;
use crate::collaborators::Collaborators;
use crate::config::Config;
use crate::error::{PipelineError, PipelineResult, StageFailure};
use crate::models::{Artifact, ChangeState, Stage, StageStatus};
use crate::state::StateManager;
use crate::store::{locate_change, ArtifactStore};
use crate::validator::CrossValidator;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Execute,
    /// Report what would happen without writing anything
    DryRun,
}

/// Result of one stage invocation
#[derive(Debug, Clone)]
pub struct StageReport {
    pub change_id: String,
    pub stage: Stage,
    pub status: StageStatus,
    pub dry_run: bool,
    /// Planned actions (dry run only)
    pub planned: Vec<String>,
    pub warnings: Vec<String>,
    /// Checkpoint taken after the stage completed
    pub checkpoint: Option<String>,
    /// Where the change lives after the stage
    pub change_dir: PathBuf,
}

fn change_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid change id regex"))
}

/// Change ids become directory names, so only plain slugs are accepted
pub fn validate_change_id(change_id: &str) -> PipelineResult<()> {
    if change_id_regex().is_match(change_id) {
        Ok(())
    } else {
        Err(PipelineError::Config(format!(
            "invalid change id '{}': use letters, digits, '.', '_' or '-'",
            change_id
        )))
    }
}

pub struct Engine<'a> {
    config: &'a Config,
    project_root: PathBuf,
    collaborators: &'a Collaborators,
    options: RunOptions,
}

impl<'a> Engine<'a> {
    pub fn new(
        config: &'a Config,
        project_root: impl Into<PathBuf>,
        collaborators: &'a Collaborators,
    ) -> PipelineResult<Self> {
        stages::check_table()?;
        Ok(Self {
            config,
            project_root: project_root.into(),
            collaborators,
            options: RunOptions::default(),
        })
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Run a single stage.
    ///
    /// Errors carry the change, the stage and the underlying cause so the
    /// caller can print the exact command that retries it.
    pub async fn run(
        &self,
        change_id: &str,
        stage: Stage,
        mode: RunMode,
    ) -> Result<StageReport, StageFailure> {
        let fail = |e: PipelineError| StageFailure::new(change_id, stage, e);

        validate_change_id(change_id).map_err(fail)?;
        let mut state = self.open(change_id, stage).await.map_err(fail)?;

        if let Some(missing) = state.state().first_unmet_prerequisite(stage) {
            return Err(fail(PipelineError::SequenceViolation { stage, missing }));
        }

        let handler = stages::handler(stage);
        let mut ctx = StageContext::new(
            self.config,
            &self.project_root,
            self.collaborators,
            &self.options,
            &mut state,
        );

        if mode == RunMode::DryRun {
            let planned = handler.preview(&ctx).await.map_err(fail)?;
            let warnings = ctx.take_warnings();
            drop(ctx);
            return Ok(StageReport {
                change_id: change_id.to_string(),
                stage,
                status: state.status(stage),
                dry_run: true,
                planned,
                warnings,
                checkpoint: None,
                change_dir: state.change_dir().to_path_buf(),
            });
        }

        tracing::info!(change_id, stage = stage.index(), name = stage.name(), "running stage");
        match handler.execute(&mut ctx).await {
            Ok(outcome) => {
                let warnings = ctx.take_warnings();
                drop(ctx);
                self.finish(&mut state, stage, outcome, warnings).map_err(fail)
            }
            Err(e) => {
                let destructive = ctx.is_destructive();
                drop(ctx);
                if destructive {
                    Self::record_failure(&mut state, stage, &e);
                }
                tracing::warn!(change_id, stage = stage.index(), error = %e, "stage failed");
                Err(fail(e))
            }
        }
    }

    /// Run every stage from the first incomplete one through the end,
    /// stopping at the first failure. `on_stage` sees each report as soon as
    /// its stage finishes.
    pub async fn run_remaining(
        &self,
        change_id: &str,
        mut on_stage: impl FnMut(&StageReport),
    ) -> Result<Vec<StageReport>, StageFailure> {
        let mut reports = Vec::new();
        while let Some(stage) = self.next_stage(change_id)? {
            let report = self.run(change_id, stage, RunMode::Execute).await?;
            on_stage(&report);
            reports.push(report);
        }
        Ok(reports)
    }

    /// First stage not yet done; stage 0 for a change that does not exist
    pub fn next_stage(&self, change_id: &str) -> Result<Option<Stage>, StageFailure> {
        match locate_change(self.config, &self.project_root, change_id) {
            Some(location) if StateManager::exists(&location.dir) => StateManager::load(&location.dir)
                .map(|manager| manager.state().next_stage())
                .map_err(|e| StageFailure::new(change_id, Stage::Todo, e)),
            _ => Ok(Some(Stage::Todo)),
        }
    }

    async fn open(&self, change_id: &str, stage: Stage) -> PipelineResult<StateManager> {
        let not_found = || PipelineError::ChangeNotFound {
            change_id: change_id.to_string(),
        };

        let Some(location) = locate_change(self.config, &self.project_root, change_id) else {
            return if stage == Stage::Todo {
                Ok(self.new_change(change_id).await)
            } else {
                Err(not_found())
            };
        };

        if location.archived && stage != Stage::PullRequest {
            return Err(PipelineError::Config(format!(
                "change '{}' is archived; only stage {} ({}) can still run",
                change_id,
                Stage::PullRequest,
                Stage::PullRequest.name()
            )));
        }

        if StateManager::exists(&location.dir) {
            StateManager::load(&location.dir)
        } else if stage == Stage::Todo {
            Ok(self.new_change(change_id).await)
        } else {
            Err(not_found())
        }
    }

    async fn new_change(&self, change_id: &str) -> StateManager {
        let owner = match &self.options.owner {
            Some(owner) => owner.clone(),
            None => match self.collaborators.vcs.user_name().await {
                Some(name) => name,
                None => author_name(&self.project_root),
            },
        };
        let title = self
            .options
            .title
            .clone()
            .unwrap_or_else(|| change_id.to_string());

        let dir = self.config.changes_root(&self.project_root).join(change_id);
        StateManager::create(dir, ChangeState::new(change_id, title, owner))
    }

    fn finish(
        &self,
        state: &mut StateManager,
        stage: Stage,
        outcome: StageOutcome,
        mut warnings: Vec<String>,
    ) -> PipelineResult<StageReport> {
        let status = match outcome {
            StageOutcome::Complete => StageStatus::Complete,
            StageOutcome::Skipped => StageStatus::Skipped,
        };
        state.mark(stage, status)?;

        let store = ArtifactStore::new(state.change_dir());
        if let Some(content) = store.read(Artifact::Checklist)? {
            if let Some(ticked) = synthesis::tick_checklist(&content, stage) {
                store.write(Artifact::Checklist, &ticked)?;
            }
        }

        if (Stage::Proposal..=Stage::TestPlan).contains(&stage) {
            let report = CrossValidator::new(state.change_dir()).validate()?;
            warnings.extend(report.issues.iter().map(|f| f.format()));
            warnings.extend(report.warnings.iter().map(|f| f.format()));
            state.record_validation(stage, &report);
        }

        state.update_all_checksums(stage)?;
        state.set_last_action(format!(
            "stage {} ({}) {}",
            stage.index(),
            stage.name(),
            if status == StageStatus::Skipped { "skipped" } else { "completed" }
        ));
        state.save()?;

        let checkpoints = CheckpointManager::new(state.change_dir());
        let checkpoint = checkpoints.create(stage, Some(stage.name()))?;
        if let Some(keep) = self.config.checkpoints.keep {
            let removed = checkpoints.cleanup(keep)?;
            if !removed.is_empty() {
                tracing::debug!(removed = removed.len(), "old checkpoints pruned");
            }
        }

        tracing::info!(
            change_id = %state.state().change_id,
            stage = stage.index(),
            checkpoint = %checkpoint.id,
            "stage finished"
        );

        Ok(StageReport {
            change_id: state.state().change_id.clone(),
            stage,
            status,
            dry_run: false,
            planned: Vec::new(),
            warnings,
            checkpoint: Some(checkpoint.id),
            change_dir: state.change_dir().to_path_buf(),
        })
    }

    /// Best effort: the original error is what the caller must see
    fn record_failure(state: &mut StateManager, stage: Stage, error: &PipelineError) {
        let result = state.mark(stage, StageStatus::Failed).and_then(|_| {
            state.set_last_action(format!("stage {} ({}) failed: {}", stage.index(), stage.name(), error));
            state.save()
        });
        if let Err(e) = result {
            tracing::error!(stage = stage.index(), error = %e, "could not record stage failure");
        }
    }
}
