//! Stage handlers
//!
//! One handler per stage, held in a fixed table indexed by stage number.
//! Handlers only do the stage's own work; sequencing, status updates,
//! checklist ticking and checkpoints belong to the engine.

use super::context::StageContext;
use super::synthesis;
use crate::archive::ArchiveManager;
use crate::collaborators::ReviewService;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Artifact, PullRequestRecord, Stage, TestRunRecord, STAGE_COUNT};
use crate::parser::DocumentIndex;
use crate::state::StateManager;
use crate::store::{read_optional, write_atomic};
use crate::validator::{require_complete, validate_documents};
use crate::version::{changelog, ensure_branch, VersionManager};
use async_trait::async_trait;
use chrono::Utc;
use semver::Version;

/// Generated tooling lives here, relative to the change directory
pub const TOOLING_DIR: &str = "tooling";
pub const TEST_CASES_FILE: &str = "test_cases.json";

/// Output lines of a failed test run kept in the error
const TEST_OUTPUT_TAIL: usize = 20;

/// How a successful handler wants its stage recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Complete,
    Skipped,
}

#[async_trait(?Send)]
pub trait StageHandler {
    fn stage(&self) -> Stage;

    /// Actions `execute` would take. Must not write anything.
    async fn preview(&self, ctx: &StageContext<'_>) -> PipelineResult<Vec<String>>;

    async fn execute(&self, ctx: &mut StageContext<'_>) -> PipelineResult<StageOutcome>;
}

pub static STAGE_TABLE: [&(dyn StageHandler + Sync); STAGE_COUNT] = [
    &TodoStage,
    &VersionStage,
    &DocumentStage {
        stage: Stage::Proposal,
        artifact: Artifact::Proposal,
        upstream: &[],
    },
    &DocumentStage {
        stage: Stage::Specification,
        artifact: Artifact::Specification,
        upstream: &[Artifact::Proposal],
    },
    &DocumentStage {
        stage: Stage::Tasks,
        artifact: Artifact::TaskList,
        upstream: &[Artifact::Proposal, Artifact::Specification],
    },
    &DocumentStage {
        stage: Stage::TestPlan,
        artifact: Artifact::TestPlan,
        upstream: &[Artifact::Specification],
    },
    &ToolingStage,
    &ImplementationStage,
    &TestRunStage,
    &DocUpdateStage,
    &CommitStage,
    &ArchiveStage,
    &PullRequestStage,
];

pub fn handler(stage: Stage) -> &'static dyn StageHandler {
    STAGE_TABLE[stage.index()]
}

/// Every slot must hold the handler for its own stage number
pub fn check_table() -> PipelineResult<()> {
    for (index, handler) in STAGE_TABLE.iter().enumerate() {
        if handler.stage().index() != index {
            return Err(PipelineError::Config(format!(
                "stage table slot {} holds the handler for stage {}",
                index,
                handler.stage()
            )));
        }
    }
    Ok(())
}

/// Version and branch recorded by the version stage
fn release(ctx: &StageContext<'_>) -> PipelineResult<(String, String)> {
    let state = ctx.change();
    match (&state.version, &state.branch) {
        (Some(version), Some(branch)) => Ok((version.clone(), branch.clone())),
        _ => Err(PipelineError::Config(format!(
            "no release version recorded for '{}'; run stage {} first",
            state.change_id,
            Stage::Version
        ))),
    }
}

fn release_title(version: &str, title: &str) -> String {
    format!("release {}: {}", version, title)
}

// =============================================================================
// 0. TODO checklist
// =============================================================================

struct TodoStage;

#[async_trait(?Send)]
impl StageHandler for TodoStage {
    fn stage(&self) -> Stage {
        Stage::Todo
    }

    async fn preview(&self, ctx: &StageContext<'_>) -> PipelineResult<Vec<String>> {
        let mut plan = Vec::new();
        if !StateManager::exists(ctx.change_dir()) {
            plan.push(format!(
                "create change '{}' in {} (owner: {})",
                ctx.change_id(),
                ctx.change_dir().display(),
                ctx.change().owner
            ));
        }
        if ctx.store().exists(Artifact::Checklist) {
            plan.push("keep existing checklist.md".to_string());
        } else {
            plan.push("write checklist.md".to_string());
        }
        Ok(plan)
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> PipelineResult<StageOutcome> {
        let store = ctx.store();
        match store.read(Artifact::Checklist)? {
            Some(existing) => require_complete(Artifact::Checklist, &existing)?,
            None => store.write(Artifact::Checklist, &synthesis::checklist(ctx.change()))?,
        }
        Ok(StageOutcome::Complete)
    }
}

// =============================================================================
// 1. Version bump
// =============================================================================

struct VersionStage;

#[async_trait(?Send)]
impl StageHandler for VersionStage {
    fn stage(&self) -> Stage {
        Stage::Version
    }

    async fn preview(&self, ctx: &StageContext<'_>) -> PipelineResult<Vec<String>> {
        if let Ok((version, branch)) = release(ctx) {
            return Ok(vec![format!("reuse version {}", version), format!("switch to branch {}", branch)]);
        }

        let collaborators = ctx.collaborators;
        let manager = VersionManager::new(&ctx.config.version, ctx.project_root);
        let current = manager.read_current()?;
        let review: Option<&dyn ReviewService> = ctx
            .config
            .pull_request
            .enabled
            .then(|| collaborators.review.as_ref());
        let next = manager
            .bump_version(ctx.options.bump, collaborators.vcs.as_ref(), review)
            .await?;

        let mut plan = vec![format!("bump version {} -> {}", current, next)];
        plan.extend(
            manager
                .planned_writes()
                .iter()
                .map(|p| format!("write version to {}", p.display())),
        );
        plan.push(format!("switch to branch {}", manager.branch_name(&next)));
        Ok(plan)
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> PipelineResult<StageOutcome> {
        let collaborators = ctx.collaborators;
        let vcs = collaborators.vcs.as_ref();

        // A version chosen by an earlier attempt is reused, never bumped again
        if let Ok((version, branch)) = release(ctx) {
            tracing::info!(%version, "reusing recorded version");
            ensure_branch(vcs, &branch).await?;
            return Ok(StageOutcome::Complete);
        }

        let config = ctx.config;
        let manager = VersionManager::new(&config.version, ctx.project_root);
        let review: Option<&dyn ReviewService> = config
            .pull_request
            .enabled
            .then(|| collaborators.review.as_ref());
        let version = manager.bump_version(ctx.options.bump, vcs, review).await?;
        let branch = manager.branch_name(&version);

        ctx.mark_destructive();
        for warning in manager.apply(&version)? {
            ctx.warn(warning);
        }
        ctx.state.set_release(version.to_string(), branch.as_str());

        ensure_branch(vcs, &branch).await?;
        Ok(StageOutcome::Complete)
    }
}

// =============================================================================
// 2-5. Documents
// =============================================================================

struct DocumentStage {
    stage: Stage,
    artifact: Artifact,
    upstream: &'static [Artifact],
}

impl DocumentStage {
    fn draft(&self, ctx: &StageContext<'_>) -> PipelineResult<String> {
        let change = ctx.change();
        Ok(match self.artifact {
            Artifact::Checklist => synthesis::checklist(change),
            Artifact::Proposal => synthesis::proposal(change),
            Artifact::Specification => {
                synthesis::specification(change, &ctx.require_doc(Artifact::Proposal)?)
            }
            Artifact::TaskList => synthesis::tasks(
                change,
                &ctx.require_doc(Artifact::Proposal)?,
                &ctx.require_doc(Artifact::Specification)?,
            ),
            Artifact::TestPlan => synthesis::test_plan(change, &ctx.require_doc(Artifact::Specification)?),
        })
    }
}

#[async_trait(?Send)]
impl StageHandler for DocumentStage {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn preview(&self, ctx: &StageContext<'_>) -> PipelineResult<Vec<String>> {
        let store = ctx.store();
        for upstream in self.upstream {
            store.require(*upstream)?;
        }

        let mut plan = Vec::new();
        if !store.exists(self.artifact) {
            plan.push(format!("write draft {} from upstream artifacts", self.artifact));
        }
        plan.push(format!("check {} for placeholders and required sections", self.artifact));
        if self.artifact == Artifact::TaskList {
            plan.push("check every proposed change has a matching task".to_string());
        }
        Ok(plan)
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> PipelineResult<StageOutcome> {
        let store = ctx.store();
        for upstream in self.upstream {
            store.require(*upstream)?;
        }

        let content = match store.read(self.artifact)? {
            Some(content) => content,
            None => {
                let draft = self.draft(ctx)?;
                store.write(self.artifact, &draft)?;
                tracing::info!(artifact = %self.artifact, "wrote draft from upstream artifacts");
                draft
            }
        };

        require_complete(self.artifact, &content)?;

        if self.artifact == Artifact::TaskList {
            let report = validate_documents(&store.load_all()?);
            if !report.is_valid() {
                return Err(PipelineError::CrossValidationBlocking {
                    issues: report.issues,
                });
            }
        }

        Ok(StageOutcome::Complete)
    }
}

// =============================================================================
// 6. Tooling generation
// =============================================================================

struct ToolingStage;

#[async_trait(?Send)]
impl StageHandler for ToolingStage {
    fn stage(&self) -> Stage {
        Stage::Tooling
    }

    async fn preview(&self, ctx: &StageContext<'_>) -> PipelineResult<Vec<String>> {
        let plan = ctx.require_doc(Artifact::TestPlan)?;
        let tests = ctx.collaborators.tests.as_ref();
        let manifest = synthesis::tooling_manifest(ctx.change_id(), &tests.describe(), &plan);
        Ok(vec![
            format!("check '{}' is on PATH", tests.program()),
            format!(
                "write {}/{} with {} test case(s)",
                TOOLING_DIR,
                TEST_CASES_FILE,
                manifest.cases.len()
            ),
        ])
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> PipelineResult<StageOutcome> {
        let plan = ctx.require_doc(Artifact::TestPlan)?;
        let tests = ctx.collaborators.tests.as_ref();

        let resolved = which::which(tests.program()).map_err(|e| {
            PipelineError::collaborator(
                tests.program(),
                None,
                format!("test runner not found on PATH: {}", e),
            )
        })?;
        tracing::debug!(runner = %resolved.display(), "test runner resolved");

        let manifest = synthesis::tooling_manifest(ctx.change_id(), &tests.describe(), &plan);
        if manifest.cases.is_empty() {
            return Err(PipelineError::StructureIncomplete {
                artifact: Artifact::TestPlan,
                missing: vec!["section 'Test Cases' needs at least 1 list item(s)".to_string()],
            });
        }

        let path = ctx.change_dir().join(TOOLING_DIR).join(TEST_CASES_FILE);
        let content =
            serde_json::to_string_pretty(&manifest).map_err(|e| PipelineError::json(&path, e))?;
        write_atomic(&path, content.as_bytes())?;
        Ok(StageOutcome::Complete)
    }
}

// =============================================================================
// 7. Implementation
// =============================================================================

struct ImplementationStage;

fn open_tasks(doc: &DocumentIndex) -> Vec<String> {
    doc.checkboxes()
        .into_iter()
        .filter(|item| item.checked == Some(false))
        .map(|item| format!("line {}: {}", item.line, item.text))
        .collect()
}

#[async_trait(?Send)]
impl StageHandler for ImplementationStage {
    fn stage(&self) -> Stage {
        Stage::Implementation
    }

    async fn preview(&self, ctx: &StageContext<'_>) -> PipelineResult<Vec<String>> {
        let tasks = ctx.require_doc(Artifact::TaskList)?;
        let open = open_tasks(&tasks);
        Ok(vec![format!(
            "check tasks.md: {} of {} task(s) still open",
            open.len(),
            tasks.checkboxes().len()
        )])
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> PipelineResult<StageOutcome> {
        let tasks = ctx.require_doc(Artifact::TaskList)?;
        let open = open_tasks(&tasks);
        if !open.is_empty() {
            return Err(PipelineError::TasksIncomplete { open });
        }
        Ok(StageOutcome::Complete)
    }
}

// =============================================================================
// 8. Test run
// =============================================================================

struct TestRunStage;

fn tail(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[async_trait(?Send)]
impl StageHandler for TestRunStage {
    fn stage(&self) -> Stage {
        Stage::TestRun
    }

    async fn preview(&self, ctx: &StageContext<'_>) -> PipelineResult<Vec<String>> {
        Ok(vec![format!("run `{}`", ctx.collaborators.tests.describe())])
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> PipelineResult<StageOutcome> {
        let collaborators = ctx.collaborators;
        let tests = collaborators.tests.as_ref();
        let outcome = tests.run().await?;

        ctx.state.state_mut().test_run = Some(TestRunRecord {
            passed: outcome.passed,
            exit_code: outcome.exit_code,
            finished_at: Utc::now(),
        });

        if !outcome.passed {
            // The failed run stays on record even though the stage does not complete
            ctx.state.save()?;
            return Err(PipelineError::collaborator(
                tests.describe(),
                outcome.exit_code,
                tail(&outcome.output, TEST_OUTPUT_TAIL),
            ));
        }
        Ok(StageOutcome::Complete)
    }
}

// =============================================================================
// 9. Doc update
// =============================================================================

struct DocUpdateStage;

#[async_trait(?Send)]
impl StageHandler for DocUpdateStage {
    fn stage(&self) -> Stage {
        Stage::DocUpdate
    }

    async fn preview(&self, ctx: &StageContext<'_>) -> PipelineResult<Vec<String>> {
        let proposal = ctx.require_doc(Artifact::Proposal)?;
        let entries = synthesis::changelog_entries(&proposal);
        Ok(match ctx.config.version.changelog_path() {
            Some(path) => vec![format!(
                "add {} changelog entr{} to {}",
                entries.len(),
                if entries.len() == 1 { "y" } else { "ies" },
                path.display()
            )],
            None => vec!["no changelog configured; nothing to update".to_string()],
        })
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> PipelineResult<StageOutcome> {
        let Some(relative) = ctx.config.version.changelog_path() else {
            ctx.warn("no changelog configured; doc update skipped");
            return Ok(StageOutcome::Complete);
        };
        let path = ctx.project_root.join(relative);

        let Some(content) = read_optional(&path)? else {
            ctx.warn(format!("changelog {} not found; doc update skipped", path.display()));
            return Ok(StageOutcome::Complete);
        };

        let (raw_version, _) = release(ctx)?;
        let version = Version::parse(&raw_version).map_err(|source| PipelineError::InvalidVersion {
            value: raw_version.clone(),
            source,
        })?;
        let entries = synthesis::changelog_entries(&ctx.require_doc(Artifact::Proposal)?);
        let date = Utc::now().format("%Y-%m-%d").to_string();

        let updated = changelog::insert_entries(&content, &version, &date, &entries);
        if updated != content {
            write_atomic(&path, updated.as_bytes())?;
        }
        Ok(StageOutcome::Complete)
    }
}

// =============================================================================
// 10. Git commit
// =============================================================================

struct CommitStage;

#[async_trait(?Send)]
impl StageHandler for CommitStage {
    fn stage(&self) -> Stage {
        Stage::Commit
    }

    async fn preview(&self, ctx: &StageContext<'_>) -> PipelineResult<Vec<String>> {
        let (version, branch) = release(ctx)?;
        Ok(vec![
            format!("switch to branch {}", branch),
            "stage all changes".to_string(),
            format!("commit \"{}\"", release_title(&version, &ctx.change().title)),
        ])
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> PipelineResult<StageOutcome> {
        let (version, branch) = release(ctx)?;
        let collaborators = ctx.collaborators;
        let vcs = collaborators.vcs.as_ref();

        ensure_branch(vcs, &branch).await?;
        vcs.stage_all().await?;

        ctx.mark_destructive();
        let message = release_title(&version, &ctx.change().title);
        if !vcs.commit(&message).await? {
            ctx.warn("nothing to commit; the release branch already holds every change");
        }
        Ok(StageOutcome::Complete)
    }
}

// =============================================================================
// 11. Archive
// =============================================================================

struct ArchiveStage;

#[async_trait(?Send)]
impl StageHandler for ArchiveStage {
    fn stage(&self) -> Stage {
        Stage::Archive
    }

    async fn preview(&self, ctx: &StageContext<'_>) -> PipelineResult<Vec<String>> {
        let archiver = ArchiveManager::new(ctx.config, ctx.project_root);
        let destination = archiver.destination(ctx.change_id());
        if destination.exists() {
            return Err(PipelineError::ArchiveDestinationExists { path: destination });
        }
        Ok(vec![
            format!("copy {} to {}", ctx.change_dir().display(), destination.display()),
            format!("remove {}", ctx.change_dir().display()),
        ])
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> PipelineResult<StageOutcome> {
        // The archive must carry the latest state
        ctx.state.save_if_dirty()?;

        let archiver = ArchiveManager::new(ctx.config, ctx.project_root);
        let outcome = match archiver.archive(ctx.change_id()) {
            Ok(outcome) => outcome,
            Err(e) => {
                if matches!(e, PipelineError::ArchivePartialFailure { .. }) {
                    ctx.mark_destructive();
                }
                return Err(e);
            }
        };

        for warning in outcome.warnings {
            ctx.warn(warning);
        }
        ctx.state.relocate(outcome.path);
        Ok(StageOutcome::Complete)
    }
}

// =============================================================================
// 12. Pull request
// =============================================================================

struct PullRequestStage;

#[async_trait(?Send)]
impl StageHandler for PullRequestStage {
    fn stage(&self) -> Stage {
        Stage::PullRequest
    }

    async fn preview(&self, ctx: &StageContext<'_>) -> PipelineResult<Vec<String>> {
        if !ctx.config.pull_request.enabled {
            return Ok(vec!["pull requests disabled; mark stage skipped".to_string()]);
        }
        let (_, branch) = release(ctx)?;
        let mut plan = Vec::new();
        if ctx.config.git.push {
            plan.push(format!("push {} to {}", branch, ctx.config.git.remote));
        }
        match ctx.collaborators.review.find_pull_request(&branch).await? {
            Some(pr) => plan.push(format!("reuse open pull request {}", pr.url)),
            None => plan.push(format!(
                "open pull request {} -> {}",
                branch, ctx.config.git.base_branch
            )),
        }
        Ok(plan)
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> PipelineResult<StageOutcome> {
        let config = ctx.config;
        if !config.pull_request.enabled {
            ctx.warn("pull requests are disabled; stage skipped");
            return Ok(StageOutcome::Skipped);
        }

        let (version, branch) = release(ctx)?;
        let collaborators = ctx.collaborators;

        if config.git.push {
            ctx.mark_destructive();
            collaborators.vcs.push(&config.git.remote, &branch).await?;
        }

        let (pr, reused) = match collaborators.review.find_pull_request(&branch).await? {
            Some(pr) => (pr, true),
            None => {
                let proposal = ctx
                    .store()
                    .read(Artifact::Proposal)?
                    .map(|content| DocumentIndex::parse(&content));
                let title = release_title(&version, &ctx.change().title);
                let body = synthesis::pull_request_body(ctx.change(), proposal.as_ref());
                let pr = collaborators
                    .review
                    .create_pull_request(&branch, &config.git.base_branch, &title, &body)
                    .await?;
                (pr, false)
            }
        };

        tracing::info!(url = %pr.url, reused, "pull request ready");
        ctx.state.state_mut().pull_request = Some(PullRequestRecord {
            branch,
            url: pr.url,
            reused,
        });
        Ok(StageOutcome::Complete)
    }
}
