use crate::collaborators::Collaborators;
use crate::config::Config;
use crate::error::PipelineResult;
use crate::models::{Artifact, ChangeState};
use crate::parser::DocumentIndex;
use crate::state::StateManager;
use crate::store::ArtifactStore;
use crate::version::BumpKind;
use std::path::Path;

/// Operator choices that influence stage behavior
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Increment used when the version stage computes a new version
    pub bump: BumpKind,
    /// Title for a change created by stage 0 (defaults to the change id)
    pub title: Option<String>,
    /// Owner for a change created by stage 0 (defaults to the git author)
    pub owner: Option<String>,
}

/// Everything a stage handler may read or change for one change.
///
/// Built fresh for every stage invocation; nothing outlives it except what
/// the handler writes through the state manager or the artifact store.
pub struct StageContext<'a> {
    pub config: &'a Config,
    pub project_root: &'a Path,
    pub collaborators: &'a Collaborators,
    pub options: &'a RunOptions,
    pub state: &'a mut StateManager,
    warnings: Vec<String>,
    destructive: bool,
}

impl<'a> StageContext<'a> {
    pub fn new(
        config: &'a Config,
        project_root: &'a Path,
        collaborators: &'a Collaborators,
        options: &'a RunOptions,
        state: &'a mut StateManager,
    ) -> Self {
        Self {
            config,
            project_root,
            collaborators,
            options,
            state,
            warnings: Vec::new(),
            destructive: false,
        }
    }

    pub fn change(&self) -> &ChangeState {
        self.state.state()
    }

    pub fn change_id(&self) -> &str {
        &self.state.state().change_id
    }

    pub fn change_dir(&self) -> &Path {
        self.state.change_dir()
    }

    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(self.state.change_dir())
    }

    /// Read and index an artifact the stage depends on
    pub fn require_doc(&self, artifact: Artifact) -> PipelineResult<DocumentIndex> {
        Ok(DocumentIndex::parse(&self.store().require(artifact)?))
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(change = %self.change_id(), "{}", message);
        self.warnings.push(message);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Record that something outside the change directory was modified, so a
    /// failure from here on leaves the stage Failed rather than NotStarted
    pub fn mark_destructive(&mut self) {
        self.destructive = true;
    }

    pub fn is_destructive(&self) -> bool {
        self.destructive
    }
}
