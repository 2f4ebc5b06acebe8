//! StateManager - STATE.json CRUD operations

use crate::error::{PipelineError, PipelineResult};
use crate::models::{
    Artifact, ChangeState, ChecksumEntry, Stage, StageStatus, ValidationEntry, ValidationReport,
};
use crate::parser::calculate_checksum;
use crate::store::write_atomic;
use chrono::Utc;
use std::path::{Path, PathBuf};

pub const STATE_FILE: &str = "STATE.json";

/// State manager for a single change
#[derive(Debug)]
pub struct StateManager {
    change_dir: PathBuf,
    state: ChangeState,
    dirty: bool,
}

impl StateManager {
    /// Load existing state for a change
    pub fn load(change_dir: impl Into<PathBuf>) -> PipelineResult<Self> {
        let change_dir = change_dir.into();
        let state_path = change_dir.join(STATE_FILE);

        let content = match std::fs::read_to_string(&state_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let change_id = change_dir
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("unknown")
                    .to_string();
                return Err(PipelineError::ChangeNotFound { change_id });
            }
            Err(e) => return Err(PipelineError::io(&state_path, e)),
        };
        let state: ChangeState =
            serde_json::from_str(&content).map_err(|e| PipelineError::json(&state_path, e))?;

        Ok(Self {
            change_dir,
            state,
            dirty: false,
        })
    }

    /// Wrap a fresh state that has not been written yet
    pub fn create(change_dir: impl Into<PathBuf>, state: ChangeState) -> Self {
        Self {
            change_dir: change_dir.into(),
            state,
            dirty: true,
        }
    }

    pub fn exists(change_dir: &Path) -> bool {
        change_dir.join(STATE_FILE).is_file()
    }

    /// Save state to STATE.json
    pub fn save(&mut self) -> PipelineResult<()> {
        self.state.updated_at = Utc::now();

        let state_path = self.change_dir.join(STATE_FILE);
        let content = serde_json::to_string_pretty(&self.state)
            .map_err(|e| PipelineError::json(&state_path, e))?;
        write_atomic(&state_path, content.as_bytes())?;

        self.dirty = false;
        Ok(())
    }

    /// Save only if dirty
    pub fn save_if_dirty(&mut self) -> PipelineResult<()> {
        if self.dirty {
            self.save()?;
        }
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Get current state (read-only)
    pub fn state(&self) -> &ChangeState {
        &self.state
    }

    /// Get change directory
    pub fn change_dir(&self) -> &Path {
        &self.change_dir
    }

    /// Point the manager at the directory the change was moved to
    pub fn relocate(&mut self, change_dir: impl Into<PathBuf>) {
        self.change_dir = change_dir.into();
        self.dirty = true;
    }

    // =========================================================================
    // Stage Management
    // =========================================================================

    pub fn status(&self, stage: Stage) -> StageStatus {
        self.state.status(stage)
    }

    pub fn mark(&mut self, stage: Stage, status: StageStatus) -> PipelineResult<()> {
        self.state.mark(stage, status)?;
        self.dirty = true;
        Ok(())
    }

    pub fn reset_after(&mut self, stage: Stage) {
        self.state.reset_after(stage);
        self.dirty = true;
    }

    /// Set last action
    pub fn set_last_action(&mut self, action: impl Into<String>) {
        self.state.last_action = Some(action.into());
        self.dirty = true;
    }

    /// Record the version and release branch chosen by the version stage
    pub fn set_release(&mut self, version: impl Into<String>, branch: impl Into<String>) {
        self.state.version = Some(version.into());
        self.state.branch = Some(branch.into());
        self.dirty = true;
    }

    pub fn state_mut(&mut self) -> &mut ChangeState {
        self.dirty = true;
        &mut self.state
    }

    // =========================================================================
    // Checksum Management
    // =========================================================================

    /// Update checksum for an artifact, dropping it if the file is gone
    pub fn update_checksum(&mut self, artifact: Artifact, stage: Stage) -> PipelineResult<()> {
        let file_path = artifact.path(&self.change_dir);
        let key = artifact.file_name().to_string();
        if !file_path.exists() {
            self.state.checksums.remove(&key);
            self.dirty = true;
            return Ok(());
        }

        let content =
            std::fs::read_to_string(&file_path).map_err(|e| PipelineError::io(&file_path, e))?;
        self.state.checksums.insert(
            key,
            ChecksumEntry {
                hash: calculate_checksum(&content),
                stage,
                recorded_at: Some(Utc::now()),
            },
        );
        self.dirty = true;

        Ok(())
    }

    /// Update checksums for every artifact
    pub fn update_all_checksums(&mut self, stage: Stage) -> PipelineResult<()> {
        for artifact in Artifact::ALL {
            self.update_checksum(artifact, stage)?;
        }
        Ok(())
    }

    /// Check if an artifact changed since its checksum was recorded
    pub fn is_stale(&self, artifact: Artifact) -> PipelineResult<bool> {
        let file_path = artifact.path(&self.change_dir);
        if !file_path.exists() {
            return Ok(false);
        }

        let Some(entry) = self.state.checksums.get(artifact.file_name()) else {
            // No recorded checksum = stale (never completed a stage)
            return Ok(true);
        };

        let content =
            std::fs::read_to_string(&file_path).map_err(|e| PipelineError::io(&file_path, e))?;
        Ok(entry.hash != calculate_checksum(&content))
    }

    /// Get full staleness report for all artifacts
    pub fn check_staleness(&self) -> PipelineResult<StalenessReport> {
        let mut stale_files = Vec::new();
        let mut missing_checksums = Vec::new();
        let mut up_to_date = Vec::new();

        for artifact in Artifact::ALL {
            if !artifact.path(&self.change_dir).exists() {
                continue;
            }

            if !self.state.checksums.contains_key(artifact.file_name()) {
                missing_checksums.push(artifact);
            } else if self.is_stale(artifact)? {
                stale_files.push(artifact);
            } else {
                up_to_date.push(artifact);
            }
        }

        Ok(StalenessReport {
            stale_files,
            missing_checksums,
            up_to_date,
        })
    }

    // =========================================================================
    // Validation History
    // =========================================================================

    /// Record a validation result
    pub fn record_validation(&mut self, stage: Stage, report: &ValidationReport) {
        let entry = ValidationEntry {
            stage,
            timestamp: Utc::now(),
            valid: report.is_valid(),
            issues: report.issues.len(),
            warnings: report.warnings.len(),
            messages: report
                .issues
                .iter()
                .chain(report.warnings.iter())
                .map(|f| f.format())
                .collect(),
        };

        self.state.validations.push(entry);
        self.dirty = true;
    }

    /// Get last validation for a stage
    pub fn last_validation(&self, stage: Stage) -> Option<&ValidationEntry> {
        self.state.validations.iter().rev().find(|v| v.stage == stage)
    }
}

/// Staleness report for a change
#[derive(Debug, Clone, Default)]
pub struct StalenessReport {
    /// Artifacts edited since the last completed stage
    pub stale_files: Vec<Artifact>,
    /// Artifacts without recorded checksums
    pub missing_checksums: Vec<Artifact>,
    /// Artifacts that are up to date
    pub up_to_date: Vec<Artifact>,
}

impl StalenessReport {
    pub fn has_stale(&self) -> bool {
        !self.stale_files.is_empty()
    }

    pub fn is_fresh(&self) -> bool {
        self.stale_files.is_empty() && self.missing_checksums.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorCategory, Finding, Severity};
    use tempfile::TempDir;

    fn setup_test_change() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let change_dir = temp_dir.path().join("test-change");
        std::fs::create_dir_all(&change_dir).unwrap();

        std::fs::write(change_dir.join("proposal.md"), "# Test Proposal\n\nContent here\n").unwrap();
        std::fs::write(change_dir.join("tasks.md"), "# Tasks\n\n- [ ] Task 1\n").unwrap();

        (temp_dir, change_dir)
    }

    fn create_state(change_dir: &Path) -> StateManager {
        let mut manager =
            StateManager::create(change_dir, ChangeState::new("test-change", "Test", "alice"));
        manager.save().unwrap();
        manager
    }

    #[test]
    fn test_load_missing_state_is_change_not_found() {
        let (_temp, change_dir) = setup_test_change();
        let err = StateManager::load(&change_dir).unwrap_err();
        assert!(matches!(err, PipelineError::ChangeNotFound { ref change_id } if change_id == "test-change"));
    }

    #[test]
    fn test_save_and_load() {
        let (_temp, change_dir) = setup_test_change();

        {
            let mut manager = create_state(&change_dir);
            manager.mark(Stage::Todo, StageStatus::Complete).unwrap();
            manager.set_last_action("run stage 0");
            manager.set_release("0.1.38", "release-0.1.38");
            manager.save().unwrap();
            assert!(!manager.is_dirty());
        }

        {
            let manager = StateManager::load(&change_dir).unwrap();
            assert_eq!(manager.status(Stage::Todo), StageStatus::Complete);
            assert_eq!(manager.state().last_action.as_deref(), Some("run stage 0"));
            assert_eq!(manager.state().branch.as_deref(), Some("release-0.1.38"));
        }
    }

    #[test]
    fn test_mark_out_of_order_leaves_state_clean() {
        let (_temp, change_dir) = setup_test_change();
        let mut manager = create_state(&change_dir);

        assert!(manager.mark(Stage::Proposal, StageStatus::Complete).is_err());
        assert!(!manager.is_dirty());
    }

    #[test]
    fn test_staleness_detection() {
        let (_temp, change_dir) = setup_test_change();
        let mut manager = create_state(&change_dir);
        manager.update_checksum(Artifact::Proposal, Stage::Proposal).unwrap();

        assert!(!manager.is_stale(Artifact::Proposal).unwrap());
        assert!(manager
            .state()
            .checksums
            .get("proposal.md")
            .unwrap()
            .hash
            .starts_with("sha256:"));

        std::fs::write(change_dir.join("proposal.md"), "# Modified Proposal\n").unwrap();
        assert!(manager.is_stale(Artifact::Proposal).unwrap());

        let report = manager.check_staleness().unwrap();
        assert_eq!(report.stale_files, vec![Artifact::Proposal]);
        assert_eq!(report.missing_checksums, vec![Artifact::TaskList]);
        assert!(report.has_stale());
        assert!(!report.is_fresh());
    }

    #[test]
    fn test_record_validation() {
        let (_temp, change_dir) = setup_test_change();
        let mut manager = create_state(&change_dir);

        let mut report = ValidationReport::default();
        report.push(Finding::new(
            "criterion not covered",
            Artifact::TestPlan,
            None,
            Severity::Medium,
            ErrorCategory::UncoveredCriterion,
        ));
        manager.record_validation(Stage::Tasks, &report);

        let last = manager.last_validation(Stage::Tasks).unwrap();
        assert!(last.valid);
        assert_eq!(last.warnings, 1);
        assert_eq!(last.messages.len(), 1);
        assert!(manager.last_validation(Stage::Proposal).is_none());
    }

    #[test]
    fn test_relocate_saves_to_new_dir() {
        let (temp, change_dir) = setup_test_change();
        let mut manager = create_state(&change_dir);

        let moved = temp.path().join("archive/20260101-test-change");
        std::fs::create_dir_all(&moved).unwrap();
        manager.relocate(&moved);
        manager.save_if_dirty().unwrap();

        assert!(StateManager::exists(&moved));
        assert_eq!(manager.change_dir(), moved.as_path());
    }
}
