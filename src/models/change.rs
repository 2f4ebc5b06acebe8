use super::{Stage, StageStatus, STAGE_COUNT};
use crate::error::{PipelineError, PipelineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SCHEMA_VERSION: &str = "1.0";

/// Persisted state of a change (STATE.json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeState {
    /// Stable slug (e.g., "add-oauth")
    pub change_id: String,

    /// Human title
    pub title: String,

    /// Owner handle
    pub owner: String,

    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Status per stage, indexed by stage number
    pub stages: [StageStatus; STAGE_COUNT],

    /// Version chosen by the version stage
    #[serde(default)]
    pub version: Option<String>,

    /// Release branch chosen by the version stage
    #[serde(default)]
    pub branch: Option<String>,

    /// Last action performed
    #[serde(default)]
    pub last_action: Option<String>,

    /// Artifact checksums recorded at the last completed stage
    #[serde(default)]
    pub checksums: BTreeMap<String, ChecksumEntry>,

    /// Validation history
    #[serde(default)]
    pub validations: Vec<ValidationEntry>,

    #[serde(default)]
    pub test_run: Option<TestRunRecord>,

    #[serde(default)]
    pub pull_request: Option<PullRequestRecord>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Checksum entry with the stage that recorded it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumEntry {
    pub hash: String,
    pub stage: Stage,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Validation history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationEntry {
    pub stage: Stage,
    pub timestamp: DateTime<Utc>,
    pub valid: bool,
    pub issues: usize,
    pub warnings: usize,
    #[serde(default)]
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunRecord {
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub branch: String,
    pub url: String,
    /// Whether the PR already existed when the stage ran
    pub reused: bool,
}

impl ChangeState {
    pub fn new(
        change_id: impl Into<String>,
        title: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            change_id: change_id.into(),
            title: title.into(),
            owner: owner.into(),
            schema_version: default_schema_version(),
            created_at: now,
            updated_at: now,
            stages: [StageStatus::NotStarted; STAGE_COUNT],
            version: None,
            branch: None,
            last_action: None,
            checksums: BTreeMap::new(),
            validations: Vec::new(),
            test_run: None,
            pull_request: None,
        }
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        self.stages[stage.index()]
    }

    /// First prerequisite of `stage` that is not Complete
    pub fn first_unmet_prerequisite(&self, stage: Stage) -> Option<Stage> {
        stage
            .prerequisites()
            .iter()
            .copied()
            .find(|s| self.status(*s) != StageStatus::Complete)
    }

    /// Set a stage status, refusing transitions that would break the
    /// prerequisite chain. A stage that is no longer done takes every later
    /// stage back to NotStarted.
    pub fn mark(&mut self, stage: Stage, status: StageStatus) -> PipelineResult<()> {
        if matches!(status, StageStatus::Complete | StageStatus::Skipped) {
            if let Some(missing) = self.first_unmet_prerequisite(stage) {
                return Err(PipelineError::SequenceViolation { stage, missing });
            }
        }
        if status == StageStatus::Skipped && stage != Stage::PullRequest {
            return Err(PipelineError::Config(format!(
                "stage {} ({}) cannot be skipped",
                stage,
                stage.name()
            )));
        }
        self.stages[stage.index()] = status;
        if !status.is_done() {
            // Later stages were built on this one and no longer count as done
            self.reset_after(stage);
        }
        Ok(())
    }

    /// Reset every stage after `stage` to NotStarted
    pub fn reset_after(&mut self, stage: Stage) {
        for status in self.stages.iter_mut().skip(stage.index() + 1) {
            *status = StageStatus::NotStarted;
        }
    }

    /// First stage that is not yet done
    pub fn next_stage(&self) -> Option<Stage> {
        Stage::ALL.iter().copied().find(|s| !self.status(*s).is_done())
    }

    /// Highest stage that is Complete
    pub fn last_complete(&self) -> Option<Stage> {
        Stage::ALL
            .iter()
            .rev()
            .copied()
            .find(|s| self.status(*s) == StageStatus::Complete)
    }

    pub fn completion_percent(&self) -> u8 {
        let done = self.stages.iter().filter(|s| s.is_done()).count();
        ((done * 100) / STAGE_COUNT) as u8
    }

    pub fn is_finished(&self) -> bool {
        self.stages.iter().all(|s| s.is_done())
    }

    /// Complete at index i implies Complete at every index below i
    pub fn is_monotonic(&self) -> bool {
        let mut seen_gap = false;
        for status in &self.stages {
            match status {
                StageStatus::Complete if seen_gap => return false,
                StageStatus::Complete => {}
                StageStatus::Skipped => {}
                _ => seen_gap = true,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_through(state: &mut ChangeState, last: Stage) {
        for stage in Stage::ALL.iter().take(last.index() + 1) {
            state.mark(*stage, StageStatus::Complete).unwrap();
        }
    }

    #[test]
    fn test_new_state_has_nothing_done() {
        let state = ChangeState::new("add-oauth", "Add OAuth", "alice");
        assert_eq!(state.next_stage(), Some(Stage::Todo));
        assert_eq!(state.completion_percent(), 0);
        assert!(state.is_monotonic());
        assert_eq!(state.last_complete(), None);
    }

    #[test]
    fn test_mark_refuses_out_of_order_completion() {
        let mut state = ChangeState::new("c", "C", "o");
        state.mark(Stage::Todo, StageStatus::Complete).unwrap();

        let err = state.mark(Stage::Proposal, StageStatus::Complete).unwrap_err();
        match err {
            PipelineError::SequenceViolation { stage, missing } => {
                assert_eq!(stage, Stage::Proposal);
                assert_eq!(missing, Stage::Version);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(state.status(Stage::Proposal), StageStatus::NotStarted);
        assert!(state.is_monotonic());
    }

    #[test]
    fn test_failed_status_does_not_need_prerequisites_met() {
        let mut state = ChangeState::new("c", "C", "o");
        complete_through(&mut state, Stage::Tasks);
        state.mark(Stage::Commit, StageStatus::Failed).unwrap();
        assert!(state.is_monotonic());
        assert_eq!(state.next_stage(), Some(Stage::TestPlan));
    }

    #[test]
    fn test_failing_an_earlier_stage_resets_later_ones() {
        let mut state = ChangeState::new("c", "C", "o");
        complete_through(&mut state, Stage::Archive);
        state.mark(Stage::Commit, StageStatus::Failed).unwrap();
        assert_eq!(state.status(Stage::Commit), StageStatus::Failed);
        assert_eq!(state.status(Stage::Archive), StageStatus::NotStarted);
        assert_eq!(state.last_complete(), Some(Stage::DocUpdate));
        assert!(state.is_monotonic());
    }

    #[test]
    fn test_skip_only_allowed_for_pull_request() {
        let mut state = ChangeState::new("c", "C", "o");
        complete_through(&mut state, Stage::Archive);
        assert!(state.mark(Stage::Commit, StageStatus::Skipped).is_err());
        state.mark(Stage::PullRequest, StageStatus::Skipped).unwrap();
        assert!(state.is_finished());
        assert_eq!(state.completion_percent(), 100);
    }

    #[test]
    fn test_reset_after() {
        let mut state = ChangeState::new("c", "C", "o");
        complete_through(&mut state, Stage::TestPlan);
        state.reset_after(Stage::Proposal);
        assert_eq!(state.last_complete(), Some(Stage::Proposal));
        assert_eq!(state.status(Stage::Specification), StageStatus::NotStarted);
        assert!(state.is_monotonic());
    }

    #[test]
    fn test_monotonic_detects_gap() {
        let mut state = ChangeState::new("c", "C", "o");
        state.stages[0] = StageStatus::Complete;
        state.stages[2] = StageStatus::Complete;
        assert!(!state.is_monotonic());
    }

    #[test]
    fn test_json_round_trip_keeps_stage_vector() {
        let mut state = ChangeState::new("c", "C", "o");
        complete_through(&mut state, Stage::Version);
        state.version = Some("0.1.38".into());
        let json = serde_json::to_string(&state).unwrap();
        let back: ChangeState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert!(json.contains("\"not_started\""));
    }
}
