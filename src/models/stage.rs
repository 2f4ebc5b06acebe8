use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of stages in the pipeline
pub const STAGE_COUNT: usize = 13;

static ORDERED: [Stage; STAGE_COUNT] = Stage::ALL;

/// One of the 13 fixed pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Todo,
    Version,
    Proposal,
    Specification,
    Tasks,
    TestPlan,
    Tooling,
    Implementation,
    TestRun,
    DocUpdate,
    Commit,
    Archive,
    PullRequest,
}

impl Stage {
    pub const ALL: [Stage; STAGE_COUNT] = [
        Stage::Todo,
        Stage::Version,
        Stage::Proposal,
        Stage::Specification,
        Stage::Tasks,
        Stage::TestPlan,
        Stage::Tooling,
        Stage::Implementation,
        Stage::TestRun,
        Stage::DocUpdate,
        Stage::Commit,
        Stage::Archive,
        Stage::PullRequest,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Stage> {
        Self::ALL.get(index).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Todo => "TODO checklist",
            Stage::Version => "version bump",
            Stage::Proposal => "proposal",
            Stage::Specification => "specification",
            Stage::Tasks => "task breakdown",
            Stage::TestPlan => "test plan",
            Stage::Tooling => "tooling generation",
            Stage::Implementation => "implementation",
            Stage::TestRun => "test run",
            Stage::DocUpdate => "doc update",
            Stage::Commit => "git commit",
            Stage::Archive => "archive",
            Stage::PullRequest => "pull request",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Stage::Todo => "📋",
            Stage::Version => "🏷",
            Stage::Proposal => "📝",
            Stage::Specification => "📐",
            Stage::Tasks => "🧩",
            Stage::TestPlan => "🧪",
            Stage::Tooling => "🔧",
            Stage::Implementation => "🔨",
            Stage::TestRun => "▶",
            Stage::DocUpdate => "📚",
            Stage::Commit => "💾",
            Stage::Archive => "📦",
            Stage::PullRequest => "🔀",
        }
    }

    /// Stages strictly before this one
    pub fn prerequisites(&self) -> &'static [Stage] {
        &ORDERED[..self.index()]
    }

    pub fn next(&self) -> Option<Stage> {
        Stage::from_index(self.index() + 1)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Completion status of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    NotStarted,
    Complete,
    Failed,
    Skipped,
}

impl StageStatus {
    /// Counts toward completion percentage
    pub fn is_done(&self) -> bool {
        matches!(self, StageStatus::Complete | StageStatus::Skipped)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            StageStatus::NotStarted => "○",
            StageStatus::Complete => "✓",
            StageStatus::Failed => "✗",
            StageStatus::Skipped => "–",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_indices_match_table_order() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
            assert_eq!(Stage::from_index(i), Some(*stage));
        }
        assert_eq!(Stage::from_index(STAGE_COUNT), None);
    }

    #[test]
    fn test_prerequisites() {
        assert!(Stage::Todo.prerequisites().is_empty());
        assert_eq!(
            Stage::Specification.prerequisites(),
            &[Stage::Todo, Stage::Version, Stage::Proposal]
        );
        assert_eq!(Stage::PullRequest.prerequisites().len(), 12);
    }

    #[test]
    fn test_display_is_stage_number() {
        assert_eq!(Stage::Commit.to_string(), "10");
        assert_eq!(Stage::PullRequest.next(), None);
        assert_eq!(Stage::Todo.next(), Some(Stage::Version));
    }
}
