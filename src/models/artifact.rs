use super::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One of the documents owned by a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    Checklist,
    Proposal,
    Specification,
    TaskList,
    TestPlan,
}

impl Artifact {
    pub const ALL: [Artifact; 5] = [
        Artifact::Checklist,
        Artifact::Proposal,
        Artifact::Specification,
        Artifact::TaskList,
        Artifact::TestPlan,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::Checklist => "checklist.md",
            Artifact::Proposal => "proposal.md",
            Artifact::Specification => "specification.md",
            Artifact::TaskList => "tasks.md",
            Artifact::TestPlan => "test_plan.md",
        }
    }

    pub fn from_file_name(name: &str) -> Option<Artifact> {
        Self::ALL.iter().copied().find(|a| a.file_name() == name)
    }

    pub fn path(&self, change_dir: &Path) -> PathBuf {
        change_dir.join(self.file_name())
    }

    /// Stage that creates this artifact
    pub fn owning_stage(&self) -> Stage {
        match self {
            Artifact::Checklist => Stage::Todo,
            Artifact::Proposal => Stage::Proposal,
            Artifact::Specification => Stage::Specification,
            Artifact::TaskList => Stage::Tasks,
            Artifact::TestPlan => Stage::TestPlan,
        }
    }

    /// Artifact produced by a stage, if any
    pub fn for_stage(stage: Stage) -> Option<Artifact> {
        Self::ALL.iter().copied().find(|a| a.owning_stage() == stage)
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_round_trip() {
        for artifact in Artifact::ALL {
            assert_eq!(Artifact::from_file_name(artifact.file_name()), Some(artifact));
        }
        assert_eq!(Artifact::from_file_name("STATE.json"), None);
    }

    #[test]
    fn test_stage_ownership() {
        assert_eq!(Artifact::for_stage(Stage::Tasks), Some(Artifact::TaskList));
        assert_eq!(Artifact::for_stage(Stage::Commit), None);
        assert_eq!(Artifact::TestPlan.owning_stage(), Stage::TestPlan);
    }
}
