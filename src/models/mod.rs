pub mod artifact;
pub mod change;
pub mod checkpoint;
pub mod stage;
pub mod validation;

pub use artifact::Artifact;
pub use change::{
    ChangeState, ChecksumEntry, PullRequestRecord, TestRunRecord, ValidationEntry,
};
pub use checkpoint::{Checkpoint, SnapshotFile};
pub use stage::{Stage, StageStatus, STAGE_COUNT};
pub use validation::{CrossRef, ErrorCategory, Finding, Severity, ValidationReport};
