//! Pipeline error taxonomy
//!
//! Every failure a stage can produce maps to one `PipelineError` variant.
//! Recoverable kinds are fixed by editing an artifact and re-running the same
//! stage; fatal kinds stop the invocation and are never retried automatically.

use crate::models::{Artifact, Finding, Stage};
use std::path::PathBuf;
use thiserror::Error;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stage {stage} ({}) requires stage {missing} ({}) to be complete", stage.name(), missing.name())]
    SequenceViolation { stage: Stage, missing: Stage },

    #[error("{artifact} is missing: {}", path.display())]
    MissingArtifact { artifact: Artifact, path: PathBuf },

    #[error("{artifact} still contains {count} unfilled placeholder(s); first at line {line}: {text}")]
    TemplatePlaceholderRemaining {
        artifact: Artifact,
        count: usize,
        line: usize,
        text: String,
    },

    #[error("{artifact} is incomplete: {}", missing.join("; "))]
    StructureIncomplete {
        artifact: Artifact,
        missing: Vec<String>,
    },

    #[error("proposal changes are not reflected in the task list ({} blocking issue(s)): {}", issues.len(), issues.iter().map(|i| i.message.as_str()).collect::<Vec<_>>().join("; "))]
    CrossValidationBlocking { issues: Vec<Finding> },

    #[error("{} task(s) still open in tasks.md: {}", open.len(), open.join("; "))]
    TasksIncomplete { open: Vec<String> },

    #[error("no free version after {attempts} attempt(s) starting from {start}")]
    VersionCollisionExhausted { start: String, attempts: usize },

    #[error("version not found in {} (pattern: {pattern})", path.display())]
    VersionNotFound { path: PathBuf, pattern: String },

    #[error("invalid version '{value}': {source}")]
    InvalidVersion {
        value: String,
        source: semver::Error,
    },

    #[error("archive of '{change_id}' failed midway ({reason}); active copy: {}, archive copy: {}", active.display(), archive.display())]
    ArchivePartialFailure {
        change_id: String,
        active: PathBuf,
        archive: PathBuf,
        reason: String,
    },

    #[error("archive destination already exists: {}", path.display())]
    ArchiveDestinationExists { path: PathBuf },

    #[error("{tool} failed{}: {message}", code.map(|c| format!(" with exit code {}", c)).unwrap_or_default())]
    CollaboratorFailure {
        tool: String,
        code: Option<i32>,
        message: String,
    },

    #[error("change '{change_id}' not found")]
    ChangeNotFound { change_id: String },

    #[error("checkpoint '{id}' not found")]
    CheckpointNotFound { id: String },

    #[error("checkpoint '{id}' is corrupted: {file} does not match its recorded checksum")]
    CheckpointCorrupted { id: String, file: String },

    #[error("invalid stage {0}: stages are numbered 0-12")]
    InvalidStage(usize),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to (de)serialize {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Coarse classification used for exit codes and recoverability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SequenceViolation,
    MissingArtifact,
    TemplatePlaceholderRemaining,
    StructureIncomplete,
    CrossValidationBlocking,
    TasksIncomplete,
    VersionCollisionExhausted,
    ArchivePartialFailure,
    CollaboratorFailure,
    Other,
}

impl ErrorKind {
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Other => 1,
            ErrorKind::SequenceViolation => 2,
            ErrorKind::MissingArtifact => 3,
            ErrorKind::TemplatePlaceholderRemaining => 4,
            ErrorKind::StructureIncomplete => 5,
            ErrorKind::CrossValidationBlocking => 6,
            ErrorKind::TasksIncomplete => 7,
            ErrorKind::VersionCollisionExhausted => 8,
            ErrorKind::ArchivePartialFailure => 9,
            ErrorKind::CollaboratorFailure => 10,
        }
    }
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        PipelineError::Json {
            path: path.into(),
            source,
        }
    }

    pub fn collaborator(tool: impl Into<String>, code: Option<i32>, message: impl Into<String>) -> Self {
        PipelineError::CollaboratorFailure {
            tool: tool.into(),
            code,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::SequenceViolation { .. } => ErrorKind::SequenceViolation,
            PipelineError::MissingArtifact { .. } => ErrorKind::MissingArtifact,
            PipelineError::TemplatePlaceholderRemaining { .. } => {
                ErrorKind::TemplatePlaceholderRemaining
            }
            PipelineError::StructureIncomplete { .. } => ErrorKind::StructureIncomplete,
            PipelineError::CrossValidationBlocking { .. } => ErrorKind::CrossValidationBlocking,
            PipelineError::TasksIncomplete { .. } => ErrorKind::TasksIncomplete,
            PipelineError::VersionCollisionExhausted { .. } => {
                ErrorKind::VersionCollisionExhausted
            }
            PipelineError::ArchivePartialFailure { .. } => ErrorKind::ArchivePartialFailure,
            PipelineError::CollaboratorFailure { .. } => ErrorKind::CollaboratorFailure,
            _ => ErrorKind::Other,
        }
    }

    /// Recoverable errors are fixed by the operator and the same stage re-run
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::SequenceViolation { .. }
                | PipelineError::MissingArtifact { .. }
                | PipelineError::TemplatePlaceholderRemaining { .. }
                | PipelineError::StructureIncomplete { .. }
                | PipelineError::CrossValidationBlocking { .. }
                | PipelineError::TasksIncomplete { .. }
                | PipelineError::ChangeNotFound { .. }
                | PipelineError::CheckpointNotFound { .. }
                | PipelineError::InvalidStage(_)
                | PipelineError::ArchiveDestinationExists { .. }
        )
    }

    /// The specific missing or invalid items behind this error, one per line
    pub fn items(&self) -> Vec<String> {
        match self {
            PipelineError::StructureIncomplete { missing, .. } => missing.clone(),
            PipelineError::CrossValidationBlocking { issues } => {
                issues.iter().map(|i| i.message.clone()).collect()
            }
            PipelineError::TasksIncomplete { open } => open.clone(),
            PipelineError::TemplatePlaceholderRemaining { line, text, .. } => {
                vec![format!("line {}: {}", line, text)]
            }
            _ => Vec::new(),
        }
    }
}

/// A `PipelineError` raised while executing a specific stage of a change
#[derive(Debug, Error)]
#[error("stage {stage} ({}) failed for '{change_id}': {source}", stage.name())]
pub struct StageFailure {
    pub change_id: String,
    pub stage: Stage,
    #[source]
    pub source: PipelineError,
}

impl StageFailure {
    pub fn new(change_id: impl Into<String>, stage: Stage, source: PipelineError) -> Self {
        Self {
            change_id: change_id.into(),
            stage,
            source,
        }
    }

    /// Command the operator runs after remediation
    pub fn rerun_command(&self) -> String {
        let stage = match &self.source {
            // The blocking stage is the one that has to be run first
            PipelineError::SequenceViolation { missing, .. } => *missing,
            _ => self.stage,
        };
        format!("changegate run {} --stage {}", self.change_id, stage.index())
    }

    pub fn exit_code(&self) -> i32 {
        self.source.kind().exit_code()
    }
}
