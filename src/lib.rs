// changegate - stage-gated change pipeline
// Drives a change through thirteen ordered stages, from checklist to pull request

pub mod archive;
pub mod checkpoint;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod parser;
pub mod state;
pub mod store;
pub mod validator;
pub mod version;

pub use anyhow::{Context, Result};

// Re-export commonly used types
pub use engine::{Engine, RunMode, RunOptions, StageReport};
pub use error::{PipelineError, PipelineResult, StageFailure};
pub use models::{Artifact, ChangeState, Stage, StageStatus};
pub use state::{StalenessReport, StateManager};
