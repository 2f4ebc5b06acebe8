//! STATE.json Management Module
//!
//! Handles persistence and tracking of change state, including:
//! - Stage status vector and its prerequisite chain
//! - Chosen version and release branch
//! - Artifact checksums for staleness detection
//! - Validation history

mod manager;

pub use manager::{StalenessReport, StateManager, STATE_FILE};
