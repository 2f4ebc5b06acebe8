//! Checkpoint Module
//!
//! Point-in-time snapshots of a change's artifacts, stored under
//! `.checkpoints/<id>/` inside the change directory. Checkpoints never
//! capture or restore STATE.json; stage status is owned by the engine.

mod manager;

pub use manager::{format_checkpoint_id, CheckpointManager, CHECKPOINT_DIR, MANIFEST_FILE};
