//! CheckpointManager - snapshot, list, restore and prune artifact snapshots

use crate::error::{PipelineError, PipelineResult};
use crate::models::{Artifact, Checkpoint, SnapshotFile, Stage};
use crate::parser::calculate_bytes_checksum;
use crate::store::write_atomic;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::path::{Path, PathBuf};

pub const CHECKPOINT_DIR: &str = ".checkpoints";
pub const MANIFEST_FILE: &str = "checkpoint.json";

/// Alias accepted wherever a checkpoint id is expected
const LATEST: &str = "latest";

/// `YYYYMMDDTHHMMSSmmmZ-sNN`
pub fn format_checkpoint_id(timestamp: DateTime<Utc>, stage: Stage) -> String {
    format!("{}-s{:02}", timestamp.format("%Y%m%dT%H%M%S%3fZ"), stage.index())
}

/// Checkpoint store for a single change
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    change_dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(change_dir: impl Into<PathBuf>) -> Self {
        Self {
            change_dir: change_dir.into(),
        }
    }

    fn root(&self) -> PathBuf {
        self.change_dir.join(CHECKPOINT_DIR)
    }

    fn checkpoint_dir(&self, id: &str) -> PathBuf {
        self.root().join(id)
    }

    /// Snapshot every artifact currently present
    pub fn create(&self, stage: Stage, note: Option<&str>) -> PipelineResult<Checkpoint> {
        // Ids must sort in creation order even when the clock has not moved
        let mut created_at = Utc::now().trunc_subsecs(3);
        if let Some(last) = self.list()?.last() {
            if created_at <= last.created_at {
                created_at = last.created_at + Duration::milliseconds(1);
            }
        }

        let id = format_checkpoint_id(created_at, stage);
        let dir = self.checkpoint_dir(&id);
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;

        let mut files = Vec::new();
        for artifact in Artifact::ALL {
            let source = artifact.path(&self.change_dir);
            let bytes = match std::fs::read(&source) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(PipelineError::io(&source, e)),
            };
            write_atomic(&dir.join(artifact.file_name()), &bytes)?;
            files.push(SnapshotFile {
                artifact,
                checksum: calculate_bytes_checksum(&bytes),
                size: bytes.len() as u64,
            });
        }

        let checkpoint = Checkpoint {
            id,
            stage,
            note: note.map(str::to_string),
            created_at,
            files,
        };

        // The manifest goes last; a directory without one is not a checkpoint
        let manifest_path = dir.join(MANIFEST_FILE);
        let content = serde_json::to_string_pretty(&checkpoint)
            .map_err(|e| PipelineError::json(&manifest_path, e))?;
        write_atomic(&manifest_path, content.as_bytes())?;

        tracing::debug!(id = %checkpoint.id, files = checkpoint.files.len(), "checkpoint created");
        Ok(checkpoint)
    }

    /// All checkpoints, oldest first
    pub fn list(&self) -> PipelineResult<Vec<Checkpoint>> {
        let root = self.root();
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut checkpoints = Vec::new();
        for entry in std::fs::read_dir(&root).map_err(|e| PipelineError::io(&root, e))? {
            let entry = entry.map_err(|e| PipelineError::io(&root, e))?;
            let manifest_path = entry.path().join(MANIFEST_FILE);
            if !manifest_path.is_file() {
                tracing::warn!(dir = %entry.path().display(), "skipping checkpoint without manifest");
                continue;
            }
            checkpoints.push(read_manifest(&manifest_path)?);
        }

        checkpoints.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(checkpoints)
    }

    /// Look up a checkpoint by id (or `latest`)
    pub fn get(&self, id: &str) -> PipelineResult<Checkpoint> {
        if id == LATEST {
            return self
                .list()?
                .pop()
                .ok_or_else(|| PipelineError::CheckpointNotFound { id: id.to_string() });
        }

        let manifest_path = self.checkpoint_dir(id).join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(PipelineError::CheckpointNotFound { id: id.to_string() });
        }
        read_manifest(&manifest_path)
    }

    /// Restore artifacts to the snapshot's exact bytes.
    ///
    /// Artifacts absent from the snapshot are removed. Every snapshot file is
    /// verified before anything in the change directory is touched.
    pub fn rollback(&self, id: &str) -> PipelineResult<Checkpoint> {
        let checkpoint = self.get(id)?;
        let dir = self.checkpoint_dir(&checkpoint.id);

        let mut restored = Vec::with_capacity(checkpoint.files.len());
        for file in &checkpoint.files {
            let path = dir.join(file.artifact.file_name());
            let bytes = std::fs::read(&path).map_err(|e| PipelineError::io(&path, e))?;
            if calculate_bytes_checksum(&bytes) != file.checksum {
                return Err(PipelineError::CheckpointCorrupted {
                    id: checkpoint.id.clone(),
                    file: file.artifact.file_name().to_string(),
                });
            }
            restored.push((file.artifact, bytes));
        }

        for artifact in Artifact::ALL {
            let target = artifact.path(&self.change_dir);
            match restored.iter().find(|(a, _)| *a == artifact) {
                Some((_, bytes)) => write_atomic(&target, bytes)?,
                None => match std::fs::remove_file(&target) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(PipelineError::io(&target, e)),
                },
            }
        }

        tracing::info!(id = %checkpoint.id, "rolled back artifacts");
        Ok(checkpoint)
    }

    /// Delete all but the newest `keep` checkpoints; returns removed ids
    pub fn cleanup(&self, keep: usize) -> PipelineResult<Vec<String>> {
        let checkpoints = self.list()?;
        if checkpoints.len() <= keep {
            return Ok(Vec::new());
        }

        let excess = checkpoints.len() - keep;
        let mut removed = Vec::with_capacity(excess);
        for checkpoint in checkpoints.into_iter().take(excess) {
            let dir = self.checkpoint_dir(&checkpoint.id);
            std::fs::remove_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
            removed.push(checkpoint.id);
        }

        tracing::debug!(removed = removed.len(), keep, "pruned checkpoints");
        Ok(removed)
    }
}

fn read_manifest(path: &Path) -> PipelineResult<Checkpoint> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| PipelineError::json(path, e))
}
