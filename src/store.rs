//! Artifact Store
//!
//! Reads and writes the fixed artifact set of a change. Every write replaces
//! the whole file through a temp file in the same directory, so readers only
//! ever see the old or the new content.

use crate::archive::parse_archive_folder_name;
use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::models::Artifact;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Atomically replace `path` with `content`
pub fn write_atomic(path: &Path, content: &[u8]) -> PipelineResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| PipelineError::io(path, std::io::Error::other("path has no parent directory")))?;
    std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;

    let mut temp_file = NamedTempFile::new_in(parent).map_err(|e| PipelineError::io(parent, e))?;
    temp_file
        .write_all(content)
        .and_then(|_| temp_file.flush())
        .map_err(|e| PipelineError::io(path, e))?;
    temp_file
        .persist(path)
        .map_err(|e| PipelineError::io(path, e.error))?;

    Ok(())
}

/// Read a file that may not exist
pub fn read_optional(path: &Path) -> PipelineResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PipelineError::io(path, e)),
    }
}

/// Artifact contents keyed by artifact; absent documents are simply missing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSet {
    docs: BTreeMap<Artifact, String>,
}

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, artifact: Artifact, content: impl Into<String>) -> Self {
        self.insert(artifact, content);
        self
    }

    pub fn insert(&mut self, artifact: Artifact, content: impl Into<String>) {
        self.docs.insert(artifact, content.into());
    }

    pub fn get(&self, artifact: Artifact) -> Option<&str> {
        self.docs.get(&artifact).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Artifact, &str)> {
        self.docs.iter().map(|(a, c)| (*a, c.as_str()))
    }
}

/// File access for a single change directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    change_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(change_dir: impl Into<PathBuf>) -> Self {
        Self {
            change_dir: change_dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.change_dir
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        artifact.path(&self.change_dir)
    }

    pub fn exists(&self, artifact: Artifact) -> bool {
        self.path(artifact).is_file()
    }

    pub fn read(&self, artifact: Artifact) -> PipelineResult<Option<String>> {
        read_optional(&self.path(artifact))
    }

    /// Read an artifact a stage depends on
    pub fn require(&self, artifact: Artifact) -> PipelineResult<String> {
        self.read(artifact)?.ok_or_else(|| PipelineError::MissingArtifact {
            artifact,
            path: self.path(artifact),
        })
    }

    pub fn write(&self, artifact: Artifact, content: &str) -> PipelineResult<()> {
        tracing::debug!(artifact = %artifact, dir = %self.change_dir.display(), "writing artifact");
        write_atomic(&self.path(artifact), content.as_bytes())
    }

    pub fn remove(&self, artifact: Artifact) -> PipelineResult<()> {
        let path = self.path(artifact);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::io(path, e)),
        }
    }

    /// Artifacts currently on disk
    pub fn present(&self) -> Vec<Artifact> {
        Artifact::ALL
            .iter()
            .copied()
            .filter(|a| self.exists(*a))
            .collect()
    }

    pub fn load_all(&self) -> PipelineResult<DocumentSet> {
        let mut set = DocumentSet::new();
        for artifact in Artifact::ALL {
            if let Some(content) = self.read(artifact)? {
                set.insert(artifact, content);
            }
        }
        Ok(set)
    }
}

/// Where a change currently lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLocation {
    pub dir: PathBuf,
    pub archived: bool,
}

/// Find a change among active changes, then in the archive
pub fn locate_change(config: &Config, project_root: &Path, change_id: &str) -> Option<ChangeLocation> {
    let active = config.changes_root(project_root).join(change_id);
    if active.is_dir() {
        return Some(ChangeLocation {
            dir: active,
            archived: false,
        });
    }

    let archive_root = config.archive_root(project_root);
    let entries = std::fs::read_dir(&archive_root).ok()?;
    let mut matches: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_archive_folder_name)
                .map_or(false, |(_, id)| id == change_id)
        })
        .collect();

    // Newest archive wins if a change id was ever reused
    matches.sort();
    matches.pop().map(|dir| ChangeLocation {
        dir,
        archived: true,
    })
}

/// Active change ids, sorted
pub fn list_active(config: &Config, project_root: &Path) -> PipelineResult<Vec<String>> {
    let root = config.changes_root(project_root);
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut ids = Vec::new();
    for entry in std::fs::read_dir(&root).map_err(|e| PipelineError::io(&root, e))? {
        let entry = entry.map_err(|e| PipelineError::io(&root, e))?;
        if entry.path().is_dir() {
            ids.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    ids.sort();
    Ok(ids)
}
