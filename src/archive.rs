//! Archive Manager
//!
//! Moves a finished change from the active changes directory into permanent
//! storage at `<archive_dir>/<YYYYMMDD>-<change_id>/`, keeping the exact
//! layout (artifacts, STATE.json, checkpoints, tooling). The copy is made
//! first and the active directory removed only after every file landed.

use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{ChangeState, Stage};
use crate::state::StateManager;
use crate::store::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const INDEX_FILE: &str = "index.json";

/// Split `YYYYMMDD-change-id` into its date and change id
pub fn parse_archive_folder_name(folder_name: &str) -> Option<(String, String)> {
    let (date_str, change_id) = folder_name.split_once('-')?;

    if date_str.len() != 8 || !date_str.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if change_id.is_empty() {
        return None;
    }

    Some((date_str.to_string(), change_id.to_string()))
}

/// `YYYYMMDD` to `YYYY-MM-DD`
pub fn format_date(date_str: &str) -> String {
    if date_str.len() == 8 {
        format!("{}-{}-{}", &date_str[0..4], &date_str[4..6], &date_str[6..8])
    } else {
        date_str.to_string()
    }
}

/// One line of `index.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub change_id: String,
    pub title: String,
    #[serde(default)]
    pub version: Option<String>,
    pub folder: String,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    pub path: PathBuf,
    pub warnings: Vec<String>,
}

/// An archived change found on disk
#[derive(Debug, Clone)]
pub struct ArchivedChange {
    /// YYYY-MM-DD
    pub date: String,
    pub change_id: String,
    pub dir: PathBuf,
    pub state: Option<ChangeState>,
}

pub struct ArchiveManager<'a> {
    config: &'a Config,
    project_root: PathBuf,
}

impl<'a> ArchiveManager<'a> {
    pub fn new(config: &'a Config, project_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            project_root: project_root.into(),
        }
    }

    fn root(&self) -> PathBuf {
        self.config.archive_root(&self.project_root)
    }

    /// Where a change archived today would land
    pub fn destination(&self, change_id: &str) -> PathBuf {
        self.root()
            .join(format!("{}-{}", Utc::now().format("%Y%m%d"), change_id))
    }

    /// Stages before the archive stage that are not done
    pub fn incomplete_stages(state: &ChangeState) -> Vec<Stage> {
        Stage::Archive
            .prerequisites()
            .iter()
            .copied()
            .filter(|s| !state.status(*s).is_done())
            .collect()
    }

    /// Relocate the active change into the archive
    pub fn archive(&self, change_id: &str) -> PipelineResult<ArchiveOutcome> {
        let active = self.config.changes_root(&self.project_root).join(change_id);
        if !active.is_dir() {
            return Err(PipelineError::ChangeNotFound {
                change_id: change_id.to_string(),
            });
        }

        let mut warnings = Vec::new();
        let state = match StateManager::load(&active) {
            Ok(manager) => Some(manager.state().clone()),
            Err(e) => {
                warnings.push(format!("could not read change state: {}", e));
                None
            }
        };
        if let Some(state) = &state {
            for stage in Self::incomplete_stages(state) {
                warnings.push(format!("stage {} ({}) is not complete", stage, stage.name()));
            }
        }

        let destination = self.destination(change_id);
        if destination.exists() {
            return Err(PipelineError::ArchiveDestinationExists { path: destination });
        }

        let partial = |reason: String| PipelineError::ArchivePartialFailure {
            change_id: change_id.to_string(),
            active: active.clone(),
            archive: destination.clone(),
            reason,
        };

        let copied = copy_tree(&active, &destination).map_err(partial)?;
        tracing::debug!(files = copied, to = %destination.display(), "change copied to archive");

        std::fs::remove_dir_all(&active)
            .map_err(|e| partial(format!("could not remove active directory: {}", e)))?;

        if let Err(warning) = self.append_index(change_id, state.as_ref(), &destination) {
            warnings.push(warning);
        }

        tracing::info!(change_id, path = %destination.display(), "change archived");
        Ok(ArchiveOutcome {
            path: destination,
            warnings,
        })
    }

    fn append_index(
        &self,
        change_id: &str,
        state: Option<&ChangeState>,
        destination: &Path,
    ) -> Result<(), String> {
        let path = self.root().join(INDEX_FILE);
        let mut entries: Vec<ArchiveEntry> = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| format!("archive index {} is unreadable, not updated: {}", path.display(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(format!("archive index not updated: {}", e)),
        };

        entries.push(ArchiveEntry {
            change_id: change_id.to_string(),
            title: state.map(|s| s.title.clone()).unwrap_or_default(),
            version: state.and_then(|s| s.version.clone()),
            folder: destination
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            archived_at: Utc::now(),
        });

        let content = serde_json::to_string_pretty(&entries).map_err(|e| e.to_string())?;
        write_atomic(&path, content.as_bytes()).map_err(|e| format!("archive index not updated: {}", e))
    }

    /// Archived changes, newest first
    pub fn list(&self) -> PipelineResult<Vec<ArchivedChange>> {
        let root = self.root();
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut changes = Vec::new();
        for entry in std::fs::read_dir(&root).map_err(|e| PipelineError::io(&root, e))? {
            let entry = entry.map_err(|e| PipelineError::io(&root, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let folder_name = entry.file_name().to_string_lossy().to_string();
            let Some((date_str, change_id)) = parse_archive_folder_name(&folder_name) else {
                tracing::warn!(folder = %folder_name, "skipping malformed archive folder");
                continue;
            };

            let state = StateManager::load(&path).ok().map(|m| m.state().clone());
            changes.push(ArchivedChange {
                date: format_date(&date_str),
                change_id,
                dir: path,
                state,
            });
        }

        changes.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.change_id.cmp(&b.change_id)));
        Ok(changes)
    }
}

/// Recursively copy `from` into a new directory `to`; returns files copied
fn copy_tree(from: &Path, to: &Path) -> Result<usize, String> {
    let mut copied = 0;
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| format!("could not walk {}: {}", from.display(), e))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| e.to_string())?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .map_err(|e| format!("could not create {}: {}", target.display(), e))?;
        } else {
            std::fs::copy(entry.path(), &target)
                .map_err(|e| format!("could not copy {}: {}", entry.path().display(), e))?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StageStatus;
    use tempfile::TempDir;

    #[test]
    fn test_parse_archive_folder_name() {
        assert_eq!(
            parse_archive_folder_name("20260116-test-retry-feature"),
            Some(("20260116".to_string(), "test-retry-feature".to_string()))
        );
        assert_eq!(parse_archive_folder_name("2026011-test"), None);
        assert_eq!(parse_archive_folder_name("2026o116-test"), None);
        assert_eq!(parse_archive_folder_name("20260116-"), None);
        assert_eq!(parse_archive_folder_name("index.json"), None);
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("20260116"), "2026-01-16");
        assert_eq!(format_date("bad"), "bad");
    }

    fn setup_change(root: &Path, config: &Config, id: &str) -> PathBuf {
        let dir = config.changes_root(root).join(id);
        std::fs::create_dir_all(dir.join(".checkpoints/a")).unwrap();
        std::fs::write(dir.join("proposal.md"), "# P\n").unwrap();
        std::fs::write(dir.join(".checkpoints/a/checkpoint.json"), "{}").unwrap();
        let mut state = ChangeState::new(id, "Title", "alice");
        for stage in &Stage::ALL[..Stage::Archive.index()] {
            state.mark(*stage, StageStatus::Complete).unwrap();
        }
        let mut manager = StateManager::create(&dir, state);
        manager.save().unwrap();
        dir
    }

    #[test]
    fn test_archive_moves_everything() {
        let temp = TempDir::new().unwrap();
        let config = Config::default();
        let active = setup_change(temp.path(), &config, "add-oauth");
        let archiver = ArchiveManager::new(&config, temp.path());

        let outcome = archiver.archive("add-oauth").unwrap();
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        assert!(!active.exists());
        assert!(outcome.path.join("proposal.md").is_file());
        assert!(outcome.path.join("STATE.json").is_file());
        assert!(outcome.path.join(".checkpoints/a/checkpoint.json").is_file());

        let index: Vec<ArchiveEntry> = serde_json::from_str(
            &std::fs::read_to_string(config.archive_root(temp.path()).join(INDEX_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].title, "Title");

        let listed = archiver.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].change_id, "add-oauth");
        assert!(listed[0].state.is_some());
    }

    #[test]
    fn test_incomplete_stages_are_warnings() {
        let temp = TempDir::new().unwrap();
        let config = Config::default();
        let dir = config.changes_root(temp.path()).join("wip");
        std::fs::create_dir_all(&dir).unwrap();
        StateManager::create(&dir, ChangeState::new("wip", "WIP", "bob"))
            .save()
            .unwrap();

        let outcome = ArchiveManager::new(&config, temp.path()).archive("wip").unwrap();
        assert_eq!(outcome.warnings.len(), Stage::Archive.index());
    }

    #[test]
    fn test_existing_destination_is_refused() {
        let temp = TempDir::new().unwrap();
        let config = Config::default();
        let active = setup_change(temp.path(), &config, "dup");
        let archiver = ArchiveManager::new(&config, temp.path());
        std::fs::create_dir_all(archiver.destination("dup")).unwrap();

        let err = archiver.archive("dup").unwrap_err();
        assert!(matches!(err, PipelineError::ArchiveDestinationExists { .. }));
        assert!(active.join("proposal.md").exists());
    }

    #[test]
    fn test_unknown_change() {
        let temp = TempDir::new().unwrap();
        let config = Config::default();
        let err = ArchiveManager::new(&config, temp.path()).archive("nope").unwrap_err();
        assert!(matches!(err, PipelineError::ChangeNotFound { .. }));
    }
}
