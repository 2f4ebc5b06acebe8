//! VersionManager - read, bump and apply the project version

use super::changelog;
use crate::collaborators::{ReviewService, VersionControl};
use crate::config::VersionConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::store::write_atomic;
use chrono::Utc;
use regex::Regex;
use semver::Version;
use std::path::{Path, PathBuf};

/// Which component of the version to increment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BumpKind {
    #[default]
    Patch,
    Minor,
    Major,
}

impl BumpKind {
    /// Next version; pre-release and build metadata are dropped
    pub fn apply(&self, current: &Version) -> Version {
        match self {
            BumpKind::Patch => Version::new(current.major, current.minor, current.patch + 1),
            BumpKind::Minor => Version::new(current.major, current.minor + 1, 0),
            BumpKind::Major => Version::new(current.major + 1, 0, 0),
        }
    }
}

/// Owns the authoritative version source and its mirrors
pub struct VersionManager<'a> {
    config: &'a VersionConfig,
    project_root: PathBuf,
}

impl<'a> VersionManager<'a> {
    pub fn new(config: &'a VersionConfig, project_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            project_root: project_root.into(),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.project_root.join(&self.config.manifest)
    }

    fn pattern(&self) -> PipelineResult<Regex> {
        Regex::new(&self.config.pattern).map_err(|e| {
            PipelineError::Config(format!("version.pattern is not a valid regex: {}", e))
        })
    }

    pub fn branch_name(&self, version: &Version) -> String {
        format!("{}{}", self.config.branch_prefix, version)
    }

    /// Current version from the manifest
    pub fn read_current(&self) -> PipelineResult<Version> {
        let path = self.manifest_path();
        let content = std::fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;
        let raw = self
            .pattern()?
            .captures(&content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .ok_or_else(|| PipelineError::VersionNotFound {
                path: path.clone(),
                pattern: self.config.pattern.clone(),
            })?;

        Version::parse(&raw).map_err(|source| PipelineError::InvalidVersion { value: raw, source })
    }

    /// Compute the next unused version.
    ///
    /// A candidate is taken when its release branch exists or a pull request
    /// is open for that branch; the patch is then incremented again, up to
    /// `max_attempts` candidates in total.
    pub async fn bump_version(
        &self,
        kind: BumpKind,
        vcs: &dyn VersionControl,
        review: Option<&dyn ReviewService>,
    ) -> PipelineResult<Version> {
        let current = self.read_current()?;
        let start = kind.apply(&current);
        let mut candidate = start.clone();

        for attempt in 1..=self.config.max_attempts {
            let branch = self.branch_name(&candidate);
            let mut taken = vcs.branch_exists(&branch).await?;
            if !taken {
                if let Some(review) = review {
                    taken = review.find_pull_request(&branch).await?.is_some();
                }
            }

            if !taken {
                tracing::info!(from = %current, to = %candidate, attempt, "version chosen");
                return Ok(candidate);
            }

            tracing::debug!(candidate = %candidate, "version already in use, trying next patch");
            candidate = Version::new(candidate.major, candidate.minor, candidate.patch + 1);
        }

        Err(PipelineError::VersionCollisionExhausted {
            start: start.to_string(),
            attempts: self.config.max_attempts,
        })
    }

    /// Files `apply` would touch, for dry runs
    pub fn planned_writes(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.manifest_path()];
        paths.extend(self.config.changelog_path().map(|p| self.project_root.join(p)));
        paths.extend(self.config.readme_path().map(|p| self.project_root.join(p)));
        paths
    }

    /// Write the version to the manifest, then best-effort to each mirror.
    ///
    /// A manifest failure is an error; mirror failures come back as warnings.
    pub fn apply(&self, version: &Version) -> PipelineResult<Vec<String>> {
        self.write_manifest(version)?;

        let mut warnings = Vec::new();
        if let Some(path) = self.config.changelog_path() {
            if let Err(warning) = self.update_changelog(&self.project_root.join(path), version) {
                warnings.push(warning);
            }
        }
        if let Some(path) = self.config.readme_path() {
            if let Err(warning) = self.update_readme(&self.project_root.join(path), version) {
                warnings.push(warning);
            }
        }

        for warning in &warnings {
            tracing::warn!("{}", warning);
        }
        Ok(warnings)
    }

    fn write_manifest(&self, version: &Version) -> PipelineResult<()> {
        let path = self.manifest_path();
        let content = std::fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;
        let range = self
            .pattern()?
            .captures(&content)
            .and_then(|c| c.get(1))
            .map(|m| m.range())
            .ok_or_else(|| PipelineError::VersionNotFound {
                path: path.clone(),
                pattern: self.config.pattern.clone(),
            })?;

        let mut updated = String::with_capacity(content.len());
        updated.push_str(&content[..range.start]);
        updated.push_str(&version.to_string());
        updated.push_str(&content[range.end..]);
        write_atomic(&path, updated.as_bytes())?;

        tracing::info!(manifest = %path.display(), version = %version, "manifest updated");
        Ok(())
    }

    fn update_changelog(&self, path: &Path, version: &Version) -> Result<(), String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("changelog {} not updated: {}", path.display(), e))?;
        let date = Utc::now().format("%Y-%m-%d").to_string();
        if let Some(updated) = changelog::insert_version_header(&content, version, &date) {
            write_atomic(path, updated.as_bytes()).map_err(|e| format!("changelog not updated: {}", e))?;
        }
        Ok(())
    }

    fn update_readme(&self, path: &Path, version: &Version) -> Result<(), String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("readme {} not updated: {}", path.display(), e))?;
        let badge = Regex::new(r"version-\d+\.\d+\.\d+-").map_err(|e| e.to_string())?;
        if !badge.is_match(&content) {
            return Err(format!("readme {} has no version badge to update", path.display()));
        }

        let replacement = format!("version-{}-", version);
        let updated = badge.replace_all(&content, replacement.as_str());
        if updated != content {
            write_atomic(path, updated.as_bytes()).map_err(|e| format!("readme not updated: {}", e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::PullRequest;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    struct Branches(BTreeSet<String>);

    #[async_trait(?Send)]
    impl VersionControl for Branches {
        async fn current_branch(&self) -> PipelineResult<String> {
            Ok("main".into())
        }
        async fn branch_exists(&self, branch: &str) -> PipelineResult<bool> {
            Ok(self.0.contains(branch))
        }
        async fn is_dirty(&self) -> PipelineResult<bool> {
            Ok(false)
        }
        async fn stash_push(&self, _message: &str) -> PipelineResult<()> {
            Ok(())
        }
        async fn stash_pop(&self) -> PipelineResult<()> {
            Ok(())
        }
        async fn checkout(&self, _branch: &str) -> PipelineResult<()> {
            Ok(())
        }
        async fn create_branch(&self, _branch: &str) -> PipelineResult<()> {
            Ok(())
        }
        async fn stage_all(&self) -> PipelineResult<()> {
            Ok(())
        }
        async fn commit(&self, _message: &str) -> PipelineResult<bool> {
            Ok(true)
        }
        async fn push(&self, _remote: &str, _branch: &str) -> PipelineResult<()> {
            Ok(())
        }
        async fn user_name(&self) -> Option<String> {
            None
        }
    }

    struct OpenPrs(BTreeSet<String>);

    #[async_trait(?Send)]
    impl ReviewService for OpenPrs {
        async fn find_pull_request(&self, branch: &str) -> PipelineResult<Option<PullRequest>> {
            Ok(self.0.contains(branch).then(|| PullRequest {
                url: format!("https://example.com/{}", branch),
                number: None,
            }))
        }
        async fn create_pull_request(
            &self,
            _branch: &str,
            _base: &str,
            _title: &str,
            _body: &str,
        ) -> PipelineResult<PullRequest> {
            unreachable!()
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn setup(version: &str) -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("Cargo.toml"),
            format!("[package]\nname = \"demo\"\nversion = \"{}\"\n\n[dependencies]\nserde = {{ version = \"1\" }}\n", version),
        )
        .unwrap();
        temp
    }

    #[test]
    fn test_bump_kinds() {
        let v = Version::parse("1.2.3-beta.1").unwrap();
        assert_eq!(BumpKind::Patch.apply(&v).to_string(), "1.2.4");
        assert_eq!(BumpKind::Minor.apply(&v).to_string(), "1.3.0");
        assert_eq!(BumpKind::Major.apply(&v).to_string(), "2.0.0");
    }

    #[tokio::test]
    async fn test_bump_without_collision() {
        let temp = setup("0.1.37");
        let config = VersionConfig::default();
        let manager = VersionManager::new(&config, temp.path());

        let next = manager
            .bump_version(BumpKind::Patch, &Branches(set(&[])), None)
            .await
            .unwrap();
        assert_eq!(next.to_string(), "0.1.38");
    }

    #[tokio::test]
    async fn test_bump_skips_existing_branch_and_pr() {
        let temp = setup("0.1.37");
        let config = VersionConfig::default();
        let manager = VersionManager::new(&config, temp.path());

        let vcs = Branches(set(&["release-0.1.38"]));
        let next = manager.bump_version(BumpKind::Patch, &vcs, None).await.unwrap();
        assert_eq!(next.to_string(), "0.1.39");

        let prs = OpenPrs(set(&["release-0.1.39"]));
        let next = manager
            .bump_version(BumpKind::Patch, &vcs, Some(&prs as &dyn ReviewService))
            .await
            .unwrap();
        assert_eq!(next.to_string(), "0.1.40");
    }

    #[tokio::test]
    async fn test_bump_gives_up_after_ceiling() {
        let temp = setup("0.1.37");
        let config = VersionConfig {
            max_attempts: 2,
            ..VersionConfig::default()
        };
        let manager = VersionManager::new(&config, temp.path());
        let vcs = Branches(set(&["release-0.1.38", "release-0.1.39"]));

        let err = manager.bump_version(BumpKind::Patch, &vcs, None).await.unwrap_err();
        match err {
            PipelineError::VersionCollisionExhausted { start, attempts } => {
                assert_eq!(start, "0.1.38");
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_apply_updates_manifest_and_mirrors() {
        let temp = setup("0.1.37");
        std::fs::write(temp.path().join("CHANGELOG.md"), "# Changelog\n").unwrap();
        std::fs::write(
            temp.path().join("README.md"),
            "![v](https://img.shields.io/badge/version-0.1.37-blue)\n",
        )
        .unwrap();
        let config = VersionConfig::default();
        let manager = VersionManager::new(&config, temp.path());

        let warnings = manager.apply(&Version::new(0, 1, 38)).unwrap();
        assert!(warnings.is_empty());

        let manifest = std::fs::read_to_string(temp.path().join("Cargo.toml")).unwrap();
        assert!(manifest.contains("version = \"0.1.38\""));
        // Only the package version changes
        assert!(manifest.contains("serde = { version = \"1\" }"));
        assert_eq!(manager.read_current().unwrap(), Version::new(0, 1, 38));

        let changelog = std::fs::read_to_string(temp.path().join("CHANGELOG.md")).unwrap();
        assert!(changelog.contains("## [0.1.38] - "));
        let readme = std::fs::read_to_string(temp.path().join("README.md")).unwrap();
        assert!(readme.contains("version-0.1.38-blue"));
    }

    #[test]
    fn test_missing_mirrors_are_warnings() {
        let temp = setup("0.1.37");
        let config = VersionConfig::default();
        let manager = VersionManager::new(&config, temp.path());

        let warnings = manager.apply(&Version::new(0, 1, 38)).unwrap();
        assert_eq!(warnings.len(), 2);
        assert_eq!(manager.read_current().unwrap(), Version::new(0, 1, 38));
    }

    #[test]
    fn test_version_not_found() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
        let config = VersionConfig::default();
        let manager = VersionManager::new(&config, temp.path());
        assert!(matches!(
            manager.read_current().unwrap_err(),
            PipelineError::VersionNotFound { .. }
        ));
    }
}
