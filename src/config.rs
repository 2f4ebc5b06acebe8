//! Project configuration (changegate/config.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding config, active changes and the archive
pub const ROOT_DIR: &str = "changegate";
pub const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Project name
    #[serde(default = "default_project_name")]
    pub project_name: String,

    /// Active changes, relative to the project root
    #[serde(default = "default_changes_dir")]
    pub changes_dir: PathBuf,

    /// Permanent storage for archived changes
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    #[serde(default)]
    pub version: VersionConfig,

    #[serde(default)]
    pub git: GitConfig,

    #[serde(default)]
    pub tests: TestConfig,

    #[serde(default)]
    pub pull_request: PullRequestConfig,

    #[serde(default)]
    pub checkpoints: CheckpointConfig,
}

fn default_project_name() -> String {
    "My Project".to_string()
}

fn default_changes_dir() -> PathBuf {
    PathBuf::from(ROOT_DIR).join("changes")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from(ROOT_DIR).join("archive")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            changes_dir: default_changes_dir(),
            archive_dir: default_archive_dir(),
            version: VersionConfig::default(),
            git: GitConfig::default(),
            tests: TestConfig::default(),
            pull_request: PullRequestConfig::default(),
            checkpoints: CheckpointConfig::default(),
        }
    }
}

/// Where versions live and how they are mirrored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionConfig {
    /// Authoritative manifest (the single source of truth)
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,

    /// Regex whose first capture group is the version in the manifest
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Changelog mirror; a header is inserted for each new version.
    /// An empty path disables it.
    #[serde(default = "default_changelog")]
    pub changelog: Option<PathBuf>,

    /// README mirror; `version-x.y.z-` badge segments are replaced.
    /// An empty path disables it.
    #[serde(default = "default_readme")]
    pub readme: Option<PathBuf>,

    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,

    /// Ceiling for the collision-avoidance loop
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

fn default_manifest() -> PathBuf {
    PathBuf::from("Cargo.toml")
}

fn default_pattern() -> String {
    r#"(?m)^version\s*=\s*"([^"]+)""#.to_string()
}

fn default_changelog() -> Option<PathBuf> {
    Some(PathBuf::from("CHANGELOG.md"))
}

fn default_readme() -> Option<PathBuf> {
    Some(PathBuf::from("README.md"))
}

fn default_branch_prefix() -> String {
    "release-".to_string()
}

fn default_max_attempts() -> usize {
    10
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            pattern: default_pattern(),
            changelog: default_changelog(),
            readme: default_readme(),
            branch_prefix: default_branch_prefix(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl VersionConfig {
    pub fn changelog_path(&self) -> Option<&Path> {
        self.changelog.as_deref().filter(|p| !p.as_os_str().is_empty())
    }

    pub fn readme_path(&self) -> Option<&Path> {
        self.readme.as_deref().filter(|p| !p.as_os_str().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitConfig {
    #[serde(default = "default_git_command")]
    pub command: String,
    #[serde(default = "default_remote")]
    pub remote: String,
    /// Target branch for pull requests
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// Push the release branch before opening the PR
    #[serde(default = "default_true")]
    pub push: bool,
}

fn default_git_command() -> String {
    "git".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            command: default_git_command(),
            remote: default_remote(),
            base_branch: default_base_branch(),
            push: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    #[serde(default = "default_test_command")]
    pub command: String,
    #[serde(default = "default_test_args")]
    pub args: Vec<String>,
}

fn default_test_command() -> String {
    "cargo".to_string()
}

fn default_test_args() -> Vec<String> {
    vec!["test".to_string()]
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            command: default_test_command(),
            args: default_test_args(),
        }
    }
}

impl TestConfig {
    /// Command line for display
    pub fn display(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestConfig {
    /// When false the pull-request stage is marked Skipped
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_pr_command")]
    pub command: String,
}

fn default_pr_command() -> String {
    "gh".to_string()
}

impl Default for PullRequestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_pr_command(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Retain only this many checkpoints after each stage (all if unset)
    #[serde(default)]
    pub keep: Option<usize>,
}

impl Config {
    pub fn path(project_root: &Path) -> PathBuf {
        project_root.join(ROOT_DIR).join(CONFIG_FILE)
    }

    /// Load config from changegate/config.toml, defaults when absent
    pub fn load(project_root: &Path) -> anyhow::Result<Self> {
        let config_path = Self::path(project_root);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&content)?;
        config.check()?;
        Ok(config)
    }

    /// Save config to changegate/config.toml
    pub fn save(&self, project_root: &Path) -> anyhow::Result<()> {
        let config_path = Self::path(project_root);
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.version.max_attempts == 0 {
            anyhow::bail!("version.max_attempts must be at least 1");
        }
        regex::Regex::new(&self.version.pattern)
            .map_err(|e| anyhow::anyhow!("version.pattern is not a valid regex: {}", e))?;
        if let Some(0) = self.checkpoints.keep {
            anyhow::bail!("checkpoints.keep must be at least 1");
        }
        Ok(())
    }

    pub fn changes_root(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.changes_dir)
    }

    pub fn archive_root(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.archive_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.version.branch_prefix, "release-");
        assert_eq!(config.changes_dir, PathBuf::from("changegate/changes"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(ROOT_DIR)).unwrap();
        std::fs::write(
            Config::path(temp.path()),
            "project_name = \"demo\"\n\n[tests]\ncommand = \"npm\"\nargs = [\"test\"]\n",
        )
        .unwrap();

        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.project_name, "demo");
        assert_eq!(config.tests.display(), "npm test");
        assert_eq!(config.version.max_attempts, 10);
        assert!(config.pull_request.enabled);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.checkpoints.keep = Some(5);
        config.version.readme = Some(PathBuf::new());
        config.save(temp.path()).unwrap();

        let loaded = Config::load(temp.path()).unwrap();
        assert_eq!(loaded.checkpoints.keep, Some(5));
        assert_eq!(loaded.version.readme_path(), None);
        assert_eq!(loaded.version.changelog_path(), Some(Path::new("CHANGELOG.md")));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(ROOT_DIR)).unwrap();
        std::fs::write(Config::path(temp.path()), "[version]\npattern = \"(\"\n").unwrap();
        assert!(Config::load(temp.path()).is_err());
    }
}
