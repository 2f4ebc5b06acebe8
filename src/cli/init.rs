use crate::cli::load_config;
use crate::config::{Config, CONFIG_FILE, ROOT_DIR};
use crate::Result;
use anyhow::Context;
use colored::Colorize;
use std::path::Path;

pub fn run(project_root: &Path, name: Option<&str>) -> Result<()> {
    if Config::path(project_root).exists() {
        println!("{}", "⚠️  changegate is already initialized".yellow());
        let config = load_config(project_root)?;
        ensure_dirs(&config, project_root)?;
        return Ok(());
    }

    println!("{}", "🚀 Initializing changegate...".cyan().bold());

    let mut config = Config::default();
    if let Some(n) = name {
        config.project_name = n.to_string();
    } else if let Some(dir_name) = project_root.file_name() {
        config.project_name = dir_name.to_string_lossy().to_string();
    }

    ensure_dirs(&config, project_root)?;
    config.save(project_root)?;

    println!();
    println!("{}", "✅ changegate initialized successfully!".green().bold());
    println!();
    println!("{}", "📁 Structure:".cyan());
    println!("   {:<28} - Pipeline configuration", format!("{}/{}", ROOT_DIR, CONFIG_FILE));
    println!("   {:<28} - Active changes", config.changes_dir.display().to_string());
    println!("   {:<28} - Archived changes", config.archive_dir.display().to_string());
    println!();
    println!("{}", "Next:".cyan().bold());
    println!("   {}", "changegate new <id> --title \"...\"".green());

    Ok(())
}

fn ensure_dirs(config: &Config, project_root: &Path) -> Result<()> {
    for dir in [config.changes_root(project_root), config.archive_root(project_root)] {
        std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_layout() {
        let temp = TempDir::new().unwrap();
        run(temp.path(), Some("demo")).unwrap();

        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.project_name, "demo");
        assert!(config.changes_root(temp.path()).is_dir());
        assert!(config.archive_root(temp.path()).is_dir());
    }

    #[test]
    fn test_init_keeps_existing_config() {
        let temp = TempDir::new().unwrap();
        run(temp.path(), Some("first")).unwrap();
        run(temp.path(), Some("second")).unwrap();
        assert_eq!(Config::load(temp.path()).unwrap().project_name, "first");
    }
}
