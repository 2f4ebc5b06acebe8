use crate::archive::{ArchiveManager, ArchivedChange};
use crate::cli::load_config;
use crate::models::Artifact;
use crate::parser::DocumentIndex;
use crate::state::StateManager;
use crate::store::{list_active, read_optional};
use crate::Result;
use colored::Colorize;
use std::path::Path;

const SUMMARY_WIDTH: usize = 60;

pub fn run(project_root: &Path, archived: bool) -> Result<()> {
    if archived {
        run_archived(project_root)
    } else {
        run_active(project_root)
    }
}

fn run_active(project_root: &Path) -> Result<()> {
    let config = load_config(project_root)?;
    let ids = list_active(&config, project_root)?;
    if ids.is_empty() {
        println!("{}", "No active changes. Create one with 'changegate new'.".yellow());
        return Ok(());
    }

    println!("\n{}", "Active changes:".green().bold());
    println!();
    println!(
        "{:<24} {:<30} {:>5}  {}",
        "ID".bold(),
        "Title".bold(),
        "Done".bold(),
        "Next stage".bold()
    );
    println!("{}", "─".repeat(80));

    for id in ids {
        let dir = config.changes_root(project_root).join(&id);
        match StateManager::load(&dir) {
            Ok(manager) => {
                let state = manager.state();
                let next = match state.next_stage() {
                    Some(stage) => format!("{} {} {}", stage.index(), stage.emoji(), stage.name()),
                    None => "finished".green().to_string(),
                };
                println!(
                    "{:<24} {:<30} {:>4}%  {}",
                    id,
                    truncate(&state.title, 30),
                    state.completion_percent(),
                    next
                );
            }
            Err(e) => {
                println!("{:<24} {}", id, format!("(unreadable state: {})", e).red());
            }
        }
    }
    println!();
    Ok(())
}

fn run_archived(project_root: &Path) -> Result<()> {
    let config = load_config(project_root)?;
    let changes = ArchiveManager::new(&config, project_root).list()?;
    if changes.is_empty() {
        println!("{}", "No archived changes found.".yellow());
        return Ok(());
    }

    println!("\n{}", "Archived changes:".green().bold());
    println!();
    println!("{:<12} {:<30} {}", "Date".bold(), "ID".bold(), "Summary".bold());
    println!("{}", "─".repeat(100));

    for change in &changes {
        let summary = summary_of(change);
        let summary_display = if summary.is_empty() {
            "(no summary)".dimmed().to_string()
        } else {
            summary
        };
        println!("{:<12} {:<30} {}", change.date, change.change_id, summary_display);
    }

    println!();
    Ok(())
}

/// Proposal summary, falling back to the recorded title
fn summary_of(change: &ArchivedChange) -> String {
    let proposal = read_optional(&change.dir.join(Artifact::Proposal.file_name())).ok().flatten();
    proposal
        .and_then(|content| DocumentIndex::parse(&content).first_paragraph("Summary", SUMMARY_WIDTH))
        .or_else(|| change.state.as_ref().map(|s| s.title.clone()))
        .unwrap_or_default()
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let cut: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::ChangeState;
    use tempfile::TempDir;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer title", 10), "a much ...");
    }

    #[test]
    fn test_summary_prefers_proposal() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("20260116-add-oauth");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("proposal.md"), "# P\n\n## Summary\n\nAdd OAuth login.\n").unwrap();

        let change = ArchivedChange {
            date: "2026-01-16".to_string(),
            change_id: "add-oauth".to_string(),
            dir: dir.clone(),
            state: Some(ChangeState::new("add-oauth", "OAuth", "alice")),
        };
        assert_eq!(summary_of(&change), "Add OAuth login.");

        std::fs::remove_file(dir.join("proposal.md")).unwrap();
        assert_eq!(summary_of(&change), "OAuth");
    }

    #[test]
    fn test_list_without_changes() {
        let temp = TempDir::new().unwrap();
        Config::default().save(temp.path()).unwrap();
        assert!(run(temp.path(), false).is_ok());
        assert!(run(temp.path(), true).is_ok());
    }
}
