use crate::checkpoint::CheckpointManager;
use crate::cli::{find_change, load_config};
use crate::models::Stage;
use crate::state::StateManager;
use crate::Result;
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;
use std::path::Path;

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// Snapshot the change's artifacts
    Create {
        /// Change ID
        change_id: String,

        /// Free-form note stored with the checkpoint
        #[arg(short, long)]
        note: Option<String>,
    },

    /// List checkpoints, oldest first
    List {
        /// Change ID
        change_id: String,
    },

    /// Restore artifacts from a checkpoint
    Rollback {
        /// Change ID
        change_id: String,

        /// Checkpoint ID, or "latest"
        checkpoint: String,

        /// Do not take a safety checkpoint first
        #[arg(long)]
        no_backup: bool,

        /// Also reset every stage after the checkpoint's stage to not started
        #[arg(long)]
        revert_stages: bool,
    },

    /// Delete all but the newest checkpoints
    Cleanup {
        /// Change ID
        change_id: String,

        /// Number of checkpoints to keep
        #[arg(short, long)]
        keep: usize,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

pub fn run(project_root: &Path, cmd: CheckpointCommands) -> Result<()> {
    match cmd {
        CheckpointCommands::Create { change_id, note } => create(project_root, &change_id, note.as_deref()),
        CheckpointCommands::List { change_id } => list(project_root, &change_id),
        CheckpointCommands::Rollback {
            change_id,
            checkpoint,
            no_backup,
            revert_stages,
        } => rollback(project_root, &change_id, &checkpoint, no_backup, revert_stages),
        CheckpointCommands::Cleanup { change_id, keep, yes } => cleanup(project_root, &change_id, keep, yes),
    }
}

fn open(project_root: &Path, change_id: &str) -> Result<StateManager> {
    let config = load_config(project_root)?;
    let location = find_change(&config, project_root, change_id)?;
    Ok(StateManager::load(&location.dir)?)
}

/// Stage a manual checkpoint is attributed to
fn current_stage(state: &StateManager) -> Stage {
    state.state().last_complete().unwrap_or(Stage::Todo)
}

fn create(project_root: &Path, change_id: &str, note: Option<&str>) -> Result<()> {
    let state = open(project_root, change_id)?;
    let checkpoint = CheckpointManager::new(state.change_dir()).create(current_stage(&state), note)?;

    println!("{}", format!("✅ Checkpoint created: {}", checkpoint.id).green());
    println!("   {} file(s) captured", checkpoint.files.len());
    Ok(())
}

fn list(project_root: &Path, change_id: &str) -> Result<()> {
    let state = open(project_root, change_id)?;
    let checkpoints = CheckpointManager::new(state.change_dir()).list()?;
    if checkpoints.is_empty() {
        println!("{}", "No checkpoints found.".yellow());
        return Ok(());
    }

    println!("\n{}", format!("Checkpoints for {}:", change_id).green().bold());
    println!();
    println!("{:<28} {:<22} {:>5}  {}", "ID".bold(), "Stage".bold(), "Files".bold(), "Note".bold());
    println!("{}", "─".repeat(80));
    for checkpoint in &checkpoints {
        let stage = format!("{} {}", checkpoint.stage.index(), checkpoint.stage.name());
        println!(
            "{:<28} {:<22} {:>5}  {}",
            checkpoint.id,
            stage,
            checkpoint.files.len(),
            checkpoint.note.as_deref().unwrap_or("")
        );
    }
    println!();
    Ok(())
}

fn rollback(
    project_root: &Path,
    change_id: &str,
    id: &str,
    no_backup: bool,
    revert_stages: bool,
) -> Result<()> {
    let mut state = open(project_root, change_id)?;
    let manager = CheckpointManager::new(state.change_dir());
    let target = manager.get(id)?;

    if !no_backup {
        let note = format!("before rollback to {}", target.id);
        let backup = manager.create(current_stage(&state), Some(&note))?;
        println!("   {} {}", "safety checkpoint:".dimmed(), backup.id.dimmed());
    }

    let restored = manager.rollback(&target.id)?;
    println!("{}", format!("✅ Rolled back to {}", restored.id).green());

    if revert_stages {
        state.reset_after(restored.stage);
        state.update_all_checksums(restored.stage)?;
        state.set_last_action(format!("rolled back to checkpoint {}", restored.id));
        state.save()?;
        println!(
            "   Stages after {} ({}) reset to not started",
            restored.stage,
            restored.stage.name()
        );
    } else {
        println!(
            "   {}",
            "Stage status is unchanged; re-run stages whose artifacts changed.".yellow()
        );
    }
    Ok(())
}

fn cleanup(project_root: &Path, change_id: &str, keep: usize, yes: bool) -> Result<()> {
    if keep == 0 {
        anyhow::bail!("--keep must be at least 1");
    }
    let state = open(project_root, change_id)?;
    let manager = CheckpointManager::new(state.change_dir());
    let count = manager.list()?.len();
    if count <= keep {
        println!("Nothing to clean up ({} checkpoint(s), keeping {})", count, keep);
        return Ok(());
    }

    if !yes {
        let proceed = Confirm::new()
            .with_prompt(format!("Delete {} of {} checkpoint(s)?", count - keep, count))
            .default(false)
            .interact()?;
        if !proceed {
            println!("   Cleanup cancelled");
            return Ok(());
        }
    }

    let removed = manager.cleanup(keep)?;
    println!("{}", format!("✅ Removed {} checkpoint(s)", removed.len()).green());
    Ok(())
}
