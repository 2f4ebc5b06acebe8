use crate::archive::ArchiveManager;
use crate::cli::{load_config, print_report, print_warnings};
use crate::collaborators::Collaborators;
use crate::engine::{Engine, RunMode};
use crate::error::PipelineError;
use crate::models::Stage;
use crate::state::StateManager;
use crate::Result;
use colored::Colorize;
use dialoguer::Confirm;
use std::path::Path;

/// Archive a change.
///
/// When the change is ready for the archive stage this runs stage 11 through
/// the engine so status and checkpoints stay consistent; otherwise the change
/// is archived directly after confirming the incomplete stages.
pub async fn run(project_root: &Path, change_id: &str, yes: bool) -> Result<()> {
    let config = load_config(project_root)?;
    let active = config.changes_root(project_root).join(change_id);
    if !active.is_dir() {
        return Err(PipelineError::ChangeNotFound {
            change_id: change_id.to_string(),
        }
        .into());
    }

    println!("{}", format!("📦 Archiving: {}", change_id).cyan());

    let state = StateManager::load(&active).ok();
    if let Some(manager) = &state {
        if manager.state().next_stage() == Some(Stage::Archive) {
            let collaborators = Collaborators::from_config(&config, project_root, false);
            let engine = Engine::new(&config, project_root, &collaborators)?;
            let report = engine.run(change_id, Stage::Archive, RunMode::Execute).await?;
            print_report(&report);
            println!();
            println!("{}", "✅ Archived successfully!".green().bold());
            println!("   Location: {}", report.change_dir.display());
            return Ok(());
        }

        let incomplete = ArchiveManager::incomplete_stages(manager.state());
        if !incomplete.is_empty() && !yes {
            println!("{}", "⚠️  These stages are not complete:".yellow());
            for stage in &incomplete {
                println!("   • {} {} {}", stage.index(), stage.emoji(), stage.name());
            }
            let proceed = Confirm::new()
                .with_prompt("Archive anyway?")
                .default(false)
                .interact()?;
            if !proceed {
                println!("   Archive cancelled");
                return Ok(());
            }
        }
    }

    let outcome = ArchiveManager::new(&config, project_root).archive(change_id)?;
    print_warnings(&outcome.warnings);

    println!();
    println!("{}", "✅ Archived successfully!".green().bold());
    println!("   Location: {}", outcome.path.display());
    Ok(())
}
