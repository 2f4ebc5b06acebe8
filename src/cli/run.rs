use crate::cli::{load_config, print_report};
use crate::collaborators::Collaborators;
use crate::engine::{Engine, RunMode, RunOptions};
use crate::error::PipelineError;
use crate::models::Stage;
use crate::version::BumpKind;
use crate::Result;
use colored::Colorize;
use std::path::Path;

pub async fn run(
    project_root: &Path,
    change_id: &str,
    stage: Option<usize>,
    dry_run: bool,
    bump: BumpKind,
) -> Result<()> {
    let config = load_config(project_root)?;
    let collaborators = Collaborators::from_config(&config, project_root, !dry_run);
    let engine = Engine::new(&config, project_root, &collaborators)?.with_options(RunOptions {
        bump,
        ..RunOptions::default()
    });
    let mode = if dry_run { RunMode::DryRun } else { RunMode::Execute };

    // An explicit stage runs alone; otherwise a dry run previews the next
    // stage and a real run continues to the end
    let stage = match stage {
        Some(index) => Some(Stage::from_index(index).ok_or(PipelineError::InvalidStage(index))?),
        None if dry_run => engine.next_stage(change_id)?,
        None => {
            println!("{}", format!("🤖 Running remaining stages: {}", change_id).cyan());
            let reports = engine.run_remaining(change_id, print_report).await?;
            if reports.is_empty() {
                println!("{}", "All stages are already done.".green());
            } else {
                println!();
                println!("{}", "✅ Pipeline finished".green().bold());
            }
            return Ok(());
        }
    };

    match stage {
        Some(stage) => {
            let report = engine.run(change_id, stage, mode).await?;
            print_report(&report);
            if let (RunMode::Execute, Some(next)) = (mode, stage.next()) {
                println!(
                    "   Next: {}",
                    format!("changegate run {} --stage {}", change_id, next.index()).green()
                );
            }
        }
        None => println!("{}", "All stages are already done.".green()),
    }
    Ok(())
}
