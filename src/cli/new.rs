use crate::cli::{load_config, print_report};
use crate::collaborators::Collaborators;
use crate::engine::{Engine, RunMode, RunOptions};
use crate::models::Stage;
use crate::Result;
use colored::Colorize;
use std::path::Path;

/// Create a change by running stage 0
pub async fn run(project_root: &Path, change_id: &str, title: &str, owner: Option<String>) -> Result<()> {
    let config = load_config(project_root)?;
    let collaborators = Collaborators::from_config(&config, project_root, false);
    let engine = Engine::new(&config, project_root, &collaborators)?.with_options(RunOptions {
        title: Some(title.to_string()),
        owner,
        ..RunOptions::default()
    });

    println!("{}", format!("📋 Creating change: {}", change_id).cyan());
    let report = engine.run(change_id, Stage::Todo, RunMode::Execute).await?;
    print_report(&report);

    println!();
    println!("   Location: {}", report.change_dir.display());
    println!(
        "   Next:     {}",
        format!("changegate run {} --stage {}", change_id, Stage::Version.index()).green()
    );
    Ok(())
}
