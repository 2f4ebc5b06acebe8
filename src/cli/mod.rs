pub mod archive;
pub mod checkpoint;
pub mod init;
pub mod list;
pub mod new;
pub mod run;
pub mod status;
pub mod validate;

use crate::config::Config;
use crate::engine::StageReport;
use crate::error::PipelineError;
use crate::models::StageStatus;
use crate::store::{locate_change, ChangeLocation};
use crate::Result;
use anyhow::Context;
use colored::Colorize;
use std::path::Path;

pub(crate) fn load_config(project_root: &Path) -> Result<Config> {
    Config::load(project_root)
        .with_context(|| format!("failed to load {}", Config::path(project_root).display()))
}

/// Active or archived directory of a change
pub(crate) fn find_change(config: &Config, project_root: &Path, change_id: &str) -> Result<ChangeLocation> {
    locate_change(config, project_root, change_id).ok_or_else(|| {
        PipelineError::ChangeNotFound {
            change_id: change_id.to_string(),
        }
        .into()
    })
}

pub(crate) fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("   {}", format!("⚠️  {}", warning).yellow());
    }
}

pub(crate) fn print_report(report: &StageReport) {
    let stage = report.stage;
    if report.dry_run {
        println!(
            "{}",
            format!("🔍 Dry run: stage {} {} {}", stage.index(), stage.emoji(), stage.name()).cyan()
        );
        for action in &report.planned {
            println!("   • {}", action);
        }
        print_warnings(&report.warnings);
        println!("   {}", "nothing was written".dimmed());
        return;
    }

    let line = format!("Stage {} {} {}", stage.index(), stage.emoji(), stage.name());
    match report.status {
        StageStatus::Skipped => println!("{} {}", "⏭ ".yellow(), format!("{} skipped", line).yellow()),
        _ => println!("{} {}", "✅".green(), line.green()),
    }
    if let Some(checkpoint) = &report.checkpoint {
        println!("   {} {}", "checkpoint:".dimmed(), checkpoint.dimmed());
    }
    print_warnings(&report.warnings);
}
