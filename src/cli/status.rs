use crate::cli::{find_change, load_config};
use crate::models::{Artifact, ChangeState, Stage, StageStatus};
use crate::state::{StalenessReport, StateManager};
use crate::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct StageView {
    index: usize,
    name: &'static str,
    status: StageStatus,
}

/// `status --json` document
#[derive(Debug, Serialize)]
struct StatusView<'a> {
    change_id: &'a str,
    title: &'a str,
    owner: &'a str,
    archived: bool,
    location: String,
    version: Option<&'a str>,
    branch: Option<&'a str>,
    completion: u8,
    next_stage: Option<usize>,
    last_action: Option<&'a str>,
    stages: Vec<StageView>,
    stale: Vec<Artifact>,
    missing_checksums: Vec<Artifact>,
    pull_request: Option<&'a str>,
}

fn view<'a>(state: &'a ChangeState, dir: &Path, archived: bool, staleness: &StalenessReport) -> StatusView<'a> {
    StatusView {
        change_id: &state.change_id,
        title: &state.title,
        owner: &state.owner,
        archived,
        location: dir.display().to_string(),
        version: state.version.as_deref(),
        branch: state.branch.as_deref(),
        completion: state.completion_percent(),
        next_stage: state.next_stage().map(|s| s.index()),
        last_action: state.last_action.as_deref(),
        stages: Stage::ALL
            .iter()
            .map(|s| StageView {
                index: s.index(),
                name: s.name(),
                status: state.status(*s),
            })
            .collect(),
        stale: staleness.stale_files.clone(),
        missing_checksums: staleness.missing_checksums.clone(),
        pull_request: state.pull_request.as_ref().map(|pr| pr.url.as_str()),
    }
}

pub fn run(project_root: &Path, change_id: &str, json: bool) -> Result<()> {
    let config = load_config(project_root)?;
    let location = find_change(&config, project_root, change_id)?;
    let manager = StateManager::load(&location.dir)?;
    let staleness = manager.check_staleness()?;
    let state = manager.state();

    if json {
        let view = view(state, &location.dir, location.archived, &staleness);
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("{}", format!("Status for: {}", change_id).cyan().bold());
    println!();
    println!("   Title:     {}", state.title);
    println!("   Owner:     {}", state.owner);
    if location.archived {
        println!("   Location:  {} {}", location.dir.display(), "(archived)".bright_black());
    } else {
        println!("   Location:  {}", location.dir.display());
    }
    if let (Some(version), Some(branch)) = (&state.version, &state.branch) {
        println!("   Release:   {} on {}", version, branch);
    }
    println!("   Progress:  {}%", state.completion_percent());
    if let Some(last_action) = &state.last_action {
        println!("   Last:      {}", last_action);
    }
    println!("   Updated:   {}", state.updated_at.format("%Y-%m-%d %H:%M:%S"));
    println!();

    for stage in Stage::ALL {
        let status = state.status(stage);
        let label = format!("{:>2}. {} {}", stage.index(), stage.emoji(), stage.name());
        let line = match status {
            StageStatus::Complete => label.green(),
            StageStatus::Skipped => label.bright_black(),
            StageStatus::Failed => label.red(),
            StageStatus::NotStarted if state.next_stage() == Some(stage) => label.cyan().bold(),
            StageStatus::NotStarted => label.normal(),
        };
        println!("   {} {}", status.symbol(), line);
    }

    if let Some(pr) = &state.pull_request {
        println!();
        println!("   Pull request: {}", pr.url);
    }

    if staleness.has_stale() {
        println!();
        println!("{}", "⚠️  Modified since their stage completed:".yellow());
        for artifact in &staleness.stale_files {
            println!("   • {}", artifact);
        }
    }

    if let Some(next) = state.next_stage() {
        println!();
        println!(
            "   Next: {}",
            format!("changegate run {} --stage {}", change_id, next.index()).green()
        );
    }

    Ok(())
}
