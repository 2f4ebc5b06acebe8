use crate::cli::{find_change, load_config};
use crate::models::{Severity, ValidationReport};
use crate::store::ArtifactStore;
use crate::validator::{check_document, CrossValidator};
use crate::Result;
use colored::Colorize;
use std::path::Path;

/// Structural checks for every present artifact plus the cross-document rules
pub fn report_for(change_dir: &Path) -> Result<ValidationReport> {
    let docs = ArtifactStore::new(change_dir).load_all()?;
    let mut report = ValidationReport::default();
    for (artifact, content) in docs.iter() {
        report.extend(check_document(artifact, content));
    }
    report.merge(CrossValidator::new(change_dir).validate_loaded(&docs));
    Ok(report)
}

/// Returns whether the change is free of blocking findings
pub fn run(project_root: &Path, change_id: &str, json: bool) -> Result<bool> {
    let config = load_config(project_root)?;
    let location = find_change(&config, project_root, change_id)?;
    let report = report_for(&location.dir)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report.is_valid());
    }

    println!("{}", format!("🔍 Validating: {}", change_id).cyan());
    println!();

    for finding in &report.issues {
        println!("   {}", finding.format().red());
    }
    for finding in &report.warnings {
        println!("   {}", finding.format().yellow());
    }
    if !report.cross_refs.is_empty() {
        println!(
            "   {}",
            format!("{} cross-reference(s) resolved", report.cross_refs.len()).dimmed()
        );
    }

    println!();
    let summary = format!(
        "{} high, {} medium, {} low",
        report.count_by_severity(Severity::High),
        report.count_by_severity(Severity::Medium),
        report.count_by_severity(Severity::Low)
    );
    if report.is_valid() {
        println!("{} {}", "✅ Valid".green().bold(), summary.dimmed());
    } else {
        println!("{} {}", "❌ Blocking issues found".red().bold(), summary.dimmed());
    }

    Ok(report.is_valid())
}
