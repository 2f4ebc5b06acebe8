//! Initial artifact content
//!
//! Each document stage writes a starting draft derived from the artifacts
//! before it. Anything that cannot be derived is left as a `[[FILL: ...]]`
//! placeholder, which keeps the stage from completing until an operator
//! fills it in.

use crate::models::{ChangeState, Stage};
use crate::parser::{placeholder, DocumentIndex, CHANGES_SECTION};
use regex::Regex;
use serde::Serialize;

/// Checklist line for a stage: `- [ ] N. name`
fn checklist_line(stage: Stage, done: bool) -> String {
    format!(
        "- [{}] {}. {} {}",
        if done { "x" } else { " " },
        stage.index(),
        stage.emoji(),
        stage.name()
    )
}

pub fn checklist(state: &ChangeState) -> String {
    let mut out = format!(
        "# Checklist: {}\n\n- Change: `{}`\n- Owner: {}\n- Created: {}\n\n## Stages\n\n",
        state.title,
        state.change_id,
        state.owner,
        state.created_at.format("%Y-%m-%d")
    );
    for stage in Stage::ALL {
        out.push_str(&checklist_line(stage, state.status(stage).is_done()));
        out.push('\n');
    }
    out
}

/// Tick the checklist line of `stage`; `None` if it is absent or already ticked
pub fn tick_checklist(content: &str, stage: Stage) -> Option<String> {
    let pattern = format!(r"(?m)^(\s*[-*+]\s+)\[ \](\s+{}\.\s)", stage.index());
    let re = Regex::new(&pattern).ok()?;
    if !re.is_match(content) {
        return None;
    }
    Some(re.replacen(content, 1, "${1}[x]${2}").into_owned())
}

/// Every proposed change, nested ones included, in document order
fn change_texts(proposal: &DocumentIndex) -> Vec<String> {
    proposal.change_items().iter().map(|i| i.text.clone()).collect()
}

/// Append `## heading` followed by `body`, separated by blank lines
fn push_section(out: &mut String, heading: &str, body: &str) {
    out.push_str("\n## ");
    out.push_str(heading);
    out.push_str("\n\n");
    out.push_str(body.trim_end());
    out.push('\n');
}

fn bullet(text: &str) -> String {
    format!("- {}\n", text)
}

fn affected_files_section(doc: &DocumentIndex) -> String {
    let items = doc.items_under("Affected Files");
    if items.is_empty() {
        return bullet(&placeholder("affected files"));
    }
    items
        .iter()
        .map(|i| format!("- `{}`\n", i.text.trim_matches('`')))
        .collect()
}

pub fn proposal(state: &ChangeState) -> String {
    let mut out = format!("# Proposal: {}\n", state.title);
    push_section(&mut out, "Summary", &placeholder("one-paragraph summary of the change"));
    push_section(&mut out, "Why", &placeholder("motivation and problem being solved"));
    push_section(
        &mut out,
        CHANGES_SECTION,
        &bullet(&placeholder("one bullet per concrete change")),
    );
    push_section(&mut out, "Impact", &placeholder("who and what is affected"));
    push_section(&mut out, "Affected Files", &bullet(&placeholder("affected files")));
    out
}

pub fn specification(state: &ChangeState, proposal: &DocumentIndex) -> String {
    let summary = proposal
        .first_paragraph("Summary", usize::MAX)
        .unwrap_or_else(|| placeholder("overview"));

    let changes = change_texts(proposal);
    let mut requirements = String::new();
    let mut criteria = String::new();
    for (i, change) in changes.iter().enumerate() {
        requirements.push_str(&format!("- R{}: {}\n", i + 1, change));
        criteria.push_str(&format!(
            "- [ ] R{}: {}\n",
            i + 1,
            placeholder(&format!("observable outcome for \"{}\"", change))
        ));
    }
    if changes.is_empty() {
        requirements.push_str(&bullet(&placeholder("requirement")));
        criteria.push_str(&format!("- [ ] {}\n", placeholder("acceptance criterion")));
    }

    let mut out = format!("# Specification: {}\n", state.title);
    push_section(&mut out, "Overview", &summary);
    push_section(&mut out, "Requirements", &requirements);
    push_section(&mut out, "Acceptance Criteria", &criteria);
    push_section(&mut out, "Affected Files", &affected_files_section(proposal));
    out
}

pub fn tasks(state: &ChangeState, proposal: &DocumentIndex, spec: &DocumentIndex) -> String {
    let mut out = format!("# Tasks: {}\n\n## Tasks\n\n", state.title);
    for change in change_texts(proposal) {
        out.push_str(&format!("- [ ] {}\n", change));
    }
    for requirement in spec.bullets_under("Requirements") {
        out.push_str(&format!("- [ ] Implement {}\n", requirement.text));
    }
    out.push_str("- [ ] Cover the test plan with automated tests\n");
    out.push_str("- [ ] Update documentation\n");
    out
}

pub fn test_plan(state: &ChangeState, spec: &DocumentIndex) -> String {
    let mut cases = String::new();
    for (i, criterion) in spec.checkboxes_under("Acceptance Criteria").iter().enumerate() {
        cases.push_str(&format!("- TC{}: verify {}\n", i + 1, criterion.text));
    }
    if cases.is_empty() {
        cases.push_str(&bullet(&placeholder("test case")));
    }

    let mut out = format!("# Test Plan: {}\n", state.title);
    push_section(&mut out, "Strategy", &placeholder("unit / integration / manual approach"));
    push_section(&mut out, "Test Cases", &cases);
    out
}

/// Machine-readable test-case manifest written by the tooling stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolingManifest {
    pub change_id: String,
    pub runner: String,
    pub cases: Vec<ToolingCase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolingCase {
    pub id: String,
    pub description: String,
    pub line: usize,
}

pub fn tooling_manifest(change_id: &str, runner: &str, test_plan: &DocumentIndex) -> ToolingManifest {
    let cases = test_plan
        .items_under("Test Cases")
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let (id, description) = match item.text.split_once(':') {
                Some((id, rest)) if !id.contains(' ') => (id.trim().to_string(), rest.trim().to_string()),
                _ => (format!("TC{}", i + 1), item.text.clone()),
            };
            ToolingCase {
                id,
                description,
                line: item.line,
            }
        })
        .collect();

    ToolingManifest {
        change_id: change_id.to_string(),
        runner: runner.to_string(),
        cases,
    }
}

/// Changelog bullets for the doc-update stage
pub fn changelog_entries(proposal: &DocumentIndex) -> Vec<String> {
    change_texts(proposal)
}

pub fn pull_request_body(state: &ChangeState, proposal: Option<&DocumentIndex>) -> String {
    let mut body = String::new();
    if let Some(summary) = proposal.and_then(|p| p.first_paragraph("Summary", usize::MAX)) {
        body.push_str(&summary);
        body.push_str("\n\n");
    }
    if let Some(proposal) = proposal {
        let changes = change_texts(proposal);
        if !changes.is_empty() {
            body.push_str("## Changes\n\n");
            for change in changes {
                body.push_str(&format!("- {}\n", change));
            }
            body.push('\n');
        }
    }
    body.push_str(&format!("Change `{}` owned by {}.\n", state.change_id, state.owner));
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Artifact;
    use crate::validator::{require_complete, validate_documents};
    use crate::store::DocumentSet;

    fn state() -> ChangeState {
        ChangeState::new("add-oauth", "Add OAuth", "alice")
    }

    const FILLED_PROPOSAL: &str = "# Proposal: Add OAuth\n\n## Summary\n\nAdd OAuth login.\n\n## Why\n\nUsers asked.\n\n## What Changes\n\n- Add OAuth provider config\n- Add login endpoint\n\n## Affected Files\n\n- `src/auth.rs`\n";

    #[test]
    fn test_checklist_is_structurally_complete() {
        let content = checklist(&state());
        assert!(require_complete(Artifact::Checklist, &content).is_ok());
    }

    #[test]
    fn test_tick_checklist() {
        let content = checklist(&state());
        let ticked = tick_checklist(&content, Stage::Version).unwrap();
        assert!(ticked.contains("- [x] 1. "));
        assert!(ticked.contains("- [ ] 0. "));
        // 1 must not match 10/11/12
        assert!(ticked.contains("- [ ] 10. "));
        assert!(tick_checklist(&ticked, Stage::Version).is_none());
    }

    #[test]
    fn test_templates_block_until_filled() {
        let s = state();
        assert!(require_complete(Artifact::Proposal, &proposal(&s)).is_err());

        let prop = DocumentIndex::parse(FILLED_PROPOSAL);
        let spec = specification(&s, &prop);
        assert!(spec.contains("- R1: Add OAuth provider config"));
        assert!(spec.contains("- `src/auth.rs`"));
        assert!(require_complete(Artifact::Specification, &spec).is_err());
    }

    #[test]
    fn test_synthesized_tasks_cover_every_change() {
        let s = state();
        let prop = DocumentIndex::parse(FILLED_PROPOSAL);
        let spec = DocumentIndex::parse(&specification(&s, &prop));
        let tasks_md = tasks(&s, &prop, &spec);

        assert!(require_complete(Artifact::TaskList, &tasks_md).is_ok());
        let docs = DocumentSet::new()
            .with(Artifact::Proposal, FILLED_PROPOSAL)
            .with(Artifact::TaskList, tasks_md);
        assert!(validate_documents(&docs).is_valid());
    }

    #[test]
    fn test_proposal_draft_has_every_section() {
        let doc = DocumentIndex::parse(&proposal(&state()));
        assert_eq!(doc.title(), Some("Proposal: Add OAuth"));
        for section in ["Summary", "Why", CHANGES_SECTION, "Impact", "Affected Files"] {
            assert!(doc.has_section(section), "missing {}", section);
        }
        assert_eq!(doc.change_items().len(), 1);
        assert_eq!(doc.placeholders.len(), 5);
    }

    #[test]
    fn test_nested_changes_reach_tasks_and_changelog() {
        let s = state();
        let nested = FILLED_PROPOSAL.replace(
            "- Add login endpoint\n",
            "- Add login endpoint\n  - Use PKCE flow\n",
        );
        let prop = DocumentIndex::parse(&nested);
        let spec = DocumentIndex::parse(&specification(&s, &prop));
        let tasks_md = tasks(&s, &prop, &spec);
        assert!(tasks_md.contains("- [ ] Use PKCE flow"));

        let docs = DocumentSet::new()
            .with(Artifact::Proposal, nested.clone())
            .with(Artifact::TaskList, tasks_md);
        assert!(validate_documents(&docs).is_valid());

        assert!(changelog_entries(&prop).contains(&"Use PKCE flow".to_string()));
        assert!(pull_request_body(&s, Some(&prop)).contains("- Use PKCE flow"));
    }

    #[test]
    fn test_tooling_manifest_ids() {
        let plan = DocumentIndex::parse("# TP\n\n## Test Cases\n\n- TC1: verify login\n- logout works\n");
        let manifest = tooling_manifest("add-oauth", "cargo test", &plan);
        assert_eq!(manifest.cases.len(), 2);
        assert_eq!(manifest.cases[0].id, "TC1");
        assert_eq!(manifest.cases[0].description, "verify login");
        assert_eq!(manifest.cases[1].id, "TC2");
        assert_eq!(manifest.cases[1].description, "logout works");
    }
}
