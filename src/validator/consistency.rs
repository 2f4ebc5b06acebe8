//! Cross-Document Validator
//!
//! Checks that the artifacts of a change agree with each other:
//! - every proposed change has a matching task (blocking)
//! - acceptance criteria are mentioned by the test plan
//! - requirements are tracked by tasks
//! - relative links resolve inside the change directory
//! - proposal and specification list the same affected files
//!
//! Matching is case-insensitive containment of short tokens. It is
//! approximate on purpose: only the proposal→tasks rule ever blocks.

use crate::error::PipelineResult;
use crate::models::{Artifact, CrossRef, ErrorCategory, Finding, Severity, ValidationReport};
use crate::parser::{DocumentIndex, ListItem};
use crate::store::{ArtifactStore, DocumentSet};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// Shortest token treated as a keyword for change/requirement matching
pub const KEYWORD_MIN_LEN: usize = 4;

/// Acceptance-criterion tokens must be longer than four characters
pub const CRITERIA_TOKEN_MIN_LEN: usize = 5;

/// Longest tokens taken from each acceptance criterion
pub const CRITERIA_TOKEN_COUNT: usize = 3;

/// Share of a change's keywords that must appear in the task list
pub const NEAR_MATCH_RATIO: f64 = 0.5;

const STOP_WORDS: &[&str] = &[
    "about", "after", "also", "before", "being", "does", "each", "every", "from", "have", "into",
    "just", "like", "make", "more", "must", "only", "other", "over", "shall", "should", "some",
    "such", "than", "that", "them", "then", "there", "these", "they", "this", "those", "under",
    "very", "were", "what", "when", "where", "which", "while", "will", "with", "would", "your",
];

fn scheme_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("valid scheme regex"))
}

/// Lowercase word tokens, split on anything that is not alphanumeric or `_`
pub fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Distinct keywords in first-seen order
pub fn keywords(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tokens(text)
        .into_iter()
        .filter(|t| t.chars().count() >= KEYWORD_MIN_LEN && !STOP_WORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Token stream joined by single spaces and padded, for whole-phrase search
fn normalized(text: &str) -> String {
    format!(" {} ", tokens(text).join(" "))
}

/// The longest distinct tokens of a criterion, longest first
pub fn criterion_tokens(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut candidates: Vec<String> = tokens(text)
        .into_iter()
        .filter(|t| t.chars().count() >= CRITERIA_TOKEN_MIN_LEN)
        .filter(|t| seen.insert(t.clone()))
        .collect();
    // Stable sort keeps first-seen order among equal lengths
    candidates.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    candidates.truncate(CRITERIA_TOKEN_COUNT);
    candidates
}

/// Whether a proposed change is reflected somewhere in the task text
fn near_match(change: &str, task_text_normalized: &str) -> bool {
    let phrase = normalized(change);
    if phrase.trim().is_empty() {
        return true;
    }
    if task_text_normalized.contains(&phrase) {
        return true;
    }

    let words = keywords(change);
    let hits = words
        .iter()
        .filter(|w| task_text_normalized.contains(w.as_str()))
        .count();
    let needed = ((words.len() as f64) * NEAR_MATCH_RATIO).ceil().max(1.0) as usize;
    hits >= needed
}

/// Task item sharing the most keywords with `text` (first on ties)
fn best_line(items: &[&ListItem], text: &str) -> Option<usize> {
    let words = keywords(text);
    let phrase = normalized(text);
    items
        .iter()
        .map(|item| {
            let item_norm = normalized(&item.text);
            let score = if item_norm.contains(&phrase) {
                usize::MAX
            } else {
                words.iter().filter(|w| item_norm.contains(w.as_str())).count()
            };
            (score, item.line)
        })
        .filter(|(score, _)| *score > 0)
        .fold(None, |best: Option<(usize, usize)>, cur| match best {
            Some(b) if b.0 >= cur.0 => Some(b),
            _ => Some(cur),
        })
        .map(|(_, line)| line)
}

/// Every proposal change needs a task
fn check_unplanned_changes(proposal: &DocumentIndex, tasks: &DocumentIndex, report: &mut ValidationReport) {
    let task_text = normalized(tasks.lowercase());
    let task_items: Vec<&ListItem> = tasks.items.iter().collect();

    for change in proposal.change_items() {
        if near_match(&change.text, &task_text) {
            report.cross_refs.push(CrossRef {
                from: Artifact::Proposal,
                item: change.text.clone(),
                to: Artifact::TaskList,
                line: best_line(&task_items, &change.text),
            });
        } else {
            report.push(Finding::new(
                format!("proposed change has no matching task: \"{}\"", change.text),
                Artifact::Proposal,
                Some(change.line),
                Severity::High,
                ErrorCategory::UnplannedChange,
            ));
        }
    }
}

/// Acceptance criteria should be mentioned by the test plan
fn check_criteria_coverage(spec: &DocumentIndex, test_plan: &DocumentIndex, report: &mut ValidationReport) {
    let mut criteria = spec.checkboxes_under("Acceptance Criteria");
    if criteria.is_empty() {
        criteria = spec.checkboxes();
    }

    for criterion in criteria {
        let words = criterion_tokens(&criterion.text);
        if words.is_empty() {
            continue;
        }
        match words.iter().find(|w| test_plan.lowercase().contains(w.as_str())) {
            Some(word) => report.cross_refs.push(CrossRef {
                from: Artifact::Specification,
                item: criterion.text.clone(),
                to: Artifact::TestPlan,
                line: test_plan.line_containing(word),
            }),
            None => report.push(Finding::new(
                format!(
                    "acceptance criterion not covered by the test plan: \"{}\" (looked for: {})",
                    criterion.text,
                    words.join(", ")
                ),
                Artifact::Specification,
                Some(criterion.line),
                Severity::Medium,
                ErrorCategory::UncoveredCriterion,
            )),
        }
    }
}

/// Requirements should be tracked by tasks
fn check_requirement_tracking(spec: &DocumentIndex, tasks: &DocumentIndex, report: &mut ValidationReport) {
    for requirement in spec.bullets_under("Requirements") {
        let words = keywords(&requirement.text);
        if words.is_empty() {
            continue;
        }
        match words.iter().find(|w| tasks.lowercase().contains(w.as_str())) {
            Some(word) => report.cross_refs.push(CrossRef {
                from: Artifact::Specification,
                item: requirement.text.clone(),
                to: Artifact::TaskList,
                line: tasks.line_containing(word),
            }),
            None => report.push(Finding::new(
                format!("requirement not tracked by any task: \"{}\"", requirement.text),
                Artifact::Specification,
                Some(requirement.line),
                Severity::Medium,
                ErrorCategory::UntrackedRequirement,
            )),
        }
    }
}

/// Paths listed under "Affected Files" or on an `Affected files:` line
fn affected_files(doc: &DocumentIndex) -> BTreeSet<String> {
    let raw: Vec<String> = match doc.items_under("Affected Files") {
        items if !items.is_empty() => items.iter().map(|i| i.text.clone()).collect(),
        _ => doc.field("Affected files").into_iter().collect(),
    };

    raw.iter()
        .flat_map(|entry| entry.split(','))
        .map(|p| p.trim().trim_matches('`').trim())
        .map(|p| p.strip_prefix("./").unwrap_or(p).to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Proposal and specification should name the same files
fn check_affected_files(proposal: &DocumentIndex, spec: &DocumentIndex, report: &mut ValidationReport) {
    let in_proposal = affected_files(proposal);
    let in_spec = affected_files(spec);
    if in_proposal.is_empty() || in_spec.is_empty() || in_proposal == in_spec {
        return;
    }

    let only_proposal: Vec<&str> = in_proposal.difference(&in_spec).map(String::as_str).collect();
    let only_spec: Vec<&str> = in_spec.difference(&in_proposal).map(String::as_str).collect();
    let mut parts = Vec::new();
    if !only_proposal.is_empty() {
        parts.push(format!("only in proposal: {}", only_proposal.join(", ")));
    }
    if !only_spec.is_empty() {
        parts.push(format!("only in specification: {}", only_spec.join(", ")));
    }
    report.push(Finding::new(
        format!("affected files differ ({})", parts.join("; ")),
        Artifact::Specification,
        None,
        Severity::Medium,
        ErrorCategory::Inconsistency,
    ));
}

/// Content checks (everything except links); a missing document disables
/// the checks that need it
pub fn validate_documents(docs: &DocumentSet) -> ValidationReport {
    let parse = |artifact| docs.get(artifact).map(DocumentIndex::parse);
    let proposal = parse(Artifact::Proposal);
    let spec = parse(Artifact::Specification);
    let tasks = parse(Artifact::TaskList);
    let test_plan = parse(Artifact::TestPlan);

    let mut report = ValidationReport::default();
    if let (Some(proposal), Some(tasks)) = (&proposal, &tasks) {
        check_unplanned_changes(proposal, tasks, &mut report);
    }
    if let (Some(spec), Some(test_plan)) = (&spec, &test_plan) {
        check_criteria_coverage(spec, test_plan, &mut report);
    }
    if let (Some(spec), Some(tasks)) = (&spec, &tasks) {
        check_requirement_tracking(spec, tasks, &mut report);
    }
    if let (Some(proposal), Some(spec)) = (&proposal, &spec) {
        check_affected_files(proposal, spec, &mut report);
    }
    report
}

/// Lexically resolve a relative link; `None` if it escapes the base
fn resolve_inside(base: &Path, target: &str) -> Option<PathBuf> {
    let mut rel = PathBuf::new();
    for component in Path::new(target).components() {
        match component {
            Component::Normal(part) => rel.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !rel.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(base.join(rel))
}

/// Relative links must resolve inside the change directory
pub fn check_links(docs: &DocumentSet, change_dir: &Path) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (artifact, content) in docs.iter() {
        let doc = DocumentIndex::parse(content);
        for link in &doc.links {
            let target = link.target.trim();
            if target.is_empty() || target.starts_with('#') || scheme_re().is_match(target) {
                continue;
            }
            let path_part = target
                .split(['#', '?'])
                .next()
                .unwrap_or_default();
            if path_part.is_empty() {
                continue;
            }

            let resolves = resolve_inside(change_dir, path_part).map_or(false, |p| p.exists());
            if !resolves {
                report.push(Finding::new(
                    format!("link target does not resolve inside the change: {}", link.target),
                    artifact,
                    Some(link.line),
                    Severity::Medium,
                    ErrorCategory::BrokenReference,
                ));
            }
        }
    }

    report
}

/// Cross-document validator bound to one change directory
pub struct CrossValidator {
    change_dir: PathBuf,
}

impl CrossValidator {
    pub fn new(change_dir: impl Into<PathBuf>) -> Self {
        Self {
            change_dir: change_dir.into(),
        }
    }

    /// Run every check against the artifacts on disk
    pub fn validate(&self) -> PipelineResult<ValidationReport> {
        let docs = ArtifactStore::new(&self.change_dir).load_all()?;
        Ok(self.validate_loaded(&docs))
    }

    /// Run every check against already-loaded artifacts
    pub fn validate_loaded(&self, docs: &DocumentSet) -> ValidationReport {
        let mut report = validate_documents(docs);
        report.merge(check_links(docs, &self.change_dir));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn proposal(changes: &[&str]) -> String {
        let mut s = String::from("# Proposal\n\n## Summary\n\nS.\n\n## What Changes\n\n");
        for c in changes {
            s.push_str(&format!("- {}\n", c));
        }
        s
    }

    fn tasks(items: &[&str]) -> String {
        let mut s = String::from("# Tasks\n\n## Tasks\n\n");
        for t in items {
            s.push_str(&format!("- [ ] {}\n", t));
        }
        s
    }

    #[test]
    fn test_keywords_drop_short_and_stop_words() {
        assert_eq!(
            keywords("Add the OAuth provider config with the OAuth token"),
            vec!["oauth", "provider", "config", "token"]
        );
    }

    #[test]
    fn test_criterion_tokens_longest_first() {
        assert_eq!(
            criterion_tokens("Login redirects to the provider and stores session"),
            vec!["redirects", "provider", "session"]
        );
        assert!(criterion_tokens("it is ok").is_empty());
    }

    #[test]
    fn test_missing_task_is_single_blocking_issue() {
        let docs = DocumentSet::new()
            .with(Artifact::Proposal, proposal(&["Add X", "Add Y"]))
            .with(Artifact::TaskList, tasks(&["Add X"]));

        let report = validate_documents(&docs);
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].message.contains("Add Y"));
        assert_eq!(report.issues[0].category, ErrorCategory::UnplannedChange);
        assert_eq!(report.issues[0].line, Some(10));
        assert_eq!(report.cross_refs.len(), 1);
        assert_eq!(report.cross_refs[0].line, Some(5));
    }

    #[test]
    fn test_changes_come_only_from_their_section() {
        let proposal = "# Proposal: What changes for billing\n\n## Summary\n\nBilling.\n\n## What Changes\n\n- Add invoice export\n\n## Affected Files\n\n- `src/billing.rs`\n";
        let docs = DocumentSet::new()
            .with(Artifact::Proposal, proposal)
            .with(Artifact::TaskList, tasks(&["Add invoice export"]));

        let report = validate_documents(&docs);
        assert!(report.is_valid(), "{:?}", report.issues);
        assert_eq!(report.cross_refs.len(), 1);
        assert_eq!(report.cross_refs[0].item, "Add invoice export");
    }

    #[test]
    fn test_keyword_near_match() {
        let docs = DocumentSet::new()
            .with(Artifact::Proposal, proposal(&["Introduce token refresh for OAuth sessions"]))
            .with(Artifact::TaskList, tasks(&["Implement OAuth token refresh job"]));
        assert!(validate_documents(&docs).is_valid());
    }

    #[test]
    fn test_uncovered_criterion_is_advisory() {
        let spec = "# Spec\n\n## Requirements\n\n- Sessions expire\n\n## Acceptance Criteria\n\n- [ ] Expired sessions redirect to login\n- [ ] Metrics dashboard exported\n";
        let plan = "# Test Plan\n\n## Strategy\n\nUnit.\n\n## Test Cases\n\n- expired session redirect\n";
        let docs = DocumentSet::new()
            .with(Artifact::Specification, spec)
            .with(Artifact::TestPlan, plan)
            .with(Artifact::TaskList, tasks(&["Expire sessions after timeout"]));

        let report = validate_documents(&docs);
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].category, ErrorCategory::UncoveredCriterion);
        assert!(report.warnings[0].message.contains("Metrics dashboard"));
    }

    #[test]
    fn test_untracked_requirement() {
        let spec = "# Spec\n\n## Requirements\n\n- Audit logging of logins\n";
        let docs = DocumentSet::new()
            .with(Artifact::Specification, spec)
            .with(Artifact::TaskList, tasks(&["Build login form"]));

        let report = validate_documents(&docs);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].category, ErrorCategory::UntrackedRequirement);
    }

    #[test]
    fn test_affected_files_mismatch() {
        let p = format!("{}\n## Affected Files\n\n- `src/auth.rs`\n- src/config.rs\n", proposal(&["Add X"]));
        let s = "# Spec\n\nAffected files: `src/auth.rs`, ./src/session.rs\n";
        let docs = DocumentSet::new()
            .with(Artifact::Proposal, p)
            .with(Artifact::Specification, s);

        let report = validate_documents(&docs);
        assert_eq!(report.warnings.len(), 1);
        let message = &report.warnings[0].message;
        assert!(message.contains("only in proposal: src/config.rs"));
        assert!(message.contains("only in specification: src/session.rs"));
    }

    #[test]
    fn test_links_resolve_inside_change_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("specification.md"), "# Spec\n").unwrap();
        let content = "# P\n\n[ok](specification.md#r1) [url](https://x.io) [mail](mailto:a@b.c) [anchor](#top)\n[gone](missing.md) [escape](../outside.md)\n";
        let docs = DocumentSet::new().with(Artifact::Proposal, content);

        let report = check_links(&docs, temp.path());
        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings.iter().all(|w| w.line == Some(4)));
        assert!(report.warnings[0].message.contains("missing.md"));
        assert!(report.warnings[1].message.contains("../outside.md"));
    }

    #[test]
    fn test_validation_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        store.write(Artifact::Proposal, &proposal(&["Add X", "Add Y", "Remove Z"])).unwrap();
        store.write(Artifact::TaskList, &tasks(&["Add X"])).unwrap();

        let validator = CrossValidator::new(temp.path());
        let first = validator.validate().unwrap();
        let second = validator.validate().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.issues.len(), 2);
    }
}
