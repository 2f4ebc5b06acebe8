//! Structural Validator
//!
//! Checks that an artifact has been substantively filled in: every required
//! section is present with the items it needs, and no template placeholder
//! survives. Only presence is checked, never prose quality.

use crate::error::{PipelineError, PipelineResult};
use crate::models::{Artifact, ErrorCategory, Finding, Severity, STAGE_COUNT};
use crate::parser::DocumentIndex;

/// What a required section must contain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionContent {
    /// Any non-blank text
    Text,
    /// At least `n` list items (bullets or checkboxes)
    Items(usize),
    /// At least `n` checkbox items
    Checkboxes(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct SectionRule {
    pub heading: &'static str,
    pub content: SectionContent,
}

const fn rule(heading: &'static str, content: SectionContent) -> SectionRule {
    SectionRule { heading, content }
}

const CHECKLIST_RULES: &[SectionRule] = &[rule("Stages", SectionContent::Checkboxes(STAGE_COUNT))];

const PROPOSAL_RULES: &[SectionRule] = &[
    rule("Summary", SectionContent::Text),
    rule("Why", SectionContent::Text),
    rule("What Changes", SectionContent::Items(1)),
];

const SPECIFICATION_RULES: &[SectionRule] = &[
    rule("Requirements", SectionContent::Items(1)),
    rule("Acceptance Criteria", SectionContent::Checkboxes(1)),
];

const TASK_LIST_RULES: &[SectionRule] = &[rule("Tasks", SectionContent::Checkboxes(1))];

const TEST_PLAN_RULES: &[SectionRule] = &[
    rule("Strategy", SectionContent::Text),
    rule("Test Cases", SectionContent::Items(1)),
];

/// Required sections for an artifact
pub fn rules_for(artifact: Artifact) -> &'static [SectionRule] {
    match artifact {
        Artifact::Checklist => CHECKLIST_RULES,
        Artifact::Proposal => PROPOSAL_RULES,
        Artifact::Specification => SPECIFICATION_RULES,
        Artifact::TaskList => TASK_LIST_RULES,
        Artifact::TestPlan => TEST_PLAN_RULES,
    }
}

/// Describe how a section falls short, if it does
fn section_gap(doc: &DocumentIndex, rule: &SectionRule) -> Option<(ErrorCategory, String)> {
    if !doc.has_section(rule.heading) {
        return Some((
            ErrorCategory::MissingHeading,
            format!("missing section '{}'", rule.heading),
        ));
    }

    match rule.content {
        SectionContent::Text if !doc.section_has_content(rule.heading) => Some((
            ErrorCategory::EmptyContent,
            format!("section '{}' is empty", rule.heading),
        )),
        SectionContent::Items(n) if doc.items_under(rule.heading).len() < n => Some((
            ErrorCategory::EmptyContent,
            format!("section '{}' needs at least {} list item(s)", rule.heading, n),
        )),
        SectionContent::Checkboxes(n) if doc.checkboxes_under(rule.heading).len() < n => Some((
            ErrorCategory::EmptyContent,
            format!("section '{}' needs at least {} checkbox item(s)", rule.heading, n),
        )),
        _ => None,
    }
}

/// All structural findings for one artifact
pub fn check_document(artifact: Artifact, content: &str) -> Vec<Finding> {
    let doc = DocumentIndex::parse(content);
    let mut findings: Vec<Finding> = doc
        .placeholders
        .iter()
        .map(|p| {
            Finding::new(
                format!("unfilled placeholder {}", p.text),
                artifact,
                Some(p.line),
                Severity::High,
                ErrorCategory::Placeholder,
            )
        })
        .collect();

    for rule in rules_for(artifact) {
        if let Some((category, message)) = section_gap(&doc, rule) {
            findings.push(Finding::new(message, artifact, None, Severity::High, category));
        }
    }

    findings
}

/// Gate a stage on its artifact: placeholders first, then required sections
pub fn require_complete(artifact: Artifact, content: &str) -> PipelineResult<()> {
    let doc = DocumentIndex::parse(content);

    if let Some(first) = doc.placeholders.first() {
        return Err(PipelineError::TemplatePlaceholderRemaining {
            artifact,
            count: doc.placeholders.len(),
            line: first.line,
            text: first.text.clone(),
        });
    }

    let missing: Vec<String> = rules_for(artifact)
        .iter()
        .filter_map(|rule| section_gap(&doc, rule).map(|(_, message)| message))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::StructureIncomplete { artifact, missing });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROPOSAL_OK: &str = "# Proposal: OAuth\n\n## Summary\n\nAdd OAuth.\n\n## Why\n\nUsers asked.\n\n## What Changes\n\n- Add provider config\n";

    #[test]
    fn test_complete_proposal_passes() {
        assert!(require_complete(Artifact::Proposal, PROPOSAL_OK).is_ok());
        assert!(check_document(Artifact::Proposal, PROPOSAL_OK).is_empty());
    }

    #[test]
    fn test_placeholder_reported_before_structure() {
        let content = "# Proposal\n\n## Summary\n\n[[FILL: summary]]\n";
        let err = require_complete(Artifact::Proposal, content).unwrap_err();
        match err {
            PipelineError::TemplatePlaceholderRemaining { count, line, .. } => {
                assert_eq!(count, 1);
                assert_eq!(line, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_sections_are_listed() {
        let content = "# Proposal\n\n## Summary\n\nText.\n\n## Why\n\n## What Changes\n\nProse only.\n";
        let err = require_complete(Artifact::Proposal, content).unwrap_err();
        match err {
            PipelineError::StructureIncomplete { artifact, missing } => {
                assert_eq!(artifact, Artifact::Proposal);
                assert_eq!(
                    missing,
                    vec![
                        "section 'Why' is empty".to_string(),
                        "section 'What Changes' needs at least 1 list item(s)".to_string()
                    ]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_title_cannot_stand_in_for_a_section() {
        let content = "# Proposal: Weekly summary digest\n\n## Why\n\nUsers asked.\n\n## What Changes\n\n- Add digest job\n";
        match require_complete(Artifact::Proposal, content).unwrap_err() {
            PipelineError::StructureIncomplete { missing, .. } => {
                assert_eq!(missing, vec!["missing section 'Summary'".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_acceptance_criteria_need_checkboxes() {
        let content = "# Spec\n\n## Requirements\n\n- R1 login\n\n## Acceptance Criteria\n\n- login works\n";
        let findings = check_document(Artifact::Specification, content);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, ErrorCategory::EmptyContent);
    }

    #[test]
    fn test_checklist_requires_every_stage() {
        let mut content = String::from("# Checklist\n\n## Stages\n\n");
        for i in 0..STAGE_COUNT - 1 {
            content.push_str(&format!("- [ ] {}\n", i));
        }
        assert!(require_complete(Artifact::Checklist, &content).is_err());
        content.push_str("- [ ] 12\n");
        assert!(require_complete(Artifact::Checklist, &content).is_ok());
    }
}
