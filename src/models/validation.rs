use super::Artifact;
use serde::{Deserialize, Serialize};

/// Severity level for validation findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// High severity - blocks stage completion, must be fixed
    High,
    /// Medium severity - advisory warning, should be fixed
    Medium,
    /// Low severity - informational, nice to fix
    Low,
}

impl Severity {
    /// Get display symbol for severity
    pub fn symbol(&self) -> &'static str {
        match self {
            Severity::High => "🔴",
            Severity::Medium => "🟡",
            Severity::Low => "🔵",
        }
    }

    /// Get display name for severity
    pub fn name(&self) -> &'static str {
        match self {
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

/// Category of validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Required section heading absent
    MissingHeading,
    /// Section present but without the required items
    EmptyContent,
    /// Template placeholder still in the document
    Placeholder,
    /// Proposal change without a matching task
    UnplannedChange,
    /// Acceptance criterion without test coverage
    UncoveredCriterion,
    /// Requirement without a matching task
    UntrackedRequirement,
    /// Link target that does not resolve
    BrokenReference,
    /// Documents disagree with each other
    Inconsistency,
}

impl ErrorCategory {
    /// Get display name for category
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCategory::MissingHeading => "Missing Heading",
            ErrorCategory::EmptyContent => "Empty Content",
            ErrorCategory::Placeholder => "Placeholder",
            ErrorCategory::UnplannedChange => "Unplanned Change",
            ErrorCategory::UncoveredCriterion => "Uncovered Criterion",
            ErrorCategory::UntrackedRequirement => "Untracked Requirement",
            ErrorCategory::BrokenReference => "Broken Reference",
            ErrorCategory::Inconsistency => "Inconsistency",
        }
    }
}

/// A single validator finding
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Finding {
    /// Message describing what's wrong
    pub message: String,
    /// Artifact where the finding was made
    pub artifact: Artifact,
    /// Line number (1-indexed) if applicable
    pub line: Option<usize>,
    /// Severity level
    pub severity: Severity,
    /// Category for grouping
    pub category: ErrorCategory,
}

impl Finding {
    pub fn new(
        message: impl Into<String>,
        artifact: Artifact,
        line: Option<usize>,
        severity: Severity,
        category: ErrorCategory,
    ) -> Self {
        Self {
            message: message.into(),
            artifact,
            line,
            severity,
            category,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::High
    }

    /// Format finding for display
    pub fn format(&self) -> String {
        match self.line {
            Some(line) => format!(
                "{} [{}] {}:{} - {}",
                self.severity.symbol(),
                self.severity.name(),
                self.artifact,
                line,
                self.message
            ),
            None => format!(
                "{} [{}] {} - {}",
                self.severity.symbol(),
                self.severity.name(),
                self.artifact,
                self.message
            ),
        }
    }
}

/// A resolved link between an item in one artifact and its counterpart in another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossRef {
    pub from: Artifact,
    pub item: String,
    pub to: Artifact,
    /// Line in `to` where the match was found
    pub line: Option<usize>,
}

/// Outcome of a validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Blocking findings
    pub issues: Vec<Finding>,
    /// Advisory findings
    pub warnings: Vec<Finding>,
    pub cross_refs: Vec<CrossRef>,
}

impl ValidationReport {
    /// Route a finding to issues or warnings by severity
    pub fn push(&mut self, finding: Finding) {
        if finding.is_blocking() {
            self.issues.push(finding);
        } else {
            self.warnings.push(finding);
        }
    }

    pub fn extend(&mut self, findings: impl IntoIterator<Item = Finding>) {
        for finding in findings {
            self.push(finding);
        }
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.issues.extend(other.issues);
        self.warnings.extend(other.warnings);
        self.cross_refs.extend(other.cross_refs);
    }

    /// Valid when nothing blocks
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Blocking findings raised against one artifact
    pub fn issues_for(&self, artifact: Artifact) -> Vec<&Finding> {
        self.issues.iter().filter(|f| f.artifact == artifact).collect()
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.issues
            .iter()
            .chain(self.warnings.iter())
            .filter(|f| f.severity == severity)
            .count()
    }

    /// Format all findings for display
    pub fn format_findings(&self) -> String {
        self.issues
            .iter()
            .chain(self.warnings.iter())
            .map(|f| f.format())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_routes_by_severity() {
        let mut report = ValidationReport::default();
        report.push(Finding::new(
            "blocking",
            Artifact::TaskList,
            None,
            Severity::High,
            ErrorCategory::UnplannedChange,
        ));
        report.push(Finding::new(
            "advisory",
            Artifact::TestPlan,
            Some(3),
            Severity::Medium,
            ErrorCategory::UncoveredCriterion,
        ));

        assert!(!report.is_valid());
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.issues_for(Artifact::TaskList).len(), 1);
        assert_eq!(report.count_by_severity(Severity::Medium), 1);
    }

    #[test]
    fn test_format_with_line() {
        let finding = Finding::new(
            "dangling link",
            Artifact::Proposal,
            Some(12),
            Severity::Medium,
            ErrorCategory::BrokenReference,
        );
        assert_eq!(finding.format(), "🟡 [MEDIUM] proposal.md:12 - dangling link");
    }
}
