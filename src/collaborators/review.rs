//! Code-review collaborator backed by the GitHub CLI (`gh`)

use super::{run_checked, PullRequest, ReviewService};
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct GhCli {
    command: String,
    cwd: PathBuf,
}

#[derive(Debug, Deserialize)]
struct PrListEntry {
    url: String,
    #[serde(default)]
    number: Option<u64>,
}

/// Trailing `/pull/<n>` segment of a PR URL
fn number_from_url(url: &str) -> Option<u64> {
    url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

/// Parse `gh pr list --json url,number` output
fn parse_pr_list(json: &str) -> PipelineResult<Option<PullRequest>> {
    if json.trim().is_empty() {
        return Ok(None);
    }
    let entries: Vec<PrListEntry> = serde_json::from_str(json).map_err(|e| {
        PipelineError::collaborator("gh pr list", None, format!("unexpected output: {}", e))
    })?;
    Ok(entries.into_iter().next().map(|e| PullRequest {
        number: e.number.or_else(|| number_from_url(&e.url)),
        url: e.url,
    }))
}

impl GhCli {
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            cwd: cwd.into(),
        }
    }
}

#[async_trait(?Send)]
impl ReviewService for GhCli {
    async fn find_pull_request(&self, branch: &str) -> PipelineResult<Option<PullRequest>> {
        let json = run_checked(
            &self.command,
            &[
                "pr", "list", "--head", branch, "--state", "open", "--json", "url,number", "--limit",
                "1",
            ],
            &self.cwd,
        )
        .await?;
        parse_pr_list(&json)
    }

    async fn create_pull_request(
        &self,
        branch: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> PipelineResult<PullRequest> {
        let stdout = run_checked(
            &self.command,
            &[
                "pr", "create", "--head", branch, "--base", base, "--title", title, "--body", body,
            ],
            &self.cwd,
        )
        .await?;

        // gh prints the new PR URL as its last line
        let url = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| l.starts_with("http"))
            .ok_or_else(|| {
                PipelineError::collaborator("gh pr create", None, format!("no PR URL in output: {}", stdout))
            })?
            .to_string();

        Ok(PullRequest {
            number: number_from_url(&url),
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pr_list() {
        let json = r#"[{"url":"https://github.com/o/r/pull/42","number":42}]"#;
        let pr = parse_pr_list(json).unwrap().unwrap();
        assert_eq!(pr.number, Some(42));

        assert_eq!(parse_pr_list("[]").unwrap(), None);
        assert_eq!(parse_pr_list("").unwrap(), None);
        assert!(parse_pr_list("not json").is_err());
    }

    #[test]
    fn test_number_from_url() {
        assert_eq!(number_from_url("https://github.com/o/r/pull/7/"), Some(7));
        assert_eq!(number_from_url("https://github.com/o/r"), None);
    }
}
