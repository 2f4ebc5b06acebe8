use super::{TestOutcome, TestRunner};
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Runs the project's configured test command
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    command: String,
    args: Vec<String>,
    cwd: PathBuf,
    show_progress: bool,
}

impl CommandTestRunner {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        cwd: impl Into<PathBuf>,
        show_progress: bool,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: cwd.into(),
            show_progress,
        }
    }

    fn spinner(&self) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "));
        }
        pb.set_message(format!("Running {}...", self.describe()));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Some(pb)
    }
}

fn tool_error(tool: &str, message: impl Into<String>) -> PipelineError {
    PipelineError::collaborator(tool, None, message)
}

#[async_trait(?Send)]
impl TestRunner for CommandTestRunner {
    fn program(&self) -> &str {
        &self.command
    }

    fn describe(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn run(&self) -> PipelineResult<TestOutcome> {
        tracing::info!(command = %self.describe(), "running tests");
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                tool_error(
                    &self.command,
                    format!(
                        "command '{}' could not be started ({}). Please ensure it is installed and in your PATH.",
                        self.command, e
                    ),
                )
            })?;

        let progress = self.spinner();

        // Drain both pipes concurrently so a chatty test suite cannot block
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| tool_error(&self.command, "failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| tool_error(&self.command, "failed to capture stderr"))?;
        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut stderr_reader = BufReader::new(stderr).lines();

        let mut output = String::new();
        let mut stdout_done = false;
        let mut stderr_done = false;

        while !stdout_done || !stderr_done {
            tokio::select! {
                line = stdout_reader.next_line(), if !stdout_done => {
                    match line {
                        Ok(Some(line)) => {
                            if let Some(ref pb) = progress {
                                let short: String = line.chars().take(60).collect();
                                pb.set_message(short);
                            }
                            output.push_str(&line);
                            output.push('\n');
                        }
                        Ok(None) => stdout_done = true,
                        Err(e) => return Err(tool_error(&self.command, format!("failed to read stdout: {}", e))),
                    }
                }
                line = stderr_reader.next_line(), if !stderr_done => {
                    match line {
                        Ok(Some(line)) => {
                            output.push_str(&line);
                            output.push('\n');
                        }
                        Ok(None) => stderr_done = true,
                        Err(e) => return Err(tool_error(&self.command, format!("failed to read stderr: {}", e))),
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| tool_error(&self.command, e.to_string()))?;

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        tracing::info!(passed = status.success(), code = ?status.code(), "tests finished");
        Ok(TestOutcome {
            passed: status.success(),
            exit_code: status.code(),
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_passing_and_failing_commands() {
        let temp = TempDir::new().unwrap();

        let ok = CommandTestRunner::new("sh", vec!["-c".into(), "echo all good".into()], temp.path(), false);
        let outcome = ok.run().await.unwrap();
        assert!(outcome.passed);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.output.contains("all good"));

        let failing = CommandTestRunner::new(
            "sh",
            vec!["-c".into(), "echo boom >&2; exit 3".into()],
            temp.path(),
            false,
        );
        let outcome = failing.run().await.unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.exit_code, Some(3));
        assert!(outcome.output.contains("boom"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let temp = TempDir::new().unwrap();
        let runner = CommandTestRunner::new("no-such-test-runner-xyz", vec![], temp.path(), false);
        assert_eq!(runner.program(), "no-such-test-runner-xyz");
        assert!(matches!(
            runner.run().await.unwrap_err(),
            PipelineError::CollaboratorFailure { .. }
        ));
    }
}
