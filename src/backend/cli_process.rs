//! A concrete LLMBackend that drives an external coding-assistant CLI as a
//! subprocess (spec.md SPEC_FULL.md §B: "BackendNotInstalled" as a distinct
//! error kind only makes sense for a `PATH`-resolved binary, not an HTTP
//! endpoint).
//!
//! Grounded in the teacher's `tokio::process::Command`-based invocation
//! style (`src/loop/engine.rs`'s git subprocess calls): build args, set
//! `current_dir`, await `.output()`, classify by exit status and stderr
//! text.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::{ParsedArtifacts, Response};

use super::error::BackendError;
use super::port::LlmBackend;
use super::types::{ExecOpts, ExecResult, ReadinessStatus};

/// One line of the backend's JSON transcript, if it emits one
/// (SPEC_FULL.md §B). Absence of structure never fails the loop.
#[derive(Debug, Deserialize)]
struct BackendTranscriptLine {
    text: Option<String>,
    #[serde(default)]
    files_touched: Vec<String>,
    #[serde(default)]
    commands_run: Vec<String>,
    #[serde(default)]
    tools_invoked: Vec<String>,
    #[serde(default)]
    cost_estimate: Option<f64>,
}

/// Drives `command` (e.g. `"claude"`, `"aider"`) as a one-shot subprocess
/// per `execute` call.
pub struct CliProcessBackend {
    command: String,
    extra_args: Vec<String>,
    auth_env_var: String,
}

impl CliProcessBackend {
    pub fn new(command: impl Into<String>, auth_env_var: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            extra_args: Vec::new(),
            auth_env_var: auth_env_var.into(),
        }
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    fn build_command(&self, prompt: &str, opts: &ExecOpts) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.current_dir(&opts.work_dir)
            .arg("--print")
            .arg(prompt)
            .args(&self.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(model) = &opts.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(token) = &opts.resume_session_token {
            cmd.arg("--resume").arg(token);
        }
        cmd
    }

    fn parse_output(stdout: &str, exit_status: i32, has_error: bool) -> Response {
        for line in stdout.lines().rev() {
            let trimmed = line.trim();
            if trimmed.starts_with('{') {
                if let Ok(parsed) = serde_json::from_str::<BackendTranscriptLine>(trimmed) {
                    debug!("CliProcessBackend::parse_output: parsed structured transcript line");
                    return Response {
                        text: parsed.text.unwrap_or_else(|| stdout.to_string()),
                        exit_status,
                        has_error,
                        parsed_artifacts: ParsedArtifacts {
                            files_touched: parsed.files_touched,
                            commands_run: parsed.commands_run,
                            tools_invoked: parsed.tools_invoked,
                            cost_estimate: parsed.cost_estimate,
                        },
                        backend_session_token: None,
                    };
                }
                break;
            }
        }
        debug!("CliProcessBackend::parse_output: falling back to raw stdout");
        Response {
            text: stdout.to_string(),
            exit_status,
            has_error,
            parsed_artifacts: ParsedArtifacts::default(),
            backend_session_token: None,
        }
    }

    fn classify_failure(exit_status: Option<i32>, stderr: &str) -> BackendError {
        let lower = stderr.to_lowercase();
        if lower.contains("unauthorized") || lower.contains("not authenticated") || lower.contains("auth") {
            return BackendError::AuthRequired;
        }
        if lower.contains("rate limit") || lower.contains("quota") {
            return BackendError::QuotaExhausted;
        }
        if lower.contains("connection") || lower.contains("network") || lower.contains("dns") {
            return BackendError::Network(stderr.to_string());
        }
        match exit_status {
            Some(127) => BackendError::BackendNotInstalled,
            _ => BackendError::BackendInternal(stderr.to_string()),
        }
    }
}

#[async_trait]
impl LlmBackend for CliProcessBackend {
    async fn execute(&self, prompt: &str, opts: &ExecOpts) -> Result<ExecResult, BackendError> {
        debug!(command = %self.command, work_dir = ?opts.work_dir, "CliProcessBackend::execute: called");

        let mut cmd = self.build_command(prompt, opts);

        let output = match tokio::time::timeout(opts.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(command = %self.command, "CliProcessBackend::execute: backend not installed");
                return Err(BackendError::BackendNotInstalled);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "CliProcessBackend::execute: transport failure spawning backend");
                return Err(BackendError::Transport(e.to_string()));
            }
            Err(_) => {
                debug!(timeout = ?opts.timeout, "CliProcessBackend::execute: timed out");
                return Err(BackendError::Timeout(opts.timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let err = Self::classify_failure(output.status.code(), &stderr);
            warn!(kind = err.kind(), "CliProcessBackend::execute: backend call failed");
            return Err(err);
        }

        Ok(Self::parse_output(&stdout, 0, false))
    }

    async fn probe_readiness(&self) -> Result<ReadinessStatus, BackendError> {
        debug!(command = %self.command, "CliProcessBackend::probe_readiness: called");

        let which = Command::new("which").arg(&self.command).output().await;
        let installed = matches!(which, Ok(output) if output.status.success());

        if !installed {
            debug!("CliProcessBackend::probe_readiness: backend not on PATH");
            return Ok(ReadinessStatus {
                installed: false,
                auth_ready: false,
                issues: vec![format!("'{}' not found on PATH", self.command)],
                can_proceed: false,
                degraded: false,
            });
        }

        let auth_ready = std::env::var(&self.auth_env_var).is_ok();
        let mut issues = Vec::new();
        if !auth_ready {
            issues.push(format!("environment variable {} is not set", self.auth_env_var));
        }

        Ok(ReadinessStatus {
            installed: true,
            auth_ready,
            can_proceed: auth_ready,
            degraded: false,
            issues,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn probe_readiness_reports_auth_ready_when_env_var_set() {
        let backend = CliProcessBackend::new("sh", "AUTOPILOT_TEST_AUTH_VAR");
        // SAFETY: serialized via #[serial], no other test touches this var concurrently.
        unsafe {
            std::env::set_var("AUTOPILOT_TEST_AUTH_VAR", "token");
        }
        let status = backend.probe_readiness().await.unwrap();
        unsafe {
            std::env::remove_var("AUTOPILOT_TEST_AUTH_VAR");
        }
        assert!(status.installed);
        assert!(status.auth_ready);
        assert!(status.can_proceed);
    }

    #[tokio::test]
    #[serial]
    async fn probe_readiness_reports_not_ready_without_env_var() {
        // SAFETY: serialized via #[serial], no other test touches this var concurrently.
        unsafe {
            std::env::remove_var("AUTOPILOT_TEST_AUTH_VAR");
        }
        let backend = CliProcessBackend::new("sh", "AUTOPILOT_TEST_AUTH_VAR");
        let status = backend.probe_readiness().await.unwrap();
        assert!(status.installed);
        assert!(!status.auth_ready);
        assert!(!status.can_proceed);
        assert!(!status.issues.is_empty());
    }

    #[test]
    fn classifies_auth_failures() {
        let err = CliProcessBackend::classify_failure(Some(1), "Error: not authenticated, please login");
        assert!(matches!(err, BackendError::AuthRequired));
    }

    #[test]
    fn classifies_missing_binary_by_exit_code() {
        let err = CliProcessBackend::classify_failure(Some(127), "command not found");
        assert!(matches!(err, BackendError::BackendNotInstalled));
    }

    #[test]
    fn classifies_quota_failures() {
        let err = CliProcessBackend::classify_failure(Some(1), "rate limit exceeded, try again later");
        assert!(matches!(err, BackendError::QuotaExhausted));
    }

    #[test]
    fn falls_back_to_backend_internal() {
        let err = CliProcessBackend::classify_failure(Some(1), "panic: index out of range");
        assert!(matches!(err, BackendError::BackendInternal(_)));
    }

    #[test]
    fn parse_output_falls_back_to_raw_stdout_when_unstructured() {
        let response = CliProcessBackend::parse_output("plain text reply", 0, false);
        assert_eq!(response.text, "plain text reply");
        assert!(response.parsed_artifacts.files_touched.is_empty());
    }

    #[test]
    fn parse_output_reads_trailing_json_line() {
        let stdout = "some preamble\n{\"text\": \"done\", \"files_touched\": [\"a.rs\"]}";
        let response = CliProcessBackend::parse_output(stdout, 0, false);
        assert_eq!(response.text, "done");
        assert_eq!(response.parsed_artifacts.files_touched, vec!["a.rs".to_string()]);
    }
}
