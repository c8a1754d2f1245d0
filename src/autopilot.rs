//! AutopilotLoop (spec.md §4.D) — the iteration state machine driving one
//! Task to completion through repeated LLMBackend calls.
//!
//! Generalizes the teacher's `LoopEngine`/`LoopManager`
//! (`td/src/loop/engine.rs`, `td/src/loop/manager.rs`): a single-task state
//! machine that builds a prompt, invokes the backend, records the outcome,
//! and decides whether to continue — but journaling through SessionJournal
//! rather than StateManager, and driven by CompletionAnalyzer rather than a
//! shell validation command.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analyzer::{self, AnalyzerConfig};
use crate::backend::{BackendError, ExecOpts, LlmBackend};
use crate::domain::{CompletionVerdict, Iteration, Response, Role, RunMode, SessionStatus, Task};
use crate::hooks::HookBus;
use crate::journal::{JournalError, SessionJournal};
use crate::readiness::ReadinessProbe;

/// Number of trailing characters from the previous iteration's response
/// folded into the next prompt (spec.md §4.D step 1, "bounded tail").
const DEFAULT_PROMPT_TAIL_CHARS: usize = 4_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Init,
    Ready,
    Iterating,
    Completed,
    Failed,
    Aborted,
}

/// Why a run ended, surfaced for the caller and for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    AnalyzerComplete,
    MaxIterations,
    ConsecutiveErrorLimit,
    OverallTimeout,
    StoppedExternally,
    ReadinessFailed(String),
    UnrecoverableBackendError(String),
    JournalFailure(String),
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub session_id: Uuid,
    pub final_state: LoopState,
    pub stop_reason: StopReason,
    pub iterations_run: u32,
    pub last_verdict: Option<CompletionVerdict>,
    /// User-visible `{success, errorKind, message, recoveryHints[]}` contract
    /// (spec.md §7). `error_kind`/`recovery_hints` are empty on success.
    pub success: bool,
    pub error_kind: Option<String>,
    pub message: String,
    pub recovery_hints: Vec<String>,
}

/// Renders a `StopReason` into the user-visible `message` field.
fn stop_reason_message(reason: &StopReason) -> String {
    match reason {
        StopReason::AnalyzerComplete => "analyzer verdict indicates the task is complete".to_string(),
        StopReason::MaxIterations => "reached the configured max iterations".to_string(),
        StopReason::ConsecutiveErrorLimit => "exhausted the consecutive backend error budget".to_string(),
        StopReason::OverallTimeout => "overall timeout elapsed before completion".to_string(),
        StopReason::StoppedExternally => "stop requested externally".to_string(),
        StopReason::ReadinessFailed(msg) => format!("backend not ready: {msg}"),
        StopReason::UnrecoverableBackendError(kind) => format!("unrecoverable backend error: {kind}"),
        StopReason::JournalFailure(msg) => format!("session journal failure: {msg}"),
    }
}

/// External stop signal, cheap to clone and hand to a supervising task.
#[derive(Clone, Default)]
pub struct StopHandle(Arc<std::sync::atomic::AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self(Arc::new(std::sync::atomic::AtomicBool::new(false)))
    }

    pub fn stop(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Backoff base per error kind (spec.md §4.D step 7: "network/timeout use a
/// longer base than logic errors; quota errors use the longest").
fn backoff_base(error: &BackendError) -> Duration {
    match error {
        BackendError::QuotaExhausted => Duration::from_secs(30),
        BackendError::Network(_) | BackendError::Timeout(_) => Duration::from_secs(5),
        _ => Duration::from_secs(1),
    }
}

fn backoff_for(error: &BackendError, consecutive_errors: u32) -> Duration {
    let base = backoff_base(error);
    let factor = 2u32.saturating_pow(consecutive_errors.saturating_sub(1).min(5));
    base.saturating_mul(factor).min(Duration::from_secs(120))
}

/// Folds the Task restatement plus a bounded tail of the previous response
/// into the next iteration's prompt (spec.md §4.D step 1).
fn build_prompt(task: &Task, iteration_n: u32, previous_response: Option<&Response>) -> String {
    if iteration_n == 1 {
        return task.initial_prompt.clone();
    }
    let mut prompt = String::new();
    prompt.push_str("Task restatement: ");
    prompt.push_str(&task.initial_prompt);
    prompt.push_str("\n\n");
    if let Some(prev) = previous_response {
        prompt.push_str("Previous output (tail):\n");
        let tail: String = prev
            .text
            .chars()
            .rev()
            .take(DEFAULT_PROMPT_TAIL_CHARS)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        prompt.push_str(&tail);
        prompt.push('\n');
    }
    prompt.push_str("\nIf the task is fully satisfied, state \"TASK COMPLETED\" explicitly.");
    prompt
}

/// Drives one Task through `LLMBackend.Execute -> CompletionAnalyzer.Analyze
/// -> Journal.Append -> HookBus.Publish` until a terminal state is reached.
pub struct AutopilotLoop {
    backend: Arc<dyn LlmBackend>,
    journal: SessionJournal,
    hooks: Arc<HookBus>,
    readiness: Arc<ReadinessProbe>,
    analyzer_config: AnalyzerConfig,
    role: Role,
    consecutive_errors: u32,
}

impl AutopilotLoop {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        journal: SessionJournal,
        hooks: Arc<HookBus>,
        readiness: Arc<ReadinessProbe>,
    ) -> Self {
        Self {
            backend,
            journal,
            hooks,
            readiness,
            analyzer_config: AnalyzerConfig::default(),
            role: Role::Single,
            consecutive_errors: 0,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_analyzer_config(mut self, config: AnalyzerConfig) -> Self {
        self.analyzer_config = config;
        self
    }

    /// Run `task` to completion. `stop` lets a caller request an external
    /// ABORTED transition between iterations.
    pub async fn start(&mut self, task: &Task, stop: &StopHandle) -> RunOutcome {
        debug!(mode = ?task.mode, max_iterations = task.max_iterations, "AutopilotLoop::start: called");

        let session_id = match self
            .journal
            .create(&task.initial_prompt, &task.working_directory, task.mode)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "AutopilotLoop::start: SessionJournal::create failed");
                return RunOutcome {
                    session_id: Uuid::nil(),
                    final_state: LoopState::Failed,
                    stop_reason: StopReason::ReadinessFailed(e.to_string()),
                    iterations_run: 0,
                    last_verdict: None,
                    success: false,
                    error_kind: Some("JournalError".to_string()),
                    message: format!("could not create session: {e}"),
                    recovery_hints: vec!["check disk space and permissions on the session directory".to_string()],
                };
            }
        };
        let emitter = self.hooks.emitter_for(session_id);

        // INIT -> READY on a successful ReadinessProbe, FAILED otherwise.
        // The Session already exists at this point (spec §8 scenario 6:
        // "INIT->FAILED ... zero iterations; session_created +
        // session_completed both published"), so a readiness failure
        // closes it immediately rather than leaving it dangling.
        let readiness = self.readiness.check().await;
        if !readiness.can_proceed() {
            warn!(?readiness.class, "AutopilotLoop::start: readiness probe failed, not starting");
            let reason = readiness
                .error
                .unwrap_or_else(|| "backend reported unavailable".to_string());
            if let Err(e) = self.journal.close(session_id, SessionStatus::Failed).await {
                warn!(%session_id, error = %e, "AutopilotLoop: journal close failed after readiness failure");
            }
            let error_kind = readiness.error_kind.map(str::to_string);
            let recovery_hints = match readiness.error_kind {
                Some("AuthRequired") => vec![BackendError::AuthRequired.recovery_hint().to_string()],
                Some("BackendNotInstalled") => vec![BackendError::BackendNotInstalled.recovery_hint().to_string()],
                _ => vec!["check backend installation and authentication".to_string()],
            };
            return RunOutcome {
                session_id,
                final_state: LoopState::Failed,
                stop_reason: StopReason::ReadinessFailed(reason.clone()),
                iterations_run: 0,
                last_verdict: None,
                success: false,
                error_kind,
                message: format!("backend not ready: {reason}"),
                recovery_hints,
            };
        }

        let overall_deadline = Instant::now() + task.overall_timeout();
        let mut previous_response: Option<Response> = None;
        let mut last_verdict: Option<CompletionVerdict> = None;
        let mut iterations_run = 0u32;
        let mut recovery_hints: Vec<String> = Vec::new();

        // READY -> ITERATING once the first iteration is scheduled below.
        let (final_state, stop_reason) = loop {
            if stop.is_stopped() {
                info!(%session_id, "AutopilotLoop: external stop requested");
                break (LoopState::Aborted, StopReason::StoppedExternally);
            }
            if Instant::now() >= overall_deadline {
                warn!(%session_id, "AutopilotLoop: overall timeout elapsed");
                recovery_hints = vec!["increase overallTimeoutMs or reduce task scope".to_string()];
                break (LoopState::Aborted, StopReason::OverallTimeout);
            }

            let n = iterations_run + 1;
            let prompt = build_prompt(task, n, previous_response.as_ref());
            emitter.iteration_started(n, role_label(self.role));

            let opts = ExecOpts::new(task.working_directory.clone(), task.per_call_timeout())
                .with_resume_token_if(previous_response.as_ref().and_then(|r| r.backend_session_token.clone()));
            let opts = match &task.backend_model_hint {
                Some(model) => opts.with_model(model.clone()),
                None => opts,
            };

            let call_started = Instant::now();
            let exec_result = self.backend.execute(&prompt, &opts).await;
            let duration_ms = call_started.elapsed().as_millis() as u64;

            let response = match exec_result {
                Ok(response) => {
                    self.consecutive_errors = 0;
                    response
                }
                Err(error) => {
                    emitter.backend_error(error.kind(), &error.to_string());
                    if matches!(error, BackendError::AuthRequired) {
                        emitter.backend_auth_required();
                    }
                    if error.is_always_surfaced() || !task.continue_on_error {
                        warn!(%session_id, kind = error.kind(), "AutopilotLoop: unrecoverable backend error");
                        let _ = self
                            .journal
                            .append(session_id, error_iteration(n, &prompt, &error, duration_ms, self.role))
                            .await;
                        recovery_hints = vec![error.recovery_hint().to_string()];
                        break (
                            LoopState::Failed,
                            StopReason::UnrecoverableBackendError(error.kind().to_string()),
                        );
                    }

                    self.consecutive_errors += 1;
                    let _ = self
                        .journal
                        .append(session_id, error_iteration(n, &prompt, &error, duration_ms, self.role))
                        .await;
                    if self.consecutive_errors >= task.max_consecutive_errors {
                        warn!(%session_id, "AutopilotLoop: consecutive-error budget exhausted");
                        recovery_hints = vec![
                            error.recovery_hint().to_string(),
                            "raise maxConsecutiveErrors if these failures are expected to be transient".to_string(),
                        ];
                        break (LoopState::Failed, StopReason::ConsecutiveErrorLimit);
                    }

                    let delay = backoff_for(&error, self.consecutive_errors);
                    debug!(%session_id, ?delay, consecutive_errors = self.consecutive_errors, "AutopilotLoop: backing off before retry");
                    tokio::time::sleep(delay).await;
                    iterations_run = n;
                    continue;
                }
            };

            let verdict = analyzer::analyze_guarded(&response, duration_ms, n, task.max_iterations, &self.analyzer_config);
            emitter.analyzer_verdict(n, verdict.confidence, verdict.quality_score);

            let iteration = Iteration {
                n,
                prompt,
                response: response.clone(),
                duration_ms,
                started_at: chrono::Utc::now(),
                role: self.role,
            };
            if let Err(e) = self.journal.append(session_id, iteration).await {
                warn!(%session_id, error = %e, "AutopilotLoop: journal append failed, fatal without retry");
                recovery_hints = vec!["check disk space and permissions on the session directory".to_string()];
                break (LoopState::Failed, fatal_journal_stop_reason(e));
            }

            emitter.iteration_completed(n, role_label(self.role), verdict.is_complete, verdict.confidence);
            iterations_run = n;
            previous_response = Some(response);
            last_verdict = Some(verdict.clone());

            if verdict.is_complete && !verdict.continuation_needed {
                break (LoopState::Completed, StopReason::AnalyzerComplete);
            }
            if n >= task.max_iterations {
                break (LoopState::Completed, StopReason::MaxIterations);
            }
        };

        let session_status = match final_state {
            LoopState::Completed => SessionStatus::Completed,
            LoopState::Aborted => SessionStatus::Aborted,
            _ => SessionStatus::Failed,
        };
        if let Err(e) = self.journal.close(session_id, session_status).await {
            warn!(%session_id, error = %e, "AutopilotLoop: journal close failed");
        }

        let success = matches!(final_state, LoopState::Completed);
        let error_kind = match &stop_reason {
            StopReason::AnalyzerComplete | StopReason::MaxIterations | StopReason::StoppedExternally => None,
            StopReason::OverallTimeout => Some("OverallTimeout".to_string()),
            StopReason::ConsecutiveErrorLimit => Some("ConsecutiveErrorLimit".to_string()),
            StopReason::ReadinessFailed(_) => Some("AuthRequired".to_string()),
            StopReason::UnrecoverableBackendError(kind) => Some(kind.clone()),
            StopReason::JournalFailure(_) => Some("JournalError".to_string()),
        };
        let message = stop_reason_message(&stop_reason);

        RunOutcome {
            session_id,
            final_state,
            stop_reason,
            iterations_run,
            last_verdict,
            success,
            error_kind: if success { None } else { error_kind },
            message,
            recovery_hints: if success { Vec::new() } else { recovery_hints },
        }
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::Single => "SINGLE",
        Role::Planner => "PLANNER",
        Role::Executor => "EXECUTOR",
    }
}

fn error_iteration(n: u32, prompt: &str, error: &BackendError, duration_ms: u64, role: Role) -> Iteration {
    Iteration {
        n,
        prompt: prompt.to_string(),
        response: Response::from_error(error.to_string()),
        duration_ms,
        started_at: chrono::Utc::now(),
        role,
    }
}

fn fatal_journal_stop_reason(e: JournalError) -> StopReason {
    StopReason::JournalFailure(e.to_string())
}

trait ExecOptsExt {
    fn with_resume_token_if(self, token: Option<String>) -> Self;
}

impl ExecOptsExt for ExecOpts {
    fn with_resume_token_if(self, token: Option<String>) -> Self {
        match token {
            Some(t) => self.with_resume_token(t),
            None => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::domain::ParsedArtifacts;

    fn task() -> Task {
        Task::new("do the thing", "/tmp").with_max_iterations(3)
    }

    fn ok_response(text: &str) -> Response {
        Response {
            text: text.to_string(),
            exit_status: 0,
            has_error: false,
            parsed_artifacts: ParsedArtifacts::default(),
            backend_session_token: None,
        }
    }

    fn new_loop(
        responses: Vec<Result<Response, BackendError>>,
    ) -> (AutopilotLoop, tempfile::TempDir) {
        let backend = Arc::new(MockBackend::new(responses));
        let hooks = Arc::new(HookBus::new(64));
        let dir = tempfile::TempDir::new().unwrap();
        let journal = SessionJournal::spawn(dir.path(), hooks.clone());
        let readiness = Arc::new(ReadinessProbe::new(backend.clone()));
        (AutopilotLoop::new(backend, journal, hooks, readiness), dir)
    }

    #[tokio::test]
    async fn completes_on_explicit_completion() {
        let (mut autopilot, _dir) = new_loop(vec![Ok(ok_response("11. TASK COMPLETED"))]);
        let outcome = autopilot.start(&task(), &StopHandle::new()).await;
        assert_eq!(outcome.final_state, LoopState::Completed);
        assert_eq!(outcome.stop_reason, StopReason::AnalyzerComplete);
        assert_eq!(outcome.iterations_run, 1);
    }

    #[tokio::test]
    async fn stops_at_max_iterations() {
        let (mut autopilot, _dir) = new_loop(vec![
            Ok(ok_response("still working, next step is X")),
            Ok(ok_response("still working, next step is Y")),
            Ok(ok_response("still working, next step is Z")),
        ]);
        let outcome = autopilot.start(&task(), &StopHandle::new()).await;
        assert_eq!(outcome.iterations_run, 3);
        assert_eq!(outcome.final_state, LoopState::Completed);
        assert_eq!(outcome.stop_reason, StopReason::MaxIterations);
    }

    #[tokio::test]
    async fn auth_required_fails_immediately_without_retry() {
        let (mut autopilot, _dir) = new_loop(vec![Err(BackendError::AuthRequired)]);
        let outcome = autopilot.start(&task(), &StopHandle::new()).await;
        assert_eq!(outcome.final_state, LoopState::Failed);
        assert!(matches!(outcome.stop_reason, StopReason::UnrecoverableBackendError(_)));
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind.as_deref(), Some("AuthRequired"));
        assert_eq!(outcome.recovery_hints, vec!["authenticate with the backend".to_string()]);
    }

    #[tokio::test]
    async fn completion_outcome_carries_no_error_fields() {
        let (mut autopilot, _dir) = new_loop(vec![Ok(ok_response("11. TASK COMPLETED"))]);
        let outcome = autopilot.start(&task(), &StopHandle::new()).await;
        assert!(outcome.success);
        assert_eq!(outcome.error_kind, None);
        assert!(outcome.recovery_hints.is_empty());
    }

    #[tokio::test]
    async fn readiness_failure_creates_and_immediately_closes_session() {
        let backend = Arc::new(MockBackend::new(vec![]).with_readiness(crate::backend::ReadinessStatus {
            installed: false,
            auth_ready: false,
            issues: vec!["missing binary".into()],
            can_proceed: false,
            degraded: false,
        }));
        let hooks = Arc::new(HookBus::new(16));
        let mut rx = hooks.subscribe();
        let dir = tempfile::TempDir::new().unwrap();
        let journal = SessionJournal::spawn(dir.path(), hooks.clone());
        let readiness = Arc::new(ReadinessProbe::new(backend.clone()));
        let mut autopilot = AutopilotLoop::new(backend, journal.clone(), hooks, readiness);

        let outcome = autopilot.start(&task(), &StopHandle::new()).await;
        assert_eq!(outcome.final_state, LoopState::Failed);
        assert!(matches!(outcome.stop_reason, StopReason::ReadinessFailed(_)));
        assert_ne!(outcome.session_id, Uuid::nil());
        assert_eq!(outcome.iterations_run, 0);

        let session = journal.load(outcome.session_id).await.unwrap();
        assert_eq!(session.status, crate::domain::SessionStatus::Failed);

        let created = rx.recv().await.unwrap();
        assert_eq!(created.event_type, crate::domain::HookEventType::SessionCreated);
        let completed = rx.recv().await.unwrap();
        assert_eq!(completed.event_type, crate::domain::HookEventType::SessionCompleted);
    }

    #[tokio::test]
    async fn consecutive_error_limit_reads_task_override_not_hardcoded() {
        let (mut autopilot, _dir) = new_loop(vec![
            Err(BackendError::Network("blip".into())),
            Err(BackendError::Network("blip".into())),
        ]);
        let task = task().with_max_consecutive_errors(1);
        let outcome = autopilot.start(&task, &StopHandle::new()).await;
        assert_eq!(outcome.final_state, LoopState::Failed);
        assert_eq!(outcome.stop_reason, StopReason::ConsecutiveErrorLimit);
    }

    #[test]
    fn backoff_scales_with_error_kind() {
        let network = backoff_for(&BackendError::Network("x".into()), 1);
        let quota = backoff_for(&BackendError::QuotaExhausted, 1);
        let internal = backoff_for(&BackendError::BackendInternal("x".into()), 1);
        assert!(quota > network);
        assert!(network > internal);
    }
}
