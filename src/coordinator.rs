//! DualAgentCoordinator (spec.md §4.E) — the Planner/Executor handoff
//! protocol. One "cycle" is PLAN -> EXECUTE -> REVIEW -> {CONTINUE_CYCLE |
//! COMPLETE | FAIL}, both roles sharing a single Session (spec.md §3
//! ownership note: "the Coordinator owns its own Session plus two child
//! Autopilot invocations... sharing nothing but the Task").
//!
//! Grounded in the teacher's `coordinator::core::Coordinator` for the
//! overall "mediates turns between two actors, tracks per-cycle counters"
//! shape, generalized from N free-form loops alerting each other to a
//! fixed two-role protocol with a quality gate.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analyzer::{self, AnalyzerConfig};
use crate::backend::{BackendError, ExecOpts, LlmBackend};
use crate::config::DualAgentConfig;
use crate::domain::{HandoffRecord, Iteration, Response, Role, RunMode, SessionStatus, Task};
use crate::hooks::HookBus;
use crate::journal::SessionJournal;
use crate::readiness::ReadinessProbe;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorStopReason {
    PlannerDeclaredComplete,
    MaxCyclesReached,
    QualityGateExceeded,
    ReadinessFailed(String),
    UnrecoverableBackendError(String),
    OverallTimeout,
    JournalFailure(String),
}

/// Renders a `CoordinatorStopReason` into the user-visible `message` field.
fn stop_reason_message(reason: &CoordinatorStopReason) -> String {
    match reason {
        CoordinatorStopReason::PlannerDeclaredComplete => "planner declared the task complete".to_string(),
        CoordinatorStopReason::MaxCyclesReached => "reached the configured max cycles".to_string(),
        CoordinatorStopReason::QualityGateExceeded => "exhausted retries without passing the quality gate".to_string(),
        CoordinatorStopReason::ReadinessFailed(msg) => format!("backend not ready: {msg}"),
        CoordinatorStopReason::UnrecoverableBackendError(kind) => format!("unrecoverable backend error: {kind}"),
        CoordinatorStopReason::OverallTimeout => "overall timeout elapsed before completion".to_string(),
        CoordinatorStopReason::JournalFailure(msg) => format!("session journal failure: {msg}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct CoordinatorOutcome {
    pub session_id: Uuid,
    pub final_state: CoordinatorState,
    pub stop_reason: CoordinatorStopReason,
    pub handoff_count: u32,
    pub planner_iterations: u32,
    pub executor_iterations: u32,
    /// User-visible `{success, errorKind, message, recoveryHints[]}` contract
    /// (spec.md §7). `error_kind`/`recovery_hints` are empty on success.
    pub success: bool,
    pub error_kind: Option<String>,
    pub message: String,
    pub recovery_hints: Vec<String>,
}

/// A backend call failure, carrying enough to populate the outcome's
/// `errorKind`/`recoveryHints` once it reaches the top-level `start()`.
#[derive(Debug, Clone)]
struct BackendFailure {
    kind: String,
    hint: String,
}

enum StepOutcome {
    Passed { planner_declares_complete: bool },
    GateExceeded,
    BackendFailed(BackendFailure),
}

/// Drives one Task through the PLAN -> EXECUTE -> REVIEW cycle.
pub struct DualAgentCoordinator {
    backend: Arc<dyn LlmBackend>,
    journal: SessionJournal,
    hooks: Arc<HookBus>,
    readiness: Arc<ReadinessProbe>,
    analyzer_config: AnalyzerConfig,
    config: DualAgentConfig,
}

impl DualAgentCoordinator {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        journal: SessionJournal,
        hooks: Arc<HookBus>,
        readiness: Arc<ReadinessProbe>,
        config: DualAgentConfig,
    ) -> Self {
        Self {
            backend,
            journal,
            hooks,
            readiness,
            analyzer_config: AnalyzerConfig::default(),
            config,
        }
    }

    pub fn with_analyzer_config(mut self, config: AnalyzerConfig) -> Self {
        self.analyzer_config = config;
        self
    }

    pub async fn start(&mut self, task: &Task) -> CoordinatorOutcome {
        debug!(max_cycles = self.config.max_cycles, "DualAgentCoordinator::start: called");

        let session_id = match self
            .journal
            .create(&task.initial_prompt, &task.working_directory, RunMode::Dual)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                return CoordinatorOutcome {
                    session_id: Uuid::nil(),
                    final_state: CoordinatorState::Failed,
                    stop_reason: CoordinatorStopReason::ReadinessFailed(e.to_string()),
                    handoff_count: 0,
                    planner_iterations: 0,
                    executor_iterations: 0,
                    success: false,
                    error_kind: Some("JournalError".to_string()),
                    message: format!("could not create session: {e}"),
                    recovery_hints: vec!["check disk space and permissions on the session directory".to_string()],
                };
            }
        };
        let emitter = self.hooks.emitter_for(session_id);

        // The Session already exists at this point (spec §8 scenario 6:
        // zero iterations, session_created + session_completed both
        // published), so a readiness failure closes it immediately rather
        // than leaving it dangling.
        let readiness = self.readiness.check().await;
        if !readiness.can_proceed() {
            let error_kind = readiness.error_kind.map(str::to_string);
            let recovery_hints = match readiness.error_kind {
                Some("AuthRequired") => vec![BackendError::AuthRequired.recovery_hint().to_string()],
                Some("BackendNotInstalled") => vec![BackendError::BackendNotInstalled.recovery_hint().to_string()],
                _ => vec!["check backend installation and authentication".to_string()],
            };
            let reason = readiness.error.unwrap_or_else(|| "backend reported unavailable".to_string());
            if let Err(e) = self.journal.close(session_id, SessionStatus::Failed).await {
                warn!(%session_id, error = %e, "DualAgentCoordinator: journal close failed after readiness failure");
            }
            return CoordinatorOutcome {
                session_id,
                final_state: CoordinatorState::Failed,
                stop_reason: CoordinatorStopReason::ReadinessFailed(reason.clone()),
                handoff_count: 0,
                planner_iterations: 0,
                executor_iterations: 0,
                success: false,
                error_kind,
                message: format!("backend not ready: {reason}"),
                recovery_hints,
            };
        }
        let overall_deadline = Instant::now() + task.overall_timeout();

        let mut planner_iterations = 0u32;
        let mut executor_iterations = 0u32;
        let mut handoff_count = 0u32;
        let mut cycle = 0u32;
        let mut next_step_seed = task.initial_prompt.clone();

        let mut recovery_hints: Vec<String> = Vec::new();

        let (final_state, stop_reason) = 'cycles: loop {
            if Instant::now() >= overall_deadline {
                recovery_hints = vec!["increase overallTimeoutMs or reduce task scope".to_string()];
                break (CoordinatorState::Failed, CoordinatorStopReason::OverallTimeout);
            }
            if cycle >= self.config.max_cycles {
                break (CoordinatorState::Completed, CoordinatorStopReason::MaxCyclesReached);
            }
            cycle += 1;

            // PLAN
            let plan_prompt = build_planner_prompt(task, &next_step_seed, cycle);
            let (plan_response, failure) = self
                .call_backend(task, session_id, &emitter, Role::Planner, &plan_prompt, &mut planner_iterations)
                .await;
            if let Some(failure) = failure {
                recovery_hints = vec![failure.hint.clone()];
                break (CoordinatorState::Failed, CoordinatorStopReason::UnrecoverableBackendError(failure.kind));
            }
            let plan_response = plan_response.expect("backend call succeeded");
            let (next_step, acceptance_criteria) = parse_plan(&plan_response.text);

            emitter.handoff(&HandoffRecord {
                from: Role::Planner,
                to: Role::Executor,
                cycle,
                rationale: next_step.clone(),
                quality_gate_passed: false,
            });
            handoff_count += 1;

            // EXECUTE + REVIEW, retried up to retryPerStep on a failed quality gate.
            let mut retries = 0u32;
            let mut executor_critique = String::new();
            let step_outcome = loop {
                let executor_output = match self
                    .run_executor(task, session_id, &emitter, &next_step, &acceptance_criteria, &executor_critique, &mut executor_iterations)
                    .await
                {
                    Ok(output) => output,
                    Err(reason) => break StepOutcome::BackendFailed(reason),
                };

                emitter.handoff(&HandoffRecord {
                    from: Role::Executor,
                    to: Role::Planner,
                    cycle,
                    rationale: "review pending".to_string(),
                    quality_gate_passed: false,
                });
                handoff_count += 1;

                let review_prompt = build_review_prompt(&next_step, &acceptance_criteria, &executor_output);
                let (review_response, failure) = self
                    .call_backend(task, session_id, &emitter, Role::Planner, &review_prompt, &mut planner_iterations)
                    .await;
                let Some(review_response) = review_response else {
                    break StepOutcome::BackendFailed(failure.unwrap_or(BackendFailure {
                        kind: "BackendInternal".to_string(),
                        hint: "retry; if persistent, report to the backend maintainer".to_string(),
                    }));
                };

                let review_verdict = analyzer::analyze_guarded(&review_response, 0, cycle, self.config.max_cycles, &self.analyzer_config);
                let quality_gate_passed = review_verdict.quality_score >= self.config.quality_gate_threshold;

                emitter.handoff(&HandoffRecord {
                    from: Role::Executor,
                    to: Role::Planner,
                    cycle,
                    rationale: review_verdict
                        .reason
                        .clone()
                        .unwrap_or_else(|| "quality review complete".to_string()),
                    quality_gate_passed,
                });
                handoff_count += 1;

                if quality_gate_passed {
                    break StepOutcome::Passed {
                        planner_declares_complete: review_verdict.is_complete && !review_verdict.continuation_needed,
                    };
                }

                retries += 1;
                if retries > self.config.retry_per_step {
                    break StepOutcome::GateExceeded;
                }
                warn!(%session_id, cycle, retries, "DualAgentCoordinator: quality gate failed, retrying step");
                executor_critique = review_verdict
                    .reason
                    .unwrap_or_else(|| "quality gate not met; revise the previous attempt".to_string());
            };

            match step_outcome {
                StepOutcome::Passed {
                    planner_declares_complete: true,
                } => {
                    break 'cycles (CoordinatorState::Completed, CoordinatorStopReason::PlannerDeclaredComplete);
                }
                StepOutcome::Passed {
                    planner_declares_complete: false,
                } => {
                    next_step_seed = next_step;
                    continue 'cycles;
                }
                StepOutcome::GateExceeded => {
                    recovery_hints =
                        vec!["raise qualityGateThreshold tolerance or increase retryPerStep".to_string()];
                    break 'cycles (CoordinatorState::Failed, CoordinatorStopReason::QualityGateExceeded);
                }
                StepOutcome::BackendFailed(failure) => {
                    recovery_hints = vec![failure.hint];
                    break 'cycles (
                        CoordinatorState::Failed,
                        CoordinatorStopReason::UnrecoverableBackendError(failure.kind),
                    );
                }
            }
        };

        let session_status = match final_state {
            CoordinatorState::Completed => SessionStatus::Completed,
            CoordinatorState::Failed => SessionStatus::Failed,
        };
        if let Err(e) = self.journal.close(session_id, session_status).await {
            warn!(%session_id, error = %e, "DualAgentCoordinator: journal close failed");
        }
        info!(%session_id, ?final_state, handoff_count, "DualAgentCoordinator: run finished");

        let success = matches!(final_state, CoordinatorState::Completed);
        let error_kind = match &stop_reason {
            CoordinatorStopReason::PlannerDeclaredComplete | CoordinatorStopReason::MaxCyclesReached => None,
            CoordinatorStopReason::QualityGateExceeded => Some("QualityGateExceeded".to_string()),
            CoordinatorStopReason::ReadinessFailed(_) => Some("AuthRequired".to_string()),
            CoordinatorStopReason::UnrecoverableBackendError(kind) => Some(kind.clone()),
            CoordinatorStopReason::OverallTimeout => Some("OverallTimeout".to_string()),
            CoordinatorStopReason::JournalFailure(_) => Some("JournalError".to_string()),
        };
        let message = stop_reason_message(&stop_reason);

        CoordinatorOutcome {
            session_id,
            final_state,
            stop_reason,
            handoff_count,
            planner_iterations,
            executor_iterations,
            success,
            error_kind: if success { None } else { error_kind },
            message,
            recovery_hints: if success { Vec::new() } else { recovery_hints },
        }
    }

    /// Executor role, iterating internally up to `executorInnerMax` times
    /// with its own completion check (spec.md §4.E EXECUTE).
    async fn run_executor(
        &self,
        task: &Task,
        session_id: Uuid,
        emitter: &crate::hooks::HookEmitter,
        next_step: &str,
        acceptance_criteria: &str,
        critique: &str,
        executor_iterations: &mut u32,
    ) -> Result<String, BackendFailure> {
        let mut last_output = String::new();
        for inner in 1..=self.config.executor_inner_max {
            let prompt = build_executor_prompt(next_step, acceptance_criteria, critique, inner);
            let (response, failure) = self
                .call_backend(task, session_id, emitter, Role::Executor, &prompt, executor_iterations)
                .await;
            let Some(response) = response else {
                return Err(failure.unwrap_or(BackendFailure {
                    kind: "BackendInternal".to_string(),
                    hint: "retry; if persistent, report to the backend maintainer".to_string(),
                }));
            };
            last_output = response.text.clone();
            let verdict = analyzer::analyze_guarded(&response, 0, inner, self.config.executor_inner_max, &self.analyzer_config);
            if verdict.is_complete && !verdict.continuation_needed {
                break;
            }
        }
        Ok(last_output)
    }

    /// One backend call, journaled under `role`. Returns `(None, Some(reason))`
    /// when the error is unrecoverable (spec.md §4.D failure semantics apply
    /// equally within a dual-agent turn).
    async fn call_backend(
        &self,
        task: &Task,
        session_id: Uuid,
        emitter: &crate::hooks::HookEmitter,
        role: Role,
        prompt: &str,
        iteration_counter: &mut u32,
    ) -> (Option<Response>, Option<BackendFailure>) {
        let n = *iteration_counter + 1;
        emitter.iteration_started(n, role_label(role));
        let model_hint = match role {
            Role::Planner => self.config.planner_model_hint.clone().or_else(|| task.backend_model_hint.clone()),
            Role::Executor => self.config.executor_model_hint.clone().or_else(|| task.backend_model_hint.clone()),
            Role::Single => task.backend_model_hint.clone(),
        };
        let opts = ExecOpts::new(task.working_directory.clone(), task.per_call_timeout());
        let opts = match model_hint {
            Some(model) => opts.with_model(model),
            None => opts,
        };

        let started = Instant::now();
        match self.backend.execute(prompt, &opts).await {
            Ok(response) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                let verdict = analyzer::analyze_guarded(&response, duration_ms, n, task.max_iterations, &self.analyzer_config);
                let iteration = Iteration {
                    n,
                    prompt: prompt.to_string(),
                    response: response.clone(),
                    duration_ms,
                    started_at: chrono::Utc::now(),
                    role,
                };
                let _ = self.journal.append(session_id, iteration).await;
                emitter.iteration_completed(n, role_label(role), verdict.is_complete, verdict.confidence);
                *iteration_counter = n;
                (Some(response), None)
            }
            Err(error) => {
                emitter.backend_error(error.kind(), &error.to_string());
                let duration_ms = started.elapsed().as_millis() as u64;
                let iteration = Iteration {
                    n,
                    prompt: prompt.to_string(),
                    response: Response::from_error(error.to_string()),
                    duration_ms,
                    started_at: chrono::Utc::now(),
                    role,
                };
                let _ = self.journal.append(session_id, iteration).await;
                *iteration_counter = n;
                // A backend error within a turn ends that turn; the caller
                // treats it as a step failure (consumes a retry) rather than
                // distinguishing further, since continueOnError already
                // governs whether the caller should have started at all.
                (
                    None,
                    Some(BackendFailure {
                        kind: error.kind().to_string(),
                        hint: error.recovery_hint().to_string(),
                    }),
                )
            }
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

fn build_planner_prompt(task: &Task, seed: &str, cycle: u32) -> String {
    format!(
        "You are the Planner for cycle {cycle}. Task: {}\n\nLatest context: {seed}\n\n\
         Produce: (1) the next actionable step, (2) explicit acceptance criteria for that step.",
        task.initial_prompt
    )
}

fn build_executor_prompt(next_step: &str, acceptance_criteria: &str, critique: &str, inner: u32) -> String {
    let mut prompt = format!("You are the Executor, attempt {inner}. Next step: {next_step}\nAcceptance criteria: {acceptance_criteria}\n");
    if !critique.is_empty() {
        prompt.push_str(&format!("\nPlanner critique from the previous attempt: {critique}\n"));
    }
    prompt.push_str("\nPerform this step now.");
    prompt
}

fn build_review_prompt(next_step: &str, acceptance_criteria: &str, executor_output: &str) -> String {
    format!(
        "You are the Planner reviewing Executor output for the step: {next_step}\n\
         Acceptance criteria: {acceptance_criteria}\n\nExecutor output:\n{executor_output}\n\n\
         Classify against the acceptance criteria. If the overall task is fully satisfied, state \"TASK COMPLETED\" explicitly."
    )
}

/// Best-effort split of the Planner's output into a next-step line and the
/// acceptance-criteria block (spec.md §4.E: "output must include an explicit
/// 'next actionable step' and acceptance criteria"). No structured backend
/// output is assumed, so this is line-oriented and tolerant of free text.
fn parse_plan(text: &str) -> (String, String) {
    let mut next_step = String::new();
    let mut acceptance = String::new();
    let mut in_acceptance = false;
    for line in text.lines() {
        let lower = line.to_lowercase();
        if lower.contains("acceptance criteria") {
            in_acceptance = true;
            continue;
        }
        if lower.contains("next step") || lower.contains("next actionable step") {
            next_step.push_str(line);
            next_step.push(' ');
            in_acceptance = false;
            continue;
        }
        if in_acceptance {
            acceptance.push_str(line);
            acceptance.push('\n');
        }
    }
    if next_step.trim().is_empty() {
        next_step = text.lines().next().unwrap_or(text).to_string();
    }
    if acceptance.trim().is_empty() {
        acceptance = "satisfies the stated next step without introducing errors".to_string();
    }
    (next_step.trim().to_string(), acceptance.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::domain::ParsedArtifacts;

    fn ok(text: &str) -> Result<Response, BackendError> {
        Ok(Response {
            text: text.to_string(),
            exit_status: 0,
            has_error: false,
            parsed_artifacts: ParsedArtifacts::default(),
            backend_session_token: None,
        })
    }

    fn new_coordinator(responses: Vec<Result<Response, BackendError>>) -> (DualAgentCoordinator, tempfile::TempDir) {
        let backend = Arc::new(MockBackend::new(responses));
        let hooks = Arc::new(HookBus::new(64));
        let dir = tempfile::TempDir::new().unwrap();
        let journal = SessionJournal::spawn(dir.path(), hooks.clone());
        let readiness = Arc::new(ReadinessProbe::new(backend.clone()));
        let config = DualAgentConfig {
            quality_gate_threshold: 0.5,
            max_cycles: 3,
            retry_per_step: 1,
            executor_inner_max: 1,
            planner_model_hint: None,
            executor_model_hint: None,
        };
        (DualAgentCoordinator::new(backend, journal, hooks, readiness, config), dir)
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
        let config = DualAgentConfig {
            quality_gate_threshold: 0.5,
            max_cycles: 3,
            retry_per_step: 1,
            executor_inner_max: 1,
            planner_model_hint: None,
            executor_model_hint: None,
        };
        let mut coordinator = DualAgentCoordinator::new(backend, journal.clone(), hooks, readiness, config);

        let task = Task::new("build a feature", "/tmp").with_mode(RunMode::Dual);
        let outcome = coordinator.start(&task).await;
        assert_eq!(outcome.final_state, CoordinatorState::Failed);
        assert!(matches!(outcome.stop_reason, CoordinatorStopReason::ReadinessFailed(_)));
        assert_ne!(outcome.session_id, Uuid::nil());

        let session = journal.load(outcome.session_id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Failed);

        let created = rx.recv().await.unwrap();
        assert_eq!(created.event_type, crate::domain::HookEventType::SessionCreated);
        let completed = rx.recv().await.unwrap();
        assert_eq!(completed.event_type, crate::domain::HookEventType::SessionCompleted);
    }

    #[tokio::test]
    async fn completes_when_planner_declares_done_and_quality_gate_passes() {
        let (mut coordinator, _dir) = new_coordinator(vec![
            ok("Next step: ship it\nAcceptance criteria:\nworks correctly"),
            ok("executed the step successfully, all tests passing"),
            ok("TASK COMPLETED. Review: acceptance criteria met, all tests passing."),
        ]);
        let task = Task::new("build a feature", "/tmp").with_mode(RunMode::Dual);
        let outcome = coordinator.start(&task).await;
        assert_eq!(outcome.final_state, CoordinatorState::Completed);
        assert_eq!(outcome.stop_reason, CoordinatorStopReason::PlannerDeclaredComplete);
        assert_eq!(outcome.planner_iterations, 2);
        assert_eq!(outcome.executor_iterations, 1);
        assert!(outcome.handoff_count >= 3);
    }

    #[tokio::test]
    async fn fails_when_quality_gate_exceeded() {
        let (mut coordinator, _dir) = new_coordinator(vec![
            ok("Next step: ship it\nAcceptance criteria:\nworks correctly"),
            ok("partially done, error: something failed"),
            ok("quality is poor, error: criteria not met"),
            ok("partially done, error: something failed"),
            ok("quality is poor, error: criteria not met"),
        ]);
        let task = Task::new("build a feature", "/tmp").with_mode(RunMode::Dual);
        let outcome = coordinator.start(&task).await;
        assert_eq!(outcome.final_state, CoordinatorState::Failed);
        assert_eq!(outcome.stop_reason, CoordinatorStopReason::QualityGateExceeded);
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind.as_deref(), Some("QualityGateExceeded"));
        assert!(!outcome.recovery_hints.is_empty());
    }

    #[tokio::test]
    async fn completion_outcome_carries_no_error_fields() {
        let (mut coordinator, _dir) = new_coordinator(vec![
            ok("Next step: ship it\nAcceptance criteria:\nworks correctly"),
            ok("executed the step successfully, all tests passing"),
            ok("TASK COMPLETED. Review: acceptance criteria met, all tests passing."),
        ]);
        let task = Task::new("build a feature", "/tmp").with_mode(RunMode::Dual);
        let outcome = coordinator.start(&task).await;
        assert!(outcome.success);
        assert_eq!(outcome.error_kind, None);
        assert!(outcome.recovery_hints.is_empty());
    }

    #[test]
    fn parse_plan_extracts_next_step_and_acceptance_criteria() {
        let (step, criteria) = parse_plan("Next step: write the parser\nAcceptance criteria:\nhandles empty input\nrejects malformed input");
        assert_eq!(step, "Next step: write the parser");
        assert!(criteria.contains("handles empty input"));
    }
}
