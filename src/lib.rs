//! Autopilot — an autonomous multi-iteration coding assistant driver.
//!
//! A user submits a natural-language engineering task; the system drives an
//! underlying LLM backend through repeated prompt/response iterations until
//! the task is judged complete, surfacing progress over a live observation
//! plane.
//!
//! # Modules
//!
//! - [`domain`] — Task/Session/Iteration/CompletionVerdict/HookEvent/ObserverSession data model.
//! - [`backend`] — the `LlmBackend` port plus a CLI-subprocess implementation.
//! - [`analyzer`] — `CompletionAnalyzer`: pure response-text classification.
//! - [`journal`] — `SessionJournal`: durable append-only iteration log.
//! - [`hooks`] — `HookBus`: in-process typed event fan-out.
//! - [`readiness`] — `ReadinessProbe`: cached backend health classification.
//! - [`autopilot`] — `AutopilotLoop`: the single-role iteration state machine.
//! - [`coordinator`] — `DualAgentCoordinator`: the Planner/Executor handoff protocol.
//! - [`observer`] — `ObserverSessionPool`: bounded observer channel pool with backpressure.
//! - [`config`] — configuration types and loading.
//! - [`cli`] — command-line interface.

pub mod analyzer;
pub mod autopilot;
pub mod backend;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod hooks;
pub mod journal;
pub mod observer;
pub mod readiness;

pub use autopilot::{AutopilotLoop, LoopState, RunOutcome, StopHandle, StopReason};
pub use config::Config;
pub use coordinator::{CoordinatorOutcome, CoordinatorState, CoordinatorStopReason, DualAgentCoordinator};
pub use hooks::{HookBus, HookEmitter};
pub use journal::SessionJournal;
pub use observer::{AdmissionRejection, AdmissionRequest, ObserverHandle, ObserverSessionPool};
pub use readiness::{Readiness, ReadinessClass, ReadinessProbe};
