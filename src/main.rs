//! Autopilot — CLI entry point for the autonomous multi-iteration coding
//! assistant driver.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use autopilot::backend::{CliProcessBackend, LlmBackend};
use autopilot::cli::{Cli, Command};
use autopilot::config::Config;
use autopilot::coordinator::DualAgentCoordinator;
use autopilot::domain::{RunMode, Task};
use autopilot::hooks::HookBus;
use autopilot::journal::SessionJournal;
use autopilot::observer::ObserverSessionPool;
use autopilot::readiness::ReadinessProbe;
use autopilot::{AutopilotLoop, StopHandle};

/// Environment variable the bundled `CliProcessBackend` checks for auth
/// readiness (spec.md §4.A probe_readiness contract).
const BACKEND_AUTH_ENV_VAR: &str = "ANTHROPIC_API_KEY";

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("autopilot").join("logs");
    fs::create_dir_all(&log_dir).context("failed to create log directory")?;

    let level = match cli_log_level.map(|s| s.to_uppercase()) {
        Some(s) if s == "TRACE" => tracing::Level::TRACE,
        Some(s) if s == "DEBUG" => tracing::Level::DEBUG,
        Some(s) if s == "INFO" => tracing::Level::INFO,
        Some(s) if s == "WARN" || s == "WARNING" => tracing::Level::WARN,
        Some(s) if s == "ERROR" => tracing::Level::ERROR,
        Some(s) => {
            eprintln!("Warning: unknown log level '{s}', defaulting to INFO");
            tracing::Level::INFO
        }
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("autopilot.log")).context("failed to create log file")?;
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!(?level, "logging initialized");
    Ok(())
}

fn sessions_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("autopilot").join("sessions")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level.as_deref()).context("failed to set up logging")?;

    let config = Config::load(cli.config.as_ref()).context("failed to load configuration")?;
    info!(backend = %config.backend.command, "autopilot: loaded config");

    match cli.command {
        Some(Command::Run {
            task,
            working_directory,
            dual_agent,
            max_iterations,
        }) => run(config, task, working_directory, dual_agent, max_iterations).await,
        Some(Command::Sessions) => list_sessions(config).await,
        None => {
            eprintln!("no command given; try `autopilot run \"<task>\"` or `autopilot sessions`");
            Ok(())
        }
    }
}

fn build_backend(config: &Config) -> Arc<dyn LlmBackend> {
    Arc::new(
        CliProcessBackend::new(config.backend.command.clone(), BACKEND_AUTH_ENV_VAR)
            .with_extra_args(config.backend.extra_args.clone()),
    )
}

async fn run(
    config: Config,
    task_prompt: String,
    working_directory: Option<PathBuf>,
    dual_agent: bool,
    max_iterations: Option<u32>,
) -> Result<()> {
    let backend = build_backend(&config);
    let hooks = Arc::new(HookBus::default());
    let journal = SessionJournal::spawn(sessions_dir(), hooks.clone());
    let readiness = Arc::new(ReadinessProbe::new(backend.clone()));

    let pool = ObserverSessionPool::new(hooks.clone(), journal.clone(), config.pool.clone());
    pool.spawn_fanout();

    let working_directory = working_directory.unwrap_or(std::env::current_dir().context("failed to read cwd")?);
    let mut task = Task::new(task_prompt, working_directory)
        .with_mode(if dual_agent { RunMode::Dual } else { RunMode::Single })
        .with_per_call_timeout_ms(config.loop_defaults.per_call_timeout_ms)
        .with_overall_timeout_ms(config.loop_defaults.overall_timeout_ms)
        .with_continue_on_error(config.loop_defaults.continue_on_error)
        .with_max_consecutive_errors(config.loop_defaults.max_consecutive_errors);
    if let Some(n) = max_iterations {
        task = task.with_max_iterations(n);
    } else if !dual_agent {
        task = task.with_max_iterations(config.loop_defaults.max_iterations);
    }
    if let Err(e) = task.validate() {
        eprintln!("invalid task: {e}");
        return Ok(());
    }

    let analyzer_config = (&config.analyzer).into();

    if dual_agent {
        let mut dual_config = config.dual_agent.clone();
        if let Some(n) = max_iterations {
            dual_config.max_cycles = n;
        }
        let mut coordinator = DualAgentCoordinator::new(backend, journal, hooks, readiness, dual_config).with_analyzer_config(analyzer_config);
        let outcome = coordinator.start(&task).await;
        println!(
            "session {} -> {:?} ({:?}), {} handoffs, {} planner / {} executor iterations",
            outcome.session_id, outcome.final_state, outcome.stop_reason, outcome.handoff_count, outcome.planner_iterations, outcome.executor_iterations
        );
        if !outcome.success {
            println!(
                "{{\"success\":false,\"errorKind\":{:?},\"message\":{:?},\"recoveryHints\":{:?}}}",
                outcome.error_kind, outcome.message, outcome.recovery_hints
            );
        }
    } else {
        let mut autopilot = AutopilotLoop::new(backend, journal, hooks, readiness).with_analyzer_config(analyzer_config);
        let outcome = autopilot.start(&task, &StopHandle::new()).await;
        println!(
            "session {} -> {:?} ({:?}) after {} iterations",
            outcome.session_id, outcome.final_state, outcome.stop_reason, outcome.iterations_run
        );
        if !outcome.success {
            println!(
                "{{\"success\":false,\"errorKind\":{:?},\"message\":{:?},\"recoveryHints\":{:?}}}",
                outcome.error_kind, outcome.message, outcome.recovery_hints
            );
        }
    }

    Ok(())
}

async fn list_sessions(_config: Config) -> Result<()> {
    let hooks = Arc::new(HookBus::default());
    let journal = SessionJournal::spawn(sessions_dir(), hooks);
    let summaries = journal.list().await.map_err(|e| eyre::eyre!(e.to_string()))?;
    if summaries.is_empty() {
        println!("no sessions recorded under {}", sessions_dir().display());
        return Ok(());
    }
    for summary in summaries {
        println!(
            "{}  {}  {:?}  {}",
            summary.session_id, summary.started_at, summary.status, summary.first_prompt_excerpt
        );
    }
    Ok(())
}
