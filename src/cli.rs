//! CLI command definitions and subcommands.
//!
//! The flag surface itself is explicitly out of scope (spec.md §1); this is
//! the minimal front end needed to drive AutopilotLoop/DualAgentCoordinator
//! from a terminal, kept in the teacher's `clap::Parser` + `Subcommand` shape.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Autonomous multi-iteration coding assistant driver.
#[derive(Parser)]
#[command(name = "autopilot", about = "Drives an LLM backend through iterations until a task is complete", version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true, help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a task to completion
    Run {
        /// Natural-language task description
        task: String,

        /// Working directory the backend operates in (defaults to cwd)
        #[arg(short = 'd', long)]
        working_directory: Option<PathBuf>,

        /// Use the Planner/Executor dual-agent protocol instead of a single loop
        #[arg(long)]
        dual_agent: bool,

        /// Override the configured max iterations (or max cycles, in dual-agent mode)
        #[arg(short, long)]
        max_iterations: Option<u32>,
    },

    /// List past sessions recorded in the journal
    Sessions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_defaults() {
        let cli = Cli::parse_from(["autopilot", "run", "fix the bug"]);
        match cli.command {
            Some(Command::Run {
                task,
                dual_agent,
                max_iterations,
                ..
            }) => {
                assert_eq!(task, "fix the bug");
                assert!(!dual_agent);
                assert!(max_iterations.is_none());
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn parses_run_with_dual_agent_and_max_iterations() {
        let cli = Cli::parse_from(["autopilot", "run", "build a feature", "--dual-agent", "--max-iterations", "5"]);
        match cli.command {
            Some(Command::Run {
                dual_agent,
                max_iterations,
                ..
            }) => {
                assert!(dual_agent);
                assert_eq!(max_iterations, Some(5));
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn parses_sessions_command() {
        let cli = Cli::parse_from(["autopilot", "sessions"]);
        assert!(matches!(cli.command, Some(Command::Sessions)));
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["autopilot", "-c", "/tmp/autopilot.yml", "sessions"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/autopilot.yml")));
    }
}
