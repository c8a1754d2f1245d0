//! Configuration types and loading.
//!
//! Grounded on the teacher's `src/config.rs`: same fallback chain
//! (`--config` path -> project-local dotfile -> user config dir -> defaults),
//! same kebab-case field renames and per-section `Default` impls, `eyre`
//! for load errors, `serde_yaml` for the file format.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration covering every option named in the spec's
/// configuration surface: backend/LLM, the analyzer thresholds, loop
/// bounds, and the observer pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(rename = "loop-defaults")]
    pub loop_defaults: LoopDefaultsConfig,
    pub analyzer: AnalyzerThresholdsConfig,
    #[serde(rename = "dual-agent")]
    pub dual_agent: DualAgentConfig,
    pub pool: PoolConfig,
}

impl Config {
    /// `--config` path, else `.autopilot.yml`, else `~/.config/autopilot/autopilot.yml`, else defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".autopilot.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!("failed to load config from {}: {}", local_config.display(), e),
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("autopilot").join("autopilot.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => tracing::warn!("failed to load config from {}: {}", user_config.display(), e),
                }
            }
        }

        tracing::info!("no config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("failed to parse config file")?;
        tracing::info!("loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// How to invoke the backend (spec.md §4.A).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    #[serde(rename = "command")]
    pub command: String,
    #[serde(rename = "extra-args")]
    pub extra_args: Vec<String>,
    #[serde(rename = "default-model")]
    pub default_model: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            extra_args: Vec::new(),
            default_model: None,
        }
    }
}

/// Defaults for Task fields not set by the caller (spec.md §2 config list).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopDefaultsConfig {
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,
    #[serde(rename = "per-call-timeout-ms")]
    pub per_call_timeout_ms: u64,
    #[serde(rename = "overall-timeout-ms")]
    pub overall_timeout_ms: u64,
    #[serde(rename = "max-consecutive-errors")]
    pub max_consecutive_errors: u32,
    #[serde(rename = "continue-on-error")]
    pub continue_on_error: bool,
}

impl Default for LoopDefaultsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            per_call_timeout_ms: 120_000,
            overall_timeout_ms: 3_600_000,
            max_consecutive_errors: 5,
            continue_on_error: true,
        }
    }
}

/// CompletionAnalyzer thresholds (spec.md §9 open question: this spec
/// introduces these names, 0.7 / 0.85 chosen as conservative defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerThresholdsConfig {
    #[serde(rename = "completion-threshold")]
    pub completion_threshold: f64,
    #[serde(rename = "strong-completion-threshold")]
    pub strong_completion_threshold: f64,
}

impl Default for AnalyzerThresholdsConfig {
    fn default() -> Self {
        Self {
            completion_threshold: 0.7,
            strong_completion_threshold: 0.85,
        }
    }
}

impl From<&AnalyzerThresholdsConfig> for crate::analyzer::AnalyzerConfig {
    fn from(cfg: &AnalyzerThresholdsConfig) -> Self {
        let mut analyzer_config = crate::analyzer::AnalyzerConfig::default();
        analyzer_config.completion_threshold = cfg.completion_threshold;
        analyzer_config.strong_completion_threshold = cfg.strong_completion_threshold;
        analyzer_config
    }
}

/// DualAgentCoordinator bounds (spec.md §4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DualAgentConfig {
    #[serde(rename = "quality-gate-threshold")]
    pub quality_gate_threshold: f64,
    #[serde(rename = "max-cycles")]
    pub max_cycles: u32,
    #[serde(rename = "retry-per-step")]
    pub retry_per_step: u32,
    #[serde(rename = "executor-inner-max")]
    pub executor_inner_max: u32,
    #[serde(rename = "planner-model-hint")]
    pub planner_model_hint: Option<String>,
    #[serde(rename = "executor-model-hint")]
    pub executor_model_hint: Option<String>,
}

impl Default for DualAgentConfig {
    fn default() -> Self {
        Self {
            quality_gate_threshold: 0.7,
            max_cycles: 20,
            retry_per_step: 2,
            executor_inner_max: 3,
            planner_model_hint: None,
            executor_model_hint: None,
        }
    }
}

/// ObserverSessionPool configuration (spec.md §4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    #[serde(rename = "min-connections")]
    pub min_connections: usize,
    #[serde(rename = "max-connections")]
    pub max_connections: usize,
    #[serde(rename = "connection-ttl-ms")]
    pub connection_ttl_ms: u64,
    #[serde(rename = "idle-timeout-ms")]
    pub idle_timeout_ms: u64,
    #[serde(rename = "acquire-timeout-ms")]
    pub acquire_timeout_ms: u64,
    #[serde(rename = "heartbeat-interval-ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(rename = "heartbeat-timeout-ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(rename = "load-balancing-strategy")]
    pub load_balancing_strategy: String,
    #[serde(rename = "enable-backfill")]
    pub enable_backfill: bool,
    #[serde(rename = "backfill-count")]
    pub backfill_count: usize,
    #[serde(rename = "origin-allowlist")]
    pub origin_allowlist: Vec<String>,
    #[serde(rename = "outbound-queue-capacity")]
    pub outbound_queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 2,
            max_connections: 100,
            connection_ttl_ms: 3_600_000,
            idle_timeout_ms: 600_000,
            acquire_timeout_ms: 5_000,
            heartbeat_interval_ms: 15_000,
            heartbeat_timeout_ms: 5_000,
            load_balancing_strategy: "round_robin".to_string(),
            enable_backfill: true,
            backfill_count: 50,
            origin_allowlist: Vec::new(),
            outbound_queue_capacity: 256,
        }
    }
}
