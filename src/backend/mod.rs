//! LLMBackend port (spec.md §4.A) — the abstract one-shot `Execute` +
//! readiness-probe interface the rest of the system drives, plus a concrete
//! CLI-subprocess implementation.

mod cli_process;
mod error;
mod port;
mod types;

pub use cli_process::CliProcessBackend;
pub use error::BackendError;
pub use port::LlmBackend;
#[cfg(test)]
pub use port::mock;
pub use types::{ExecOpts, ExecResult, ReadinessStatus};
