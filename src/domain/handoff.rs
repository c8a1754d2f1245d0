//! DualAgentCoordinator handoff record.

use serde::{Deserialize, Serialize};

use super::session::Role;

/// One role transition within a dual-agent cycle (spec.md §3, §4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRecord {
    pub from: Role,
    pub to: Role,
    pub cycle: u32,
    pub rationale: String,
    pub quality_gate_passed: bool,
}
