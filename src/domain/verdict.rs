//! CompletionAnalyzer output type.

use serde::{Deserialize, Serialize};

/// Output of the CompletionAnalyzer for a single Response (spec.md §3/§4.C).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionVerdict {
    pub is_complete: bool,
    pub confidence: f64,
    pub continuation_needed: bool,
    pub quality_score: f64,
    pub detected_patterns: Vec<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub suggested_next_action: Option<String>,
}

impl CompletionVerdict {
    /// The AnalyzerInternal safe default (spec.md §7): continue, low confidence.
    pub fn analyzer_internal_default() -> Self {
        Self {
            is_complete: false,
            confidence: 0.3,
            continuation_needed: true,
            quality_score: 0.0,
            detected_patterns: Vec::new(),
            reason: Some("analyzer threw unexpectedly; using safe default".to_string()),
            suggested_next_action: None,
        }
    }
}
