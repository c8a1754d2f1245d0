//! CompletionAnalyzer (spec.md §4.C) — a pure, deterministic classifier:
//! response text + context -> CompletionVerdict. No I/O.
//!
//! No close teacher analog exists for this component (the Rule-of-Five
//! protocol in the teacher's `src/validation/rule_of_five.rs` is a
//! human-plan-review convergence loop, not a text classifier); authored
//! fresh using the `regex` crate already in the teacher's dependency stack.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::domain::{CompletionVerdict, Response};

/// Thresholds that tune the analyzer's stop/continue decision (spec.md §9
/// open question: this spec introduces these names, defaults left to the
/// implementer — 0.7 / 0.85 chosen as conservative values).
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerConfig {
    pub completion_threshold: f64,
    pub strong_completion_threshold: f64,
    /// Minimum response length (chars) to be considered "substantive".
    pub substantive_length_floor: usize,
    /// Duration above which a small quality penalty applies.
    pub slow_duration_ms: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            completion_threshold: 0.7,
            strong_completion_threshold: 0.85,
            substantive_length_floor: 40,
            slow_duration_ms: 60_000,
        }
    }
}

/// One of the five semantic pattern families scanned for (spec.md §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternFamily {
    ExplicitCompletion,
    TaskPending,
    ErrorNeedsFixing,
    ClarificationNeeded,
    IterativeImprovement,
}

impl PatternFamily {
    fn name(self) -> &'static str {
        match self {
            PatternFamily::ExplicitCompletion => "explicit_completion",
            PatternFamily::TaskPending => "task_pending",
            PatternFamily::ErrorNeedsFixing => "error_needs_fixing",
            PatternFamily::ClarificationNeeded => "clarification_needed",
            PatternFamily::IterativeImprovement => "iterative_improvement",
        }
    }

    /// Fixed weight, descending in the order listed in spec.md §4.C.
    fn weight(self) -> f64 {
        match self {
            PatternFamily::ExplicitCompletion => 0.5,
            PatternFamily::TaskPending => 0.3,
            PatternFamily::ErrorNeedsFixing => 0.25,
            PatternFamily::ClarificationNeeded => 0.2,
            PatternFamily::IterativeImprovement => 0.1,
        }
    }
}

struct FamilyMatch {
    family: PatternFamily,
    match_count: usize,
    evidence: Vec<String>,
}

impl FamilyMatch {
    fn is_strong(&self) -> bool {
        self.match_count >= 2
    }

    fn present(&self) -> bool {
        self.match_count > 0
    }
}

static EXPLICIT_COMPLETION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(task completed|done\.|finished|all tests pass(ing)?|successfully completed|implementation complete)\b").unwrap()
});
static TASK_PENDING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(next step|next,? i will|todo|still need to|remaining work|not yet done|i will now)\b").unwrap()
});
static ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(error|exception|failed|failure|traceback|panic(ked)?|stack trace)\b").unwrap()
});
static CLARIFICATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(could you clarify|which (one|approach)|do you want|should i|can you confirm)\b\??").unwrap()
});
static ITERATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(improve|optimi[sz]e|refactor|clean ?up|polish|could be better)\b").unwrap()
});

fn scan(family: PatternFamily, re: &Regex, text: &str) -> FamilyMatch {
    let evidence: Vec<String> = re
        .find_iter(text)
        .take(5)
        .map(|m| m.as_str().to_string())
        .collect();
    FamilyMatch {
        family,
        match_count: evidence.len(),
        evidence,
    }
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// Analyze one Response in the context of a running Session.
///
/// `iteration_n` and `max_iterations` drive the tie-break rule (prefer
/// continuation unless one iteration remains).
pub fn analyze(
    response: &Response,
    duration_ms: u64,
    iteration_n: u32,
    max_iterations: u32,
    config: &AnalyzerConfig,
) -> CompletionVerdict {
    debug!(iteration_n, max_iterations, "analyzer::analyze: called");

    let text = response.text.as_str();
    let has_error_status = response.exit_status != 0 || response.has_error;

    let families = [
        scan(PatternFamily::ExplicitCompletion, &EXPLICIT_COMPLETION_RE, text),
        scan(PatternFamily::TaskPending, &TASK_PENDING_RE, text),
        scan(PatternFamily::ErrorNeedsFixing, &ERROR_RE, text),
        scan(PatternFamily::ClarificationNeeded, &CLARIFICATION_RE, text),
        scan(PatternFamily::IterativeImprovement, &ITERATIVE_RE, text),
    ];

    let explicit = &families[0];
    let pending = &families[1];
    let mut error_match = FamilyMatch {
        family: PatternFamily::ErrorNeedsFixing,
        match_count: families[2].match_count,
        evidence: families[2].evidence.clone(),
    };
    if has_error_status && error_match.match_count == 0 {
        error_match.match_count = 1;
        error_match.evidence.push(format!("exitStatus={}", response.exit_status));
    }
    let clarification = &families[3];
    let iterative = &families[4];

    let substantive = text.trim().len() > config.substantive_length_floor;

    // Step 2: confidence — weighted linear combination, centered at 0.5
    // when nothing fires but the text is substantive. Each family's weight
    // scales how many tenths of a point one match is worth; explicit
    // completion (weight 0.5) needs only a single match to clear
    // `completion_threshold` on its own.
    let any_fired = explicit.present() || pending.present() || error_match.present() || clarification.present();
    let mut confidence = if !any_fired {
        if substantive { 0.5 } else { 0.3 }
    } else {
        0.5 + explicit.match_count as f64 * explicit.family.weight() * 0.5
            - pending.match_count as f64 * pending.family.weight() * 0.5
            - error_match.match_count as f64 * error_match.family.weight() * 0.5
            - clarification.match_count as f64 * clarification.family.weight() * 0.5
    };
    confidence = clamp01(confidence);

    // Step 3: quality score.
    let mut quality = 0.7;
    if has_error_status || error_match.present() {
        quality -= 0.3;
    }
    if text.trim().len() < 10 {
        quality -= 0.2;
    } else if substantive {
        quality += 0.1;
    }
    if explicit.present() {
        quality += 0.1 * explicit.match_count.min(2) as f64;
    }
    if duration_ms > config.slow_duration_ms {
        quality -= 0.05;
    }
    quality = clamp01(quality);

    // Step 4: continuation decision. Continue if any of: error present,
    // task_pending strong, clarification strong, or confidence below
    // `completion_threshold`. Stop if explicit_completion is strong AND
    // confidence exceeds `strong_completion_threshold` — this override
    // fires regardless of the continue conditions above, since a decisive
    // explicit-completion signal at high confidence outweighs a stray
    // error/pending/clarification match in the same response.
    let error_present = has_error_status || error_match.present();
    let pending_strong = pending.is_strong();
    let clarification_strong = clarification.is_strong();

    let strong_override = explicit.is_strong() && confidence > config.strong_completion_threshold;

    let mut is_complete = strong_override
        || (explicit.present()
            && !error_present
            && !pending_strong
            && !clarification_strong
            && confidence >= config.completion_threshold);

    let mut continuation_needed =
        !is_complete && (error_present || pending_strong || clarification_strong || confidence < config.completion_threshold);

    // Step 5: tie-break. In ambiguity prefer continuation, unless one
    // iteration remains, where stopping is preferred to preserve a final
    // wrap-up iteration.
    let ambiguous = !is_complete && !error_present && !pending_strong && !clarification_strong;
    if ambiguous && iteration_n + 1 == max_iterations {
        debug!("analyzer::analyze: tie-break favors stopping, one iteration remains");
        continuation_needed = false;
        is_complete = true;
    }

    let mut detected_patterns = Vec::new();
    for family_match in [&error_match, explicit, pending, clarification, iterative] {
        if family_match.present() {
            detected_patterns.push(family_match.family.name().to_string());
        }
    }

    let reason = if is_complete {
        Some("explicit completion detected with high confidence".to_string())
    } else if error_present {
        Some("error pattern or non-zero exit status present".to_string())
    } else if pending_strong {
        Some("task-pending language detected".to_string())
    } else if clarification_strong {
        Some("clarification requested".to_string())
    } else {
        None
    };

    CompletionVerdict {
        is_complete,
        confidence,
        continuation_needed,
        quality_score: quality,
        detected_patterns,
        reason,
        suggested_next_action: iterative
            .present()
            .then(|| "consider an iterative-improvement pass".to_string()),
    }
}

/// Calls `analyze`, catching a panic inside the classifier and falling back
/// to `CompletionVerdict::analyzer_internal_default()` (spec.md §7's
/// `AnalyzerInternal` recovery path) instead of taking the whole run down.
pub fn analyze_guarded(
    response: &Response,
    duration_ms: u64,
    iteration_n: u32,
    max_iterations: u32,
    config: &AnalyzerConfig,
) -> CompletionVerdict {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        analyze(response, duration_ms, iteration_n, max_iterations, config)
    }));
    match result {
        Ok(verdict) => verdict,
        Err(_) => {
            tracing::warn!(iteration_n, "analyzer::analyze panicked, using AnalyzerInternal safe default");
            CompletionVerdict::analyzer_internal_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParsedArtifacts;

    fn response(text: &str, exit_status: i32) -> Response {
        Response {
            text: text.to_string(),
            exit_status,
            has_error: exit_status != 0,
            parsed_artifacts: ParsedArtifacts::default(),
            backend_session_token: None,
        }
    }

    #[test]
    fn explicit_completion_yields_high_confidence_stop() {
        let verdict = analyze(&response("11. TASK COMPLETED", 0), 500, 1, 3, &AnalyzerConfig::default());
        assert!(verdict.is_complete);
        assert!(!verdict.continuation_needed);
        assert!(verdict.confidence >= 0.5);
    }

    #[test]
    fn guarded_matches_unguarded_on_a_normal_response() {
        let verdict = analyze_guarded(&response("11. TASK COMPLETED", 0), 500, 1, 3, &AnalyzerConfig::default());
        assert!(verdict.is_complete);
        assert!(!verdict.continuation_needed);
    }

    #[test]
    fn empty_response_with_zero_exit_is_low_confidence_continue() {
        let verdict = analyze(&response("", 0), 10, 1, 5, &AnalyzerConfig::default());
        assert!(verdict.continuation_needed);
        assert!(verdict.confidence < 0.7);
    }

    #[test]
    fn error_only_response_flags_error_pattern_and_continues() {
        let verdict = analyze(
            &response("Traceback: error: something failed", 1),
            200,
            1,
            5,
            &AnalyzerConfig::default(),
        );
        assert!(verdict.detected_patterns.contains(&"error_needs_fixing".to_string()));
        assert!(verdict.continuation_needed);
    }

    #[test]
    fn clarification_question_is_detected() {
        let verdict = analyze(
            &response("Could you clarify which approach you want?", 0),
            200,
            1,
            5,
            &AnalyzerConfig::default(),
        );
        assert!(verdict.detected_patterns.contains(&"clarification_needed".to_string()));
    }

    #[test]
    fn strong_explicit_completion_overrides_stray_error_pattern() {
        let verdict = analyze(
            &response(
                "All tests passing. Task completed. There was an error earlier but it's fixed now, implementation complete.",
                0,
            ),
            500,
            1,
            5,
            &AnalyzerConfig::default(),
        );
        assert!(verdict.is_complete);
        assert!(!verdict.continuation_needed);
        assert!(verdict.confidence > AnalyzerConfig::default().strong_completion_threshold);
    }

    #[test]
    fn weak_explicit_completion_does_not_override_error_pattern() {
        let verdict = analyze(&response("Done. Hit an error along the way.", 0), 500, 1, 5, &AnalyzerConfig::default());
        assert!(!verdict.is_complete);
        assert!(verdict.continuation_needed);
    }

    #[test]
    fn tie_break_prefers_stopping_on_last_iteration_when_ambiguous() {
        let verdict = analyze(&response("Working on it, making progress.", 0), 500, 4, 5, &AnalyzerConfig::default());
        assert!(verdict.is_complete);
        assert!(!verdict.continuation_needed);
    }

    #[test]
    fn tie_break_prefers_continuation_when_not_last_iteration() {
        let verdict = analyze(&response("Working on it, making progress.", 0), 500, 1, 5, &AnalyzerConfig::default());
        assert!(verdict.continuation_needed);
    }

    #[test]
    fn analyzer_is_deterministic() {
        let r = response("TASK COMPLETED, all tests passing.", 0);
        let a = analyze(&r, 500, 1, 3, &AnalyzerConfig::default());
        let b = analyze(&r, 500, 1, 3, &AnalyzerConfig::default());
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.is_complete, b.is_complete);
    }
}
