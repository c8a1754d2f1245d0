//! Property tests for the CompletionAnalyzer's pure text classification.

use autopilot::analyzer::{analyze, AnalyzerConfig};
use autopilot::domain::{ParsedArtifacts, Response};
use proptest::prelude::*;

fn response(text: String, exit_status: i32) -> Response {
    Response {
        text,
        exit_status,
        has_error: exit_status != 0,
        parsed_artifacts: ParsedArtifacts::default(),
        backend_session_token: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn confidence_and_quality_stay_in_unit_range(
        text in ".{0,500}",
        exit_status in 0i32..2,
        duration_ms in 0u64..120_000,
        iteration_n in 1u32..10,
        max_iterations in 1u32..10,
    ) {
        let verdict = analyze(&response(text, exit_status), duration_ms, iteration_n, max_iterations, &AnalyzerConfig::default());
        prop_assert!((0.0..=1.0).contains(&verdict.confidence));
        prop_assert!((0.0..=1.0).contains(&verdict.quality_score));
    }

    #[test]
    fn completion_never_coexists_with_continuation(
        text in ".{0,500}",
        exit_status in 0i32..2,
        iteration_n in 1u32..10,
        max_iterations in 1u32..10,
    ) {
        let verdict = analyze(&response(text, exit_status), 0, iteration_n, max_iterations, &AnalyzerConfig::default());
        prop_assert!(!(verdict.is_complete && verdict.continuation_needed));
    }
}
