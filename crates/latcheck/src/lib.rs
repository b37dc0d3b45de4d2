#![forbid(unsafe_code)]
//! Cross-format consistency checks for benchmark latency percentiles.
//!
//! Reported percentiles are recomputed from the raw per-I/O latency logs,
//! histograms are checked against the reported extrema and sample counts,
//! and the condensed report line is compared with the structured report.

pub mod cross_encoding;
pub mod direction;
pub mod findings;
pub mod histogram;
pub mod percentile;
pub mod report;
pub mod runner;
pub mod samples;
pub mod scenario;
pub mod sections;
pub mod tolerance;

pub use findings::{Finding, FindingCode, VERDICT_FAIL, VERDICT_PASS, VERDICT_SKIP};
pub use scenario::{
    ParseOptions, Scenario, ScenarioArtifacts, ScenarioOutcome, builtin_scenarios,
    evaluate_scenario, find_scenario,
};

/// Install a test-writer tracing subscriber; safe to call repeatedly.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
