//! JSON+ histogram self-consistency.
//!
//! Three independent checks, always all evaluated: the smallest bucket
//! against the reported minimum, the largest bucket against the reported
//! maximum (both within the bucketing bound), and the bucket count total
//! against the reported sample count (exact).

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::findings::{Finding, FindingCode};
use crate::report::HistogramTable;
use crate::tolerance::{Comparison, compare};

/// Which histogram checks failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramVerdict {
    pub min_ok: bool,
    pub max_ok: bool,
    pub count_ok: bool,
    pub findings: Vec<Finding>,
}

impl HistogramVerdict {
    pub fn passed(&self) -> bool {
        self.min_ok && self.max_ok && self.count_ok
    }
}

fn bound_check(
    label: &str,
    reported: u64,
    bucket: Option<u64>,
    expected_count: u64,
    findings: &mut Vec<Finding>,
) -> bool {
    let Some(bucket) = bucket else {
        if expected_count == 0 {
            return true;
        }
        findings.push(Finding::new(
            FindingCode::HistogramInconsistency,
            format!("reported {label} {reported} but the histogram has no buckets"),
        ));
        return false;
    };
    match compare(reported, bucket) {
        Comparison::Within { .. } => true,
        Comparison::Exceeds { delta } => {
            findings.push(Finding::new(
                FindingCode::HistogramInconsistency,
                format!(
                    "reported {label} {reported} does not match histogram {label} {bucket} (proportional delta {delta:.6})"
                ),
            ));
            false
        }
        Comparison::Undefined => {
            findings.push(Finding::new(
                FindingCode::UndefinedComparison,
                format!("reported {label} {reported} cannot be compared with a zero-valued bucket"),
            ));
            false
        }
    }
}

/// Check a histogram against the reported `min`, `max` and sample count.
pub fn check_histogram(
    table: &HistogramTable,
    min: u64,
    max: u64,
    sample_count: u64,
) -> HistogramVerdict {
    let mut findings = Vec::new();

    let min_ok = bound_check("min", min, table.smallest_bucket(), sample_count, &mut findings);
    let max_ok = bound_check("max", max, table.largest_bucket(), sample_count, &mut findings);

    let total = table.total_count();
    let count_ok = total == sample_count;
    if !count_ok {
        findings.push(Finding::new(
            FindingCode::HistogramInconsistency,
            format!(
                "reported sample size {sample_count} does not match histogram total count {total}"
            ),
        ));
    }

    for finding in &findings {
        warn!(code = %finding.code, "{}", finding.message);
    }

    HistogramVerdict {
        min_ok,
        max_ok,
        count_ok,
        findings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::has_code;
    use proptest::prelude::*;

    fn table() -> HistogramTable {
        [(100, 5), (200, 3), (300, 2)].into_iter().collect()
    }

    #[test]
    fn consistent_table_passes() {
        let verdict = check_histogram(&table(), 100, 300, 10);
        assert!(verdict.passed());
        assert!(verdict.findings.is_empty());
    }

    #[test]
    fn count_mismatch_fails_alone() {
        let verdict = check_histogram(&table(), 100, 300, 9);
        assert!(!verdict.passed());
        assert!(verdict.min_ok);
        assert!(verdict.max_ok);
        assert!(!verdict.count_ok);
        assert_eq!(verdict.findings.len(), 1);
        assert!(has_code(&verdict.findings, FindingCode::HistogramInconsistency));
    }

    #[test]
    fn all_three_failures_are_reported() {
        let verdict = check_histogram(&table(), 50, 900, 1);
        assert!(!verdict.min_ok);
        assert!(!verdict.max_ok);
        assert!(!verdict.count_ok);
        assert_eq!(verdict.findings.len(), 3);
    }

    #[test]
    fn min_outside_bucket_error_fails() {
        // 101 vs bucket 100 is 1%; 301 vs 300 stays under 1/128.
        let verdict = check_histogram(&table(), 101, 301, 10);
        assert!(!verdict.min_ok);
        assert!(verdict.max_ok);
    }

    #[test]
    fn empty_table_with_zero_samples_passes() {
        let verdict = check_histogram(&HistogramTable::default(), 0, 0, 0);
        assert!(verdict.passed());
    }

    #[test]
    fn empty_table_with_samples_fails_everything() {
        let verdict = check_histogram(&HistogramTable::default(), 10, 20, 4);
        assert!(!verdict.min_ok);
        assert!(!verdict.max_ok);
        assert!(!verdict.count_ok);
    }

    #[test]
    fn zero_bucket_with_nonzero_min_is_undefined() {
        let table: HistogramTable = [(0, 1), (10, 1)].into_iter().collect();
        let verdict = check_histogram(&table, 3, 10, 2);
        assert!(!verdict.min_ok);
        assert!(has_code(&verdict.findings, FindingCode::UndefinedComparison));
    }

    /// Truncate to 8 significant bits: within 1/128 of the sample.
    fn bucket_of(value: u64) -> u64 {
        let bits = 64 - value.leading_zeros();
        if bits <= 8 {
            value
        } else {
            let shift = bits - 8;
            (value >> shift) << shift
        }
    }

    fn partition(samples: &[u64]) -> HistogramTable {
        samples.iter().map(|v| (bucket_of(*v), 1)).collect()
    }

    proptest! {
        #[test]
        fn partitioned_samples_are_consistent(
            samples in proptest::collection::vec(1u64..50_000_000, 1..300)
        ) {
            let min = *samples.iter().min().unwrap();
            let max = *samples.iter().max().unwrap();
            let n = samples.len() as u64;
            let verdict = check_histogram(&partition(&samples), min, max, n);
            prop_assert!(verdict.passed(), "{:?}", verdict.findings);
        }

        #[test]
        fn wrong_sample_count_fails_count_only(
            samples in proptest::collection::vec(1u64..50_000_000, 1..300),
            extra in 1u64..1000,
        ) {
            let min = *samples.iter().min().unwrap();
            let max = *samples.iter().max().unwrap();
            let n = samples.len() as u64;
            let table = partition(&samples);
            for wrong in [n + extra, n - 1] {
                let verdict = check_histogram(&table, min, max, wrong);
                prop_assert!(verdict.min_ok);
                prop_assert!(verdict.max_ok);
                prop_assert!(!verdict.count_ok);
            }
        }
    }
}
