//! Relative-error comparison against the bucketing bound.
//!
//! Latencies are stored in logarithmic buckets: samples are grouped by
//! their most significant bit and the next `PLAT_BITS` bits index the
//! bucket within the group. Representing a bucket by the mean of its range
//! bounds the proportional error by `1 / 2^(PLAT_BITS + 1)`.

use serde::{Deserialize, Serialize};

/// Index bits per bucket group in the benchmark's latency histogram.
pub const PLAT_BITS: u32 = 6;

/// Largest proportional error a binned value may carry (1/128).
pub const MAX_RELATIVE_ERROR: f64 = 1.0 / (1u64 << (PLAT_BITS + 1)) as f64;

/// Outcome of comparing a binned estimate with an exact value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Comparison {
    /// `|estimate - actual| / actual <= MAX_RELATIVE_ERROR`, or both zero.
    Within { delta: f64 },
    /// Relative error exceeds the bound.
    Exceeds { delta: f64 },
    /// `actual` is zero while `estimate` is not; relative error is undefined.
    Undefined,
}

impl Comparison {
    pub fn is_within(self) -> bool {
        matches!(self, Self::Within { .. })
    }
}

/// Proportional error of `estimate` relative to `actual`.
///
/// `None` when `actual` is zero.
pub fn relative_error(estimate: u64, actual: u64) -> Option<f64> {
    if actual == 0 {
        return None;
    }
    Some(estimate.abs_diff(actual) as f64 / actual as f64)
}

/// Compare a reported (binned) value against a reference value.
pub fn compare(estimate: u64, actual: u64) -> Comparison {
    match relative_error(estimate, actual) {
        None if estimate == 0 => Comparison::Within { delta: 0.0 },
        None => Comparison::Undefined,
        Some(delta) if delta <= MAX_RELATIVE_ERROR => Comparison::Within { delta },
        Some(delta) => Comparison::Exceeds { delta },
    }
}

/// Shorthand for `compare(estimate, actual).is_within()`.
pub fn similar(estimate: u64, actual: u64) -> bool {
    compare(estimate, actual).is_within()
}
