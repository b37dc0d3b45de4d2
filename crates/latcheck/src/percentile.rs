//! Nearest-rank percentile reference values.
//!
//! The benchmark derives percentiles from its binned histogram by walking
//! buckets until the cumulative count reaches `ceil(p/100 * n)`. The
//! reference here applies the same rank to the raw, sorted samples:
//! `S[max(ceil(p/100 * n) - 1, 0)]`. Interpolating estimators drift from
//! this at the tails and must not be substituted.

use serde::{Deserialize, Serialize};

/// Latency samples (ns) in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortedSamples(Vec<u64>);

impl SortedSamples {
    pub fn new(mut samples: Vec<u64>) -> Self {
        samples.sort_unstable();
        Self(samples)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }
}

impl From<Vec<u64>> for SortedSamples {
    fn from(samples: Vec<u64>) -> Self {
        Self::new(samples)
    }
}

/// The order statistic selected for a percentile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedValue {
    /// 1-based rank, `ceil(p/100 * n)`.
    pub rank: u64,
    /// 0-based index actually used.
    pub index: usize,
    pub value: u64,
}

/// Reference value for `percentile` (in (0, 100]) over `samples`.
///
/// Returns `None` for an empty sample set.
pub fn nearest_rank(samples: &SortedSamples, percentile: f64) -> Option<RankedValue> {
    let n = samples.len();
    if n == 0 {
        return None;
    }
    let rank = (percentile / 100.0 * n as f64).ceil();
    let rank = if rank > 0.0 { rank as u64 } else { 0 };
    let index = (rank.saturating_sub(1) as usize).min(n - 1);
    Some(RankedValue {
        rank,
        index,
        value: samples.as_slice()[index],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn one_to_hundred() -> SortedSamples {
        SortedSamples::new((1..=100).collect())
    }

    #[test]
    fn p99_of_one_to_hundred() {
        let ranked = nearest_rank(&one_to_hundred(), 99.0).unwrap();
        assert_eq!(ranked.rank, 99);
        assert_eq!(ranked.index, 98);
        assert_eq!(ranked.value, 99);
    }

    #[test]
    fn p100_is_maximum() {
        let ranked = nearest_rank(&one_to_hundred(), 100.0).unwrap();
        assert_eq!(ranked.value, 100);
        assert_eq!(ranked.index, 99);
    }

    #[test]
    fn tiny_percentile_clamps_to_first() {
        let samples = SortedSamples::new(vec![7, 3, 9]);
        let ranked = nearest_rank(&samples, 0.000001).unwrap();
        assert_eq!(ranked.rank, 1);
        assert_eq!(ranked.index, 0);
        assert_eq!(ranked.value, 3);
    }

    #[test]
    fn rounds_rank_up() {
        // 50% of 5 samples = 2.5 -> rank 3
        let samples = SortedSamples::new(vec![50, 10, 40, 20, 30]);
        let ranked = nearest_rank(&samples, 50.0).unwrap();
        assert_eq!(ranked.rank, 3);
        assert_eq!(ranked.value, 30);
    }

    #[test]
    fn tail_percentile_differs_from_interpolation() {
        // 99.9% of 10 samples = 9.99 -> rank 10, the maximum; an
        // interpolating estimator would land between the last two values.
        let samples = SortedSamples::new((1..=10).map(|v| v * 100).collect());
        let ranked = nearest_rank(&samples, 99.9).unwrap();
        assert_eq!(ranked.value, 1000);
    }

    #[test]
    fn empty_samples_have_no_reference() {
        assert!(nearest_rank(&SortedSamples::default(), 50.0).is_none());
    }

    #[test]
    fn sorted_samples_sort_on_construction() {
        let samples: SortedSamples = vec![3, 1, 2].into();
        assert_eq!(samples.as_slice(), &[1, 2, 3]);
    }

    proptest! {
        #[test]
        fn matches_rank_formula(
            mut values in prop::collection::vec(0u64..1_000_000, 1..500),
            p in 0.0001f64..=100.0,
        ) {
            let samples = SortedSamples::new(values.clone());
            values.sort_unstable();
            let n = values.len();
            let rank = (p / 100.0 * n as f64).ceil() as usize;
            let expected = values[rank.saturating_sub(1).min(n - 1)];
            let ranked = nearest_rank(&samples, p).unwrap();
            prop_assert_eq!(ranked.value, expected);
            prop_assert!(ranked.index < n);
        }

        #[test]
        fn reference_is_a_sample(
            values in prop::collection::vec(0u64..10_000, 1..200),
            p in 0.01f64..=100.0,
        ) {
            let samples = SortedSamples::new(values.clone());
            let ranked = nearest_rank(&samples, p).unwrap();
            prop_assert!(values.contains(&ranked.value));
        }
    }
}
