//! Per-direction percentile validation.
//!
//! For one data direction and each of slat/clat/lat this gates percentile
//! and histogram presence on the scenario's settings, checks the histogram,
//! cross-checks the reported sample count against the raw latency log, and
//! compares every reported percentile with its nearest-rank reference.
//! Every check runs; failures are collected, never short-circuited.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::findings::{Finding, FindingCode, VERDICT_FAIL, VERDICT_PASS, VERDICT_SKIP};
use crate::histogram::{HistogramVerdict, check_histogram};
use crate::percentile::{SortedSamples, nearest_rank};
use crate::report::{Direction, DirectionSection, LatencyType, LatencyTypeStats, PercentileReport};
use crate::samples::{DirectionFilter, SampleSource};
use crate::tolerance::{Comparison, compare};

/// Report encoding the benchmark was asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// JSON: percentiles only.
    Plain,
    /// JSON+: percentiles plus histogram bins.
    Extended,
}

/// Which latency types have percentile reporting enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledTypes {
    pub slat: bool,
    pub clat: bool,
    pub lat: bool,
}

impl EnabledTypes {
    pub const ALL: Self = Self {
        slat: true,
        clat: true,
        lat: true,
    };

    pub const fn new(slat: bool, clat: bool, lat: bool) -> Self {
        Self { slat, clat, lat }
    }

    pub fn contains(self, lat_type: LatencyType) -> bool {
        match lat_type {
            LatencyType::Slat => self.slat,
            LatencyType::Clat => self.clat,
            LatencyType::Lat => self.lat,
        }
    }
}

/// What to validate for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionCheck {
    pub direction: Direction,
    pub enabled: EnabledTypes,
    pub encoding: Encoding,
    /// Pool all directions' log records instead of filtering by direction.
    pub unified: bool,
}

impl DirectionCheck {
    pub fn filter(&self) -> DirectionFilter {
        DirectionFilter::for_direction(self.direction, self.unified)
    }
}

/// A reported percentile that disagrees with the raw samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileMismatch {
    pub percentile: String,
    pub rank: u64,
    pub index: usize,
    pub reported: u64,
    pub reference: u64,
    /// `None` when the relative error is undefined (zero reference).
    pub delta: Option<f64>,
}

/// Result for one latency type within a direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyTypeReport {
    pub lat_type: LatencyType,
    pub enabled: bool,
    pub status: String,
    pub reported_count: u64,
    pub logged_count: Option<usize>,
    pub percentiles_checked: usize,
    pub histogram: Option<HistogramVerdict>,
    pub mismatches: Vec<PercentileMismatch>,
    pub findings: Vec<Finding>,
}

impl LatencyTypeReport {
    pub fn passed(&self) -> bool {
        self.status != VERDICT_FAIL
    }
}

/// Result for one direction across all three latency types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionReport {
    pub direction: Direction,
    pub verdict: String,
    pub types: Vec<LatencyTypeReport>,
}

impl DirectionReport {
    pub fn passed(&self) -> bool {
        self.verdict == VERDICT_PASS
    }

    /// All findings across latency types, in check order.
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.types.iter().flat_map(|t| t.findings.iter())
    }
}

fn record(findings: &mut Vec<Finding>, code: FindingCode, message: String) {
    warn!(%code, "{message}");
    findings.push(Finding::new(code, message));
}

/// Compare each reported percentile with the nearest-rank reference.
///
/// `samples` must already be sorted; a failing percentile never stops the
/// remaining ones from being checked.
pub fn check_percentiles(
    lat_type: LatencyType,
    ptiles: &PercentileReport,
    samples: &SortedSamples,
    findings: &mut Vec<Finding>,
) -> Vec<PercentileMismatch> {
    let mut mismatches = Vec::new();

    for (label, reported) in ptiles.iter() {
        let Some(ranked) = nearest_rank(samples, label.value()) else {
            record(
                findings,
                FindingCode::UndefinedComparison,
                format!("{lat_type} {label}th percentile reported as {reported} but no latencies were logged"),
            );
            continue;
        };

        let (code, delta) = match compare(reported, ranked.value) {
            Comparison::Within { .. } => continue,
            Comparison::Exceeds { delta } => (FindingCode::ToleranceViolation, Some(delta)),
            Comparison::Undefined => (FindingCode::UndefinedComparison, None),
        };
        let delta_text = delta.map_or_else(|| "undefined".to_string(), |d| format!("{d:.6}"));
        record(
            findings,
            code,
            format!(
                "{lat_type} {label}th percentile: reported {reported}, expected {}, proportional delta {delta_text} (rank {}, index {})",
                ranked.value, ranked.rank, ranked.index
            ),
        );
        mismatches.push(PercentileMismatch {
            percentile: label.to_string(),
            rank: ranked.rank,
            index: ranked.index,
            reported,
            reference: ranked.value,
            delta,
        });
    }

    mismatches
}

fn validate_type(
    lat_type: LatencyType,
    stats: &LatencyTypeStats,
    total_ios: u64,
    check: &DirectionCheck,
    source: &dyn SampleSource,
) -> LatencyTypeReport {
    let enabled = check.enabled.contains(lat_type);
    let reported_count = stats.sample_count_or(total_ios);
    let mut findings = Vec::new();
    let mut report = LatencyTypeReport {
        lat_type,
        enabled,
        status: VERDICT_PASS.to_string(),
        reported_count,
        logged_count: None,
        percentiles_checked: 0,
        histogram: None,
        mismatches: Vec::new(),
        findings: Vec::new(),
    };

    if !enabled {
        if stats.percentile.is_some() {
            record(
                &mut findings,
                FindingCode::EncodingMismatch,
                format!("unexpected {lat_type} percentiles found"),
            );
            report.status = VERDICT_FAIL.to_string();
        } else {
            debug!(%lat_type, "percentiles skipped");
            report.status = VERDICT_SKIP.to_string();
        }
        report.findings = findings;
        return report;
    }

    if stats.percentile.is_none() {
        record(
            &mut findings,
            FindingCode::EncodingMismatch,
            format!("{lat_type} percentiles not found in report"),
        );
    }

    match (check.encoding, stats.bins.as_ref()) {
        (Encoding::Extended, Some(bins)) => {
            let verdict = check_histogram(bins, stats.min, stats.max, reported_count);
            findings.extend(verdict.findings.iter().cloned());
            report.histogram = Some(verdict);
        }
        (Encoding::Extended, None) => record(
            &mut findings,
            FindingCode::EncodingMismatch,
            format!("{lat_type} histogram bins not found with extended encoding"),
        ),
        (Encoding::Plain, Some(_)) => record(
            &mut findings,
            FindingCode::EncodingMismatch,
            format!("{lat_type} histogram bins found with plain encoding"),
        ),
        (Encoding::Plain, None) => {}
    }

    match source.samples(lat_type, check.filter()) {
        Ok(raw) => {
            let samples = SortedSamples::new(raw);
            report.logged_count = Some(samples.len());
            if samples.len() as u64 != reported_count {
                record(
                    &mut findings,
                    FindingCode::SampleCountMismatch,
                    format!(
                        "{lat_type}: reported sample count {reported_count}, latencies logged {}",
                        samples.len()
                    ),
                );
            }
            if let Some(ptiles) = stats.percentile.as_ref() {
                report.percentiles_checked = ptiles.len();
                report.mismatches = check_percentiles(lat_type, ptiles, &samples, &mut findings);
            }
        }
        Err(err) => record(
            &mut findings,
            FindingCode::SampleLogUnreadable,
            format!("{lat_type} latency log unreadable: {err}"),
        ),
    }

    if findings.is_empty() {
        info!(%lat_type, checked = report.percentiles_checked, "percentiles match");
    } else {
        report.status = VERDICT_FAIL.to_string();
    }
    report.findings = findings;
    report
}

/// Validate one direction section against its raw latency logs.
#[instrument(skip(section, source), fields(direction = %check.direction))]
pub fn validate_direction(
    section: &DirectionSection,
    check: &DirectionCheck,
    source: &dyn SampleSource,
) -> DirectionReport {
    let types: Vec<LatencyTypeReport> = LatencyType::all()
        .iter()
        .map(|lat_type| {
            validate_type(
                *lat_type,
                section.stats(*lat_type),
                section.total_ios,
                check,
                source,
            )
        })
        .collect();

    let passed = types.iter().all(LatencyTypeReport::passed);
    info!(
        direction = %check.direction,
        passed,
        "direction validated"
    );

    DirectionReport {
        direction: check.direction,
        verdict: if passed { VERDICT_PASS } else { VERDICT_FAIL }.to_string(),
        types,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::has_code;
    use crate::report::{HistogramTable, PercentileLabel};
    use crate::samples::InMemorySamples;

    fn ptiles(entries: &[(&str, u64)]) -> PercentileReport {
        entries
            .iter()
            .map(|(label, value)| (PercentileLabel::parse(label).unwrap(), *value))
            .collect()
    }

    fn stats(n: u64, percentile: Option<PercentileReport>) -> LatencyTypeStats {
        LatencyTypeStats {
            n: Some(n),
            min: 1,
            max: 100,
            mean: None,
            percentile,
            bins: None,
        }
    }

    fn section(total_ios: u64, slat: LatencyTypeStats, clat: LatencyTypeStats, lat: LatencyTypeStats) -> DirectionSection {
        DirectionSection {
            total_ios,
            slat_ns: slat,
            clat_ns: clat,
            lat_ns: lat,
        }
    }

    fn check(enabled: EnabledTypes, encoding: Encoding) -> DirectionCheck {
        DirectionCheck {
            direction: Direction::Read,
            enabled,
            encoding,
            unified: false,
        }
    }

    fn hundred_reads() -> InMemorySamples {
        let latencies: Vec<u64> = (1..=100).collect();
        InMemorySamples::new().with_all_types(Direction::Read, &latencies)
    }

    #[test]
    fn matching_percentiles_pass() {
        crate::init_test_tracing();
        let good = ptiles(&[("50.000000", 50), ("99.000000", 99)]);
        let section = section(
            100,
            stats(100, Some(good.clone())),
            stats(100, Some(good.clone())),
            stats(100, Some(good)),
        );
        let report = validate_direction(&section, &check(EnabledTypes::ALL, Encoding::Plain), &hundred_reads());
        assert!(report.passed(), "{:?}", report.findings().collect::<Vec<_>>());
        assert_eq!(report.types.len(), 3);
        assert!(report.types.iter().all(|t| t.percentiles_checked == 2));
    }

    #[test]
    fn off_by_one_p99_is_tolerance_violation() {
        crate::init_test_tracing();
        let bad = ptiles(&[("99.000000", 100)]);
        let section = section(100, stats(100, None), stats(100, Some(bad)), stats(100, None));
        let report = validate_direction(
            &section,
            &check(EnabledTypes::new(false, true, false), Encoding::Plain),
            &hundred_reads(),
        );
        assert!(!report.passed());
        let clat = &report.types[1];
        assert_eq!(clat.mismatches.len(), 1);
        let mismatch = &clat.mismatches[0];
        assert_eq!(mismatch.rank, 99);
        assert_eq!(mismatch.index, 98);
        assert_eq!(mismatch.reference, 99);
        assert_eq!(mismatch.reported, 100);
        assert!(has_code(&clat.findings, FindingCode::ToleranceViolation));
        assert_eq!(report.types[0].status, VERDICT_SKIP);
    }

    #[test]
    fn one_bad_percentile_does_not_stop_the_rest() {
        let mixed = ptiles(&[("10.000000", 500), ("50.000000", 50), ("90.000000", 1)]);
        let section = section(100, stats(100, None), stats(100, Some(mixed)), stats(100, None));
        let report = validate_direction(
            &section,
            &check(EnabledTypes::new(false, true, false), Encoding::Plain),
            &hundred_reads(),
        );
        let clat = &report.types[1];
        assert_eq!(clat.percentiles_checked, 3);
        assert_eq!(clat.mismatches.len(), 2);
    }

    #[test]
    fn disabled_type_with_percentiles_is_encoding_mismatch() {
        let good = ptiles(&[("50.000000", 50)]);
        let section = section(100, stats(100, Some(good)), stats(100, None), stats(100, None));
        let report = validate_direction(
            &section,
            &check(EnabledTypes::new(false, false, false), Encoding::Plain),
            &hundred_reads(),
        );
        assert!(!report.passed());
        assert!(has_code(&report.types[0].findings, FindingCode::EncodingMismatch));
    }

    #[test]
    fn enabled_type_without_percentiles_fails() {
        let section = section(100, stats(100, None), stats(100, None), stats(100, None));
        let report = validate_direction(
            &section,
            &check(EnabledTypes::new(false, false, true), Encoding::Plain),
            &hundred_reads(),
        );
        assert!(!report.passed());
        assert!(has_code(&report.types[2].findings, FindingCode::EncodingMismatch));
    }

    #[test]
    fn sample_count_mismatch_still_checks_percentiles() {
        let latencies: Vec<u64> = (1..=500).collect();
        let source = InMemorySamples::new().with_all_types(Direction::Write, &latencies);
        let bad = ptiles(&[("50.000000", 999)]);
        let section = section(500, stats(499, None), stats(499, Some(bad)), stats(499, None));
        let mut check = check(EnabledTypes::new(false, true, false), Encoding::Plain);
        check.direction = Direction::Write;
        let report = validate_direction(&section, &check, &source);
        let clat = &report.types[1];
        assert!(has_code(&clat.findings, FindingCode::SampleCountMismatch));
        assert!(has_code(&clat.findings, FindingCode::ToleranceViolation));
        assert_eq!(clat.logged_count, Some(500));
        assert_eq!(clat.reported_count, 499);
    }

    #[test]
    fn missing_n_falls_back_to_total_ios() {
        let good = ptiles(&[("50.000000", 50)]);
        let mut clat = stats(0, Some(good));
        clat.n = None;
        let section = section(100, stats(100, None), clat, stats(100, None));
        let report = validate_direction(
            &section,
            &check(EnabledTypes::new(false, true, false), Encoding::Plain),
            &hundred_reads(),
        );
        assert!(report.passed());
        assert_eq!(report.types[1].reported_count, 100);
    }

    #[test]
    fn bins_under_plain_encoding_fail() {
        let good = ptiles(&[("50.000000", 50)]);
        let mut clat = stats(100, Some(good));
        clat.bins = Some([(1, 50), (100, 50)].into_iter().collect());
        let section = section(100, stats(100, None), clat, stats(100, None));
        let report = validate_direction(
            &section,
            &check(EnabledTypes::new(false, true, false), Encoding::Plain),
            &hundred_reads(),
        );
        assert!(has_code(&report.types[1].findings, FindingCode::EncodingMismatch));
    }

    #[test]
    fn extended_encoding_requires_and_checks_bins() {
        let good = ptiles(&[("50.000000", 50)]);
        let mut clat = stats(100, Some(good.clone()));
        let bins: HistogramTable = [(1, 60), (100, 40)].into_iter().collect();
        clat.bins = Some(bins);
        let lat = stats(100, Some(good));
        let section = section(100, stats(100, None), clat, lat);
        let report = validate_direction(
            &section,
            &check(EnabledTypes::new(false, true, true), Encoding::Extended),
            &hundred_reads(),
        );
        let clat = &report.types[1];
        assert!(clat.passed());
        assert!(clat.histogram.as_ref().unwrap().passed());
        let lat = &report.types[2];
        assert!(!lat.passed());
        assert!(has_code(&lat.findings, FindingCode::EncodingMismatch));
    }

    #[test]
    fn unified_pools_every_direction() {
        let source = InMemorySamples::new()
            .with_all_types(Direction::Read, &[10, 20])
            .with_all_types(Direction::Write, &[30, 40]);
        let good = ptiles(&[("100.000000", 40)]);
        let section = section(4, stats(4, None), stats(4, Some(good)), stats(4, None));
        let check = DirectionCheck {
            direction: Direction::Mixed,
            enabled: EnabledTypes::new(false, true, false),
            encoding: Encoding::Plain,
            unified: true,
        };
        let report = validate_direction(&section, &check, &source);
        assert!(report.passed());
        assert_eq!(report.types[1].logged_count, Some(4));
    }

    #[test]
    fn empty_log_with_percentiles_is_undefined() {
        let good = ptiles(&[("50.000000", 50)]);
        let section = section(0, stats(0, None), stats(0, Some(good)), stats(0, None));
        let report = validate_direction(
            &section,
            &check(EnabledTypes::new(false, true, false), Encoding::Plain),
            &InMemorySamples::new(),
        );
        assert!(has_code(&report.types[1].findings, FindingCode::UndefinedComparison));
    }

    #[test]
    fn zero_reference_with_nonzero_report_is_undefined() {
        let source = InMemorySamples::new().with_all_types(Direction::Read, &[0, 0, 0]);
        let bad = ptiles(&[("50.000000", 5)]);
        let section = section(3, stats(3, None), stats(3, Some(bad)), stats(3, None));
        let report = validate_direction(
            &section,
            &check(EnabledTypes::new(false, true, false), Encoding::Plain),
            &source,
        );
        let clat = &report.types[1];
        assert!(has_code(&clat.findings, FindingCode::UndefinedComparison));
        assert_eq!(clat.mismatches[0].delta, None);
    }
}
