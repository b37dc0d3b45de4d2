//! Condensed vs. structured report equivalence.
//!
//! The condensed line carries each percentile as `<label>%=<usec>`. The
//! structured report carries the same percentile in nanoseconds, and the
//! condensed value must equal it floor-divided by 1000, exactly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::findings::{Finding, FindingCode, verdict_for};
use crate::report::{Direction, PercentileLabel, PercentileReport, TerseLine};

/// Percentiles reported when none are requested explicitly.
pub const DEFAULT_PERCENTILES: [f64; 17] = [
    1.0, 5.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 95.0, 99.0, 99.5, 99.9, 99.95,
    99.99,
];

/// First condensed field holding read-direction percentiles.
pub const READ_PERCENTILE_FIELD: usize = 17;
/// First condensed field holding write-direction percentiles.
pub const WRITE_PERCENTILE_FIELD: usize = 58;

/// A percentile set the condensed layout cannot be mapped for.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("condensed report field layout is only known for the default percentile set, got {requested:?}")]
pub struct UnsupportedConfiguration {
    pub requested: Vec<f64>,
}

/// Condensed field index for each percentile, per direction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerseFieldMap {
    entries: BTreeMap<Direction, Vec<(PercentileLabel, usize)>>,
}

fn default_labels() -> Vec<PercentileLabel> {
    DEFAULT_PERCENTILES
        .iter()
        .filter_map(|p| PercentileLabel::parse(&format!("{p:.6}")).ok())
        .collect()
}

impl TerseFieldMap {
    /// Layout for the default percentile set.
    pub fn default_set() -> Self {
        let labels = default_labels();
        let mut map = Self::default();
        for (direction, start) in [
            (Direction::Read, READ_PERCENTILE_FIELD),
            (Direction::Write, WRITE_PERCENTILE_FIELD),
        ] {
            let entries = labels
                .iter()
                .enumerate()
                .map(|(offset, label)| (label.clone(), start + offset))
                .collect();
            map.entries.insert(direction, entries);
        }
        map
    }

    /// Layout for a requested percentile set; only the default set is known.
    pub fn for_percentiles(requested: &[f64]) -> Result<Self, UnsupportedConfiguration> {
        let is_default = requested.len() == DEFAULT_PERCENTILES.len()
            && requested
                .iter()
                .zip(DEFAULT_PERCENTILES.iter())
                .all(|(a, b)| (a - b).abs() < 1e-9);
        if is_default {
            Ok(Self::default_set())
        } else {
            Err(UnsupportedConfiguration {
                requested: requested.to_vec(),
            })
        }
    }

    /// Supply an explicit label-to-field correspondence for `direction`.
    #[must_use]
    pub fn with_direction(
        mut self,
        direction: Direction,
        entries: Vec<(PercentileLabel, usize)>,
    ) -> Self {
        self.entries.insert(direction, entries);
        self
    }

    pub fn entries(&self, direction: Direction) -> Option<&[(PercentileLabel, usize)]> {
        self.entries.get(&direction).map(Vec::as_slice)
    }
}

/// Split a condensed field `"<label>%=<value>"`.
pub fn parse_terse_field(field: &str) -> Result<(PercentileLabel, u64), String> {
    let (label, rest) = field
        .split_once('%')
        .ok_or_else(|| format!("condensed field `{field}` has no '%'"))?;
    let value = rest
        .strip_prefix('=')
        .ok_or_else(|| format!("condensed field `{field}` has no '=' after '%'"))?;
    let label = PercentileLabel::parse(label)?;
    let value = value
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("condensed field `{field}` value is not an unsigned integer"))?;
    Ok((label, value))
}

/// Result of comparing one direction's condensed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossEncodingReport {
    pub direction: Direction,
    pub verdict: String,
    pub compared: usize,
    pub findings: Vec<Finding>,
}

impl CrossEncodingReport {
    pub fn passed(&self) -> bool {
        self.findings.is_empty()
    }
}

fn record(findings: &mut Vec<Finding>, code: FindingCode, message: String) {
    warn!(%code, "{message}");
    findings.push(Finding::new(code, message));
}

/// Compare `direction`'s condensed percentile fields with `structured`.
#[instrument(skip(line, map, structured))]
pub fn check_condensed(
    line: &TerseLine,
    map: &TerseFieldMap,
    direction: Direction,
    structured: &PercentileReport,
) -> CrossEncodingReport {
    let mut findings = Vec::new();
    let mut compared = 0;

    let Some(entries) = map.entries(direction) else {
        record(
            &mut findings,
            FindingCode::UnsupportedConfiguration,
            format!("no condensed field layout for {direction}"),
        );
        return CrossEncodingReport {
            direction,
            verdict: verdict_for(&findings).to_string(),
            compared,
            findings,
        };
    };

    for (expected, index) in entries {
        let Some(field) = line.fields().get(*index) else {
            record(
                &mut findings,
                FindingCode::EncodingMismatch,
                format!("condensed field {index} for {expected}th percentile is missing"),
            );
            continue;
        };
        let (label, terse_val) = match parse_terse_field(field) {
            Ok(parsed) => parsed,
            Err(reason) => {
                record(&mut findings, FindingCode::MalformedReport, reason);
                continue;
            }
        };
        if &label != expected {
            record(
                &mut findings,
                FindingCode::EncodingMismatch,
                format!("condensed field {index} holds {label}th percentile, expected {expected}th"),
            );
            continue;
        }
        let Some(structured_ns) = structured.get(&label) else {
            record(
                &mut findings,
                FindingCode::EncodingMismatch,
                format!("{label}th percentile missing from structured report"),
            );
            continue;
        };
        compared += 1;
        let structured_us = structured_ns / 1000;
        if structured_us != terse_val {
            record(
                &mut findings,
                FindingCode::EncodingMismatch,
                format!(
                    "mismatch with {label}th percentile: structured value={structured_ns},{structured_us} condensed value={terse_val}"
                ),
            );
        }
    }

    debug!(%direction, compared, failing = findings.len(), "condensed fields compared");
    CrossEncodingReport {
        direction,
        verdict: verdict_for(&findings).to_string(),
        compared,
        findings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::has_code;

    fn label(raw: &str) -> PercentileLabel {
        PercentileLabel::parse(raw).unwrap()
    }

    fn single_field_map(index: usize) -> TerseFieldMap {
        TerseFieldMap::default().with_direction(Direction::Read, vec![(label("99.000000"), index)])
    }

    fn structured(value: u64) -> PercentileReport {
        [(label("99.000000"), value)].into_iter().collect()
    }

    #[test]
    fn floor_conversion_matches() {
        let line = TerseLine::from_line("3;fio-3.36;latency;99.000000%=1234");
        let report = check_condensed(&line, &single_field_map(3), Direction::Read, &structured(1_234_000));
        assert!(report.passed(), "{:?}", report.findings);
        assert_eq!(report.compared, 1);
    }

    #[test]
    fn floor_truncates_sub_microsecond() {
        let line = TerseLine::from_line("3;fio-3.36;latency;99.000000%=1234");
        let report = check_condensed(&line, &single_field_map(3), Direction::Read, &structured(1_234_999));
        assert!(report.passed());
    }

    #[test]
    fn off_by_one_is_mismatch() {
        let line = TerseLine::from_line("3;fio-3.36;latency;99.000000%=1235");
        let report = check_condensed(&line, &single_field_map(3), Direction::Read, &structured(1_234_000));
        assert!(!report.passed());
        assert!(has_code(&report.findings, FindingCode::EncodingMismatch));
    }

    #[test]
    fn wrong_label_at_index_is_mismatch() {
        let line = TerseLine::from_line("3;fio-3.36;latency;95.000000%=1234");
        let report = check_condensed(&line, &single_field_map(3), Direction::Read, &structured(1_234_000));
        assert!(has_code(&report.findings, FindingCode::EncodingMismatch));
        assert_eq!(report.compared, 0);
    }

    #[test]
    fn garbled_field_is_malformed() {
        let line = TerseLine::from_line("3;fio-3.36;latency;garbage");
        let report = check_condensed(&line, &single_field_map(3), Direction::Read, &structured(1));
        assert!(has_code(&report.findings, FindingCode::MalformedReport));
    }

    #[test]
    fn short_line_reports_missing_field() {
        let line = TerseLine::from_line("3;fio-3.36");
        let report = check_condensed(&line, &single_field_map(3), Direction::Read, &structured(1));
        assert!(has_code(&report.findings, FindingCode::EncodingMismatch));
    }

    #[test]
    fn unmapped_direction_is_unsupported() {
        let line = TerseLine::from_line("3;fio-3.36");
        let report = check_condensed(&line, &single_field_map(3), Direction::Trim, &structured(1));
        assert!(has_code(&report.findings, FindingCode::UnsupportedConfiguration));
    }

    #[test]
    fn default_layout_positions() {
        let map = TerseFieldMap::default_set();
        let read = map.entries(Direction::Read).unwrap();
        assert_eq!(read.len(), 17);
        assert_eq!(read[0].1, 17);
        assert_eq!(read[16].1, 33);
        assert_eq!(read[16].0, label("99.99"));
        let write = map.entries(Direction::Write).unwrap();
        assert_eq!(write[0].1, 58);
        assert_eq!(write[16].1, 74);
        assert!(map.entries(Direction::Trim).is_none());
    }

    #[test]
    fn non_default_percentiles_are_unsupported() {
        assert!(TerseFieldMap::for_percentiles(&DEFAULT_PERCENTILES).is_ok());
        let err = TerseFieldMap::for_percentiles(&[50.0, 99.0]).unwrap_err();
        assert_eq!(err.requested, vec![50.0, 99.0]);
    }

    #[test]
    fn parse_field_splits_label_and_value() {
        let (l, v) = parse_terse_field("99.950000%=4321").unwrap();
        assert_eq!(l, label("99.95"));
        assert_eq!(v, 4321);
        assert!(parse_terse_field("99.9%4321").is_err());
        assert!(parse_terse_field("99.9%=x").is_err());
    }
}
