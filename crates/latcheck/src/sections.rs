//! Section-level checks that need no raw samples: idle directions,
//! unified-reporting layout, and fsync latency.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::direction::Encoding;
use crate::findings::{Finding, FindingCode, verdict_for};
use crate::histogram::check_histogram;
use crate::report::{Direction, DirectionSection, JobReport, LatencyType, SyncSection};

fn record(findings: &mut Vec<Finding>, code: FindingCode, message: String) {
    warn!(%code, "{message}");
    findings.push(Finding::new(code, message));
}

/// A direction the workload never issues must report no I/O at all.
pub fn check_idle(direction: Direction, section: Option<&DirectionSection>) -> Vec<Finding> {
    let mut findings = Vec::new();
    let Some(section) = section else {
        record(
            &mut findings,
            FindingCode::MalformedReport,
            format!("{direction} section missing from report"),
        );
        return findings;
    };

    let busy_types: Vec<&str> = LatencyType::all()
        .iter()
        .filter(|t| section.stats(**t).n.unwrap_or(0) != 0)
        .map(|t| t.log_name())
        .collect();
    if section.total_ios != 0 || !busy_types.is_empty() {
        record(
            &mut findings,
            FindingCode::UnexpectedData,
            format!(
                "unexpected {direction} data found: total_ios={}, non-empty latency types [{}]",
                section.total_ios,
                busy_types.join(", ")
            ),
        );
    }
    findings
}

/// Under unified reporting only the `mixed` section may be present.
pub fn check_unified_layout(job: &JobReport) -> Vec<Finding> {
    let mut findings = Vec::new();
    for direction in Direction::separate() {
        if job.section(*direction).is_some() {
            record(
                &mut findings,
                FindingCode::UnexpectedData,
                format!("unexpected {direction} section found with unified reporting"),
            );
        }
    }
    if job.mixed.is_none() {
        record(
            &mut findings,
            FindingCode::MalformedReport,
            "mixed section missing with unified reporting".to_string(),
        );
    }
    findings
}

/// Result of the fsync latency check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub verdict: String,
    pub findings: Vec<Finding>,
}

/// Check fsync latency: percentiles present, counts consistent, and the
/// histogram following the encoding.
pub fn check_sync(sync: Option<&SyncSection>, encoding: Encoding) -> SyncReport {
    let mut findings = Vec::new();
    check_sync_into(sync, encoding, &mut findings);
    SyncReport {
        verdict: verdict_for(&findings).to_string(),
        findings,
    }
}

fn check_sync_into(sync: Option<&SyncSection>, encoding: Encoding, findings: &mut Vec<Finding>) {
    let Some(sync) = sync else {
        record(
            findings,
            FindingCode::MalformedReport,
            "sync section missing from report".to_string(),
        );
        return;
    };
    let lat = &sync.lat_ns;

    if lat.percentile.is_none() {
        record(
            findings,
            FindingCode::EncodingMismatch,
            "sync percentile data not found".to_string(),
        );
        return;
    }

    let reported = lat.sample_count_or(sync.total_ios);
    if sync.total_ios != reported {
        record(
            findings,
            FindingCode::SampleCountMismatch,
            format!(
                "sync total_ios {} does not match lat_ns sample size {reported}",
                sync.total_ios
            ),
        );
    }

    match (encoding, lat.bins.as_ref()) {
        (Encoding::Plain, Some(_)) => record(
            findings,
            FindingCode::EncodingMismatch,
            "sync histogram bins found with plain encoding".to_string(),
        ),
        (Encoding::Plain, None) => {}
        (Encoding::Extended, None) => record(
            findings,
            FindingCode::EncodingMismatch,
            "sync histogram bins not found with extended encoding".to_string(),
        ),
        (Encoding::Extended, Some(bins)) => {
            let verdict = check_histogram(bins, lat.min, lat.max, reported);
            findings.extend(verdict.findings);
        }
    }
}
