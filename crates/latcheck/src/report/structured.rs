//! Typed records for the structured (JSON / JSON+) report.
//!
//! The document is decoded once here; everything downstream works on these
//! records. Percentile labels and histogram keys arrive as JSON object keys
//! (strings) and are converted to numbers at this boundary.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::debug;

use super::{Direction, LatencyType, ReportError};

/// Top-level structured report: one record per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredReport {
    pub jobs: Vec<JobReport>,
}

impl StructuredReport {
    /// The first job record; scenarios run a single job.
    pub fn first_job(&self) -> Result<&JobReport, ReportError> {
        self.jobs.first().ok_or(ReportError::NoJobs)
    }
}

/// Per-job statistics, one section per data direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    #[serde(default)]
    pub jobname: Option<String>,
    #[serde(default)]
    pub read: Option<DirectionSection>,
    #[serde(default)]
    pub write: Option<DirectionSection>,
    #[serde(default)]
    pub trim: Option<DirectionSection>,
    /// Present instead of read/write/trim under unified reporting.
    #[serde(default)]
    pub mixed: Option<DirectionSection>,
    #[serde(default)]
    pub sync: Option<SyncSection>,
}

impl JobReport {
    pub fn section(&self, direction: Direction) -> Option<&DirectionSection> {
        match direction {
            Direction::Read => self.read.as_ref(),
            Direction::Write => self.write.as_ref(),
            Direction::Trim => self.trim.as_ref(),
            Direction::Mixed => self.mixed.as_ref(),
        }
    }
}

/// Statistics for one data direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionSection {
    pub total_ios: u64,
    pub slat_ns: LatencyTypeStats,
    pub clat_ns: LatencyTypeStats,
    pub lat_ns: LatencyTypeStats,
}

impl DirectionSection {
    pub fn stats(&self, lat_type: LatencyType) -> &LatencyTypeStats {
        match lat_type {
            LatencyType::Slat => &self.slat_ns,
            LatencyType::Clat => &self.clat_ns,
            LatencyType::Lat => &self.lat_ns,
        }
    }
}

/// fsync/fdatasync latency section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSection {
    pub total_ios: u64,
    pub lat_ns: LatencyTypeStats,
}

/// Summary statistics for one latency type within a direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyTypeStats {
    /// Reported sample count. Absent in some sections; callers fall back to
    /// the section's `total_ios`.
    #[serde(rename = "N", default)]
    pub n: Option<u64>,
    #[serde(default)]
    pub min: u64,
    #[serde(default)]
    pub max: u64,
    #[serde(default)]
    pub mean: Option<f64>,
    #[serde(default)]
    pub percentile: Option<PercentileReport>,
    /// Only emitted by the extended (JSON+) encoding.
    #[serde(default)]
    pub bins: Option<HistogramTable>,
}

impl LatencyTypeStats {
    /// Reported sample count, or `fallback` when the report omits `N`.
    pub fn sample_count_or(&self, fallback: u64) -> u64 {
        self.n.unwrap_or(fallback)
    }
}

// -- Percentile labels --

/// A percentile label such as `"99.000000"`.
///
/// Equality and ordering use the numeric value (to a millionth of a
/// percent), so `"99"` and `"99.000000"` name the same percentile. The raw
/// text is kept for diagnostics.
#[derive(Debug, Clone)]
pub struct PercentileLabel {
    raw: String,
    value: f64,
    millionths: u64,
}

impl PercentileLabel {
    /// Parse a label; the value must lie in (0, 100].
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let value: f64 = trimmed
            .parse()
            .map_err(|_| format!("percentile label '{raw}' is not a number"))?;
        if !value.is_finite() || value <= 0.0 || value > 100.0 {
            return Err(format!("percentile label '{raw}' is outside (0, 100]"));
        }
        Ok(Self {
            raw: trimmed.to_string(),
            value,
            millionths: (value * 1_000_000.0).round() as u64,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Percentile as parsed from the label, e.g. `99.5`.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn millionths(&self) -> u64 {
        self.millionths
    }
}

impl PartialEq for PercentileLabel {
    fn eq(&self, other: &Self) -> bool {
        self.millionths == other.millionths
    }
}

impl Eq for PercentileLabel {}

impl Hash for PercentileLabel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.millionths.hash(state);
    }
}

impl PartialOrd for PercentileLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PercentileLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.millionths.cmp(&other.millionths)
    }
}

impl fmt::Display for PercentileLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Reported latency (ns) per percentile label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, u64>", into = "BTreeMap<String, u64>")]
pub struct PercentileReport {
    entries: BTreeMap<PercentileLabel, u64>,
}

impl PercentileReport {
    pub fn iter(&self) -> impl Iterator<Item = (&PercentileLabel, u64)> {
        self.entries.iter().map(|(label, value)| (label, *value))
    }

    pub fn get(&self, label: &PercentileLabel) -> Option<u64> {
        self.entries.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &PercentileLabel> {
        self.entries.keys()
    }
}

impl TryFrom<BTreeMap<String, u64>> for PercentileReport {
    type Error = String;

    fn try_from(raw: BTreeMap<String, u64>) -> Result<Self, Self::Error> {
        let mut entries = BTreeMap::new();
        for (key, value) in raw {
            let label = PercentileLabel::parse(&key)?;
            if entries.insert(label, value).is_some() {
                return Err(format!("duplicate percentile label '{key}'"));
            }
        }
        Ok(Self { entries })
    }
}

impl From<PercentileReport> for BTreeMap<String, u64> {
    fn from(report: PercentileReport) -> Self {
        report
            .entries
            .into_iter()
            .map(|(label, value)| (label.raw, value))
            .collect()
    }
}

impl FromIterator<(PercentileLabel, u64)> for PercentileReport {
    fn from_iter<I: IntoIterator<Item = (PercentileLabel, u64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

// -- Histogram --

/// JSON+ latency bins: bucket representative value (ns) to count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, u64>", into = "BTreeMap<String, u64>")]
pub struct HistogramTable {
    buckets: BTreeMap<u64, u64>,
}

impl HistogramTable {
    pub fn smallest_bucket(&self) -> Option<u64> {
        self.buckets.keys().next().copied()
    }

    pub fn largest_bucket(&self) -> Option<u64> {
        self.buckets.keys().next_back().copied()
    }

    /// Sum of all bucket counts.
    pub fn total_count(&self) -> u64 {
        self.buckets.values().fold(0u64, |acc, c| acc.saturating_add(*c))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl TryFrom<BTreeMap<String, u64>> for HistogramTable {
    type Error = String;

    fn try_from(raw: BTreeMap<String, u64>) -> Result<Self, Self::Error> {
        let mut buckets = BTreeMap::new();
        for (key, count) in raw {
            let bucket: u64 = key
                .trim()
                .parse()
                .map_err(|_| format!("histogram bucket '{key}' is not an integer"))?;
            let slot = buckets.entry(bucket).or_insert(0u64);
            *slot = slot.saturating_add(count);
        }
        Ok(Self { buckets })
    }
}

impl From<HistogramTable> for BTreeMap<String, u64> {
    fn from(table: HistogramTable) -> Self {
        table
            .buckets
            .into_iter()
            .map(|(bucket, count)| (bucket.to_string(), count))
            .collect()
    }
}

impl FromIterator<(u64, u64)> for HistogramTable {
    fn from_iter<I: IntoIterator<Item = (u64, u64)>>(iter: I) -> Self {
        let mut buckets = BTreeMap::new();
        for (bucket, count) in iter {
            let slot = buckets.entry(bucket).or_insert(0u64);
            *slot = slot.saturating_add(count);
        }
        Self { buckets }
    }
}

// -- Decoding --

fn decode_at_offset(lines: &[&str], offset: usize) -> Result<StructuredReport, serde_json::Error> {
    let tail = lines.get(offset..).unwrap_or_default().join("\n");
    serde_json::from_str(&tail)
}

/// Decode a structured report that may be preceded by banner lines.
///
/// Tries offsets `0..=max_banner_lines` in order and keeps the first that
/// decodes. Exhausting every offset is a [`ReportError::MalformedStructured`].
pub fn parse_structured(
    text: &str,
    max_banner_lines: usize,
) -> Result<StructuredReport, ReportError> {
    let lines: Vec<&str> = text.lines().collect();
    let attempts = max_banner_lines + 1;
    let mut last_error = String::from("empty document");

    for offset in 0..attempts {
        match decode_at_offset(&lines, offset) {
            Ok(report) => {
                debug!(offset, jobs = report.jobs.len(), "structured report decoded");
                return Ok(report);
            }
            Err(err) => last_error = err.to_string(),
        }
    }

    Err(ReportError::MalformedStructured {
        attempts,
        last_error,
    })
}
