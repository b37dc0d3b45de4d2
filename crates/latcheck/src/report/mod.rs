//! Decoders for the benchmark's report encodings.
//!
//! `structured` decodes the JSON / JSON+ document into typed records and
//! `terse` locates and splits the condensed single-line report. Neither
//! performs any validation beyond what decoding requires.

pub mod structured;
pub mod terse;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use structured::{
    DirectionSection, HistogramTable, JobReport, LatencyTypeStats, PercentileLabel,
    PercentileReport, StructuredReport, SyncSection, parse_structured,
};
pub use terse::{TERSE_V3_PREFIX, TerseLine, parse_terse};

/// Data direction of an I/O, as tagged in latency logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Read,
    Write,
    Trim,
    /// Unified reporting: all directions pooled into one section.
    Mixed,
}

impl Direction {
    /// Direction code used in the third column of latency logs.
    ///
    /// `Mixed` has no code of its own; it pools every record.
    pub fn log_code(self) -> Option<u8> {
        match self {
            Self::Read => Some(0),
            Self::Write => Some(1),
            Self::Trim => Some(2),
            Self::Mixed => None,
        }
    }

    pub fn from_log_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Read),
            1 => Some(Self::Write),
            2 => Some(Self::Trim),
            _ => None,
        }
    }

    /// The three directions a non-unified report carries.
    pub fn separate() -> &'static [Direction] {
        &[Direction::Read, Direction::Write, Direction::Trim]
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Trim => write!(f, "trim"),
            Self::Mixed => write!(f, "mixed"),
        }
    }
}

/// Submission, completion, or total latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyType {
    Slat,
    Clat,
    Lat,
}

impl LatencyType {
    pub fn all() -> &'static [LatencyType] {
        &[LatencyType::Slat, LatencyType::Clat, LatencyType::Lat]
    }

    /// Short name used in latency log file names (`<stub>_clat.1.log`).
    pub fn log_name(self) -> &'static str {
        match self {
            Self::Slat => "slat",
            Self::Clat => "clat",
            Self::Lat => "lat",
        }
    }

    /// Key of this latency type's object in a structured report section.
    pub fn report_key(self) -> &'static str {
        match self {
            Self::Slat => "slat_ns",
            Self::Clat => "clat_ns",
            Self::Lat => "lat_ns",
        }
    }
}

impl fmt::Display for LatencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.log_name())
    }
}

/// Errors raised while decoding a report encoding.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to read report {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("structured report undecodable after {attempts} offset(s): {last_error}")]
    MalformedStructured { attempts: usize, last_error: String },

    #[error("no condensed report line found in the first {scanned} line(s)")]
    TerseNotFound { scanned: usize },

    #[error("structured report contains no jobs")]
    NoJobs,
}

/// Read a report file into memory.
pub fn read_report_file(path: &std::path::Path) -> Result<String, ReportError> {
    std::fs::read_to_string(path).map_err(|source| ReportError::ReadFailed {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_log_codes_round_trip() {
        for dir in Direction::separate() {
            let code = dir.log_code().unwrap();
            assert_eq!(Direction::from_log_code(code), Some(*dir));
        }
        assert_eq!(Direction::Mixed.log_code(), None);
        assert_eq!(Direction::from_log_code(7), None);
    }

    #[test]
    fn latency_type_names() {
        assert_eq!(LatencyType::Clat.log_name(), "clat");
        assert_eq!(LatencyType::Lat.report_key(), "lat_ns");
        assert_eq!(LatencyType::Slat.to_string(), "slat");
    }

    #[test]
    fn read_missing_report_file_fails() {
        let err = read_report_file(std::path::Path::new("/nonexistent/latency.out")).unwrap_err();
        assert!(matches!(err, ReportError::ReadFailed { .. }));
    }
}
