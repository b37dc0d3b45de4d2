//! Condensed ("terse") report line detection.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::ReportError;

/// Every version-3 condensed line starts with this marker.
pub const TERSE_V3_PREFIX: &str = "3;fio-";

/// A condensed report line split into its `;`-delimited fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerseLine {
    fields: Vec<String>,
}

impl TerseLine {
    pub fn from_line(line: &str) -> Self {
        Self {
            fields: line.split(';').map(str::to_string).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Fields in `range`, or `None` when the line is too short.
    pub fn slice(&self, range: Range<usize>) -> Option<&[String]> {
        self.fields.get(range)
    }
}

/// Find the condensed line among the first `scan_lines` lines of `text`.
///
/// Only single-line version-3 output is recognised.
pub fn parse_terse(text: &str, scan_lines: usize) -> Result<TerseLine, ReportError> {
    text.lines()
        .take(scan_lines)
        .find(|line| line.starts_with(TERSE_V3_PREFIX))
        .map(TerseLine::from_line)
        .ok_or(ReportError::TerseNotFound {
            scanned: scan_lines,
        })
}
