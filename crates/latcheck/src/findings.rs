//! Shared finding and verdict types for every latency check.
//!
//! Checks never fail by returning `Err`: each produces zero or more
//! [`Finding`]s and the caller folds them into a verdict.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const VERDICT_PASS: &str = "PASS";
pub const VERDICT_FAIL: &str = "FAIL";
pub const VERDICT_SKIP: &str = "SKIP";

/// Classification of a failed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingCode {
    MalformedReport,
    SampleCountMismatch,
    ToleranceViolation,
    UndefinedComparison,
    HistogramInconsistency,
    EncodingMismatch,
    UnsupportedConfiguration,
    SampleLogUnreadable,
    UnexpectedData,
    RunFailed,
}

impl fmt::Display for FindingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedReport => write!(f, "MALFORMED_REPORT"),
            Self::SampleCountMismatch => write!(f, "SAMPLE_COUNT_MISMATCH"),
            Self::ToleranceViolation => write!(f, "TOLERANCE_VIOLATION"),
            Self::UndefinedComparison => write!(f, "UNDEFINED_COMPARISON"),
            Self::HistogramInconsistency => write!(f, "HISTOGRAM_INCONSISTENCY"),
            Self::EncodingMismatch => write!(f, "ENCODING_MISMATCH"),
            Self::UnsupportedConfiguration => write!(f, "UNSUPPORTED_CONFIGURATION"),
            Self::SampleLogUnreadable => write!(f, "SAMPLE_LOG_UNREADABLE"),
            Self::UnexpectedData => write!(f, "UNEXPECTED_DATA"),
            Self::RunFailed => write!(f, "RUN_FAILED"),
        }
    }
}

/// One failed check with a human-readable diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub code: FindingCode,
    pub message: String,
}

impl Finding {
    pub fn new(code: FindingCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// `"PASS"` when no findings were recorded, `"FAIL"` otherwise.
pub fn verdict_for(findings: &[Finding]) -> &'static str {
    if findings.is_empty() {
        VERDICT_PASS
    } else {
        VERDICT_FAIL
    }
}

/// True when any finding carries `code`.
pub fn has_code(findings: &[Finding], code: FindingCode) -> bool {
    findings.iter().any(|f| f.code == code)
}
