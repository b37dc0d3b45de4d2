//! Per-I/O latency log loading.
//!
//! A latency log is a headerless CSV file with one record per completed
//! I/O: `time, latency_ns, direction, block_size, offset, ...`. Only the
//! latency and direction columns are read.

use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::report::{Direction, LatencyType};

const LATENCY_COLUMN: usize = 1;
const DIRECTION_COLUMN: usize = 2;

/// Failures while reading a latency log.
#[derive(Debug, Error)]
pub enum SampleLogError {
    #[error("failed to open latency log {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("latency log record {record}: {source}")]
    Csv {
        record: usize,
        #[source]
        source: csv::Error,
    },

    #[error("latency log record {record}: column {column} missing")]
    MissingColumn { record: usize, column: usize },

    #[error("latency log record {record}: column {column} value `{value}` is not an unsigned integer")]
    BadValue {
        record: usize,
        column: usize,
        value: String,
    },
}

/// Which records of a log to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionFilter {
    /// Keep records whose direction code matches.
    Only(Direction),
    /// Keep every record (unified reporting).
    Pooled,
}

impl DirectionFilter {
    /// Filter used for `direction`; `Mixed` and unified reporting pool.
    pub fn for_direction(direction: Direction, unified: bool) -> Self {
        if unified || direction.log_code().is_none() {
            Self::Pooled
        } else {
            Self::Only(direction)
        }
    }

    fn accepts(self, code: u8) -> bool {
        match self {
            Self::Pooled => true,
            Self::Only(direction) => direction.log_code() == Some(code),
        }
    }
}

fn parse_column(
    record: &csv::StringRecord,
    index: usize,
    column: usize,
) -> Result<u64, SampleLogError> {
    let raw = record
        .get(column)
        .ok_or(SampleLogError::MissingColumn {
            record: index,
            column,
        })?;
    raw.parse::<u64>().map_err(|_| SampleLogError::BadValue {
        record: index,
        column,
        value: raw.to_string(),
    })
}

/// Read latencies (ns) from a log, keeping records accepted by `filter`.
///
/// Records are returned in log order; callers sort before estimating.
pub fn read_samples<R: Read>(
    reader: R,
    filter: DirectionFilter,
) -> Result<Vec<u64>, SampleLogError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut latencies = Vec::new();
    for (index, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|source| SampleLogError::Csv {
            record: index + 1,
            source,
        })?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let code = parse_column(&record, index + 1, DIRECTION_COLUMN)?;
        let keep = u8::try_from(code).is_ok_and(|code| filter.accepts(code));
        if keep {
            latencies.push(parse_column(&record, index + 1, LATENCY_COLUMN)?);
        }
    }
    Ok(latencies)
}

/// Open and read a latency log file.
pub fn load_samples(path: &Path, filter: DirectionFilter) -> Result<Vec<u64>, SampleLogError> {
    let file = std::fs::File::open(path).map_err(|source| SampleLogError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let samples = read_samples(file, filter)?;
    debug!(path = %path.display(), ?filter, samples = samples.len(), "latency log loaded");
    Ok(samples)
}

/// Supplies raw latency samples for one latency type.
pub trait SampleSource {
    fn samples(
        &self,
        lat_type: LatencyType,
        filter: DirectionFilter,
    ) -> Result<Vec<u64>, SampleLogError>;
}

/// Latency logs written next to a run's output as `<stub>_<type>.1.log`.
#[derive(Debug, Clone)]
pub struct LogDirectory {
    dir: PathBuf,
    stub: String,
}

impl LogDirectory {
    pub fn new(dir: impl Into<PathBuf>, stub: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stub: stub.into(),
        }
    }

    pub fn log_path(&self, lat_type: LatencyType) -> PathBuf {
        self.dir
            .join(format!("{}_{}.1.log", self.stub, lat_type.log_name()))
    }
}

impl SampleSource for LogDirectory {
    fn samples(
        &self,
        lat_type: LatencyType,
        filter: DirectionFilter,
    ) -> Result<Vec<u64>, SampleLogError> {
        load_samples(&self.log_path(lat_type), filter)
    }
}

/// Already-materialised `(latency_ns, direction)` records per latency type.
#[derive(Debug, Clone, Default)]
pub struct InMemorySamples {
    records: Vec<(LatencyType, u64, Direction)>,
}

impl InMemorySamples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, lat_type: LatencyType, latency_ns: u64, direction: Direction) {
        self.records.push((lat_type, latency_ns, direction));
    }

    /// Add the same latencies for every latency type.
    #[must_use]
    pub fn with_all_types(mut self, direction: Direction, latencies: &[u64]) -> Self {
        for lat_type in LatencyType::all() {
            for latency in latencies {
                self.push(*lat_type, *latency, direction);
            }
        }
        self
    }
}

impl SampleSource for InMemorySamples {
    fn samples(
        &self,
        lat_type: LatencyType,
        filter: DirectionFilter,
    ) -> Result<Vec<u64>, SampleLogError> {
        Ok(self
            .records
            .iter()
            .filter(|(t, _, direction)| {
                *t == lat_type && direction.log_code().is_some_and(|c| filter.accepts(c))
            })
            .map(|(_, latency, _)| *latency)
            .collect())
    }
}
