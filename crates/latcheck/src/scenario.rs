//! Built-in latency percentile scenarios and their evaluation.
//!
//! Each scenario names a workload and reporting options, plus the checks
//! that apply to its output: which directions carry I/O (and with which
//! latency types enabled), which must stay idle, whether fsync latency is
//! reported, and which latency type the condensed line carries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::cross_encoding::{CrossEncodingReport, TerseFieldMap, check_condensed};
use crate::direction::{DirectionCheck, DirectionReport, EnabledTypes, Encoding, validate_direction};
use crate::findings::{Finding, FindingCode, VERDICT_FAIL, VERDICT_PASS};
use crate::report::{
    Direction, LatencyType, parse_structured, parse_terse, read_report_file,
};
use crate::samples::LogDirectory;
use crate::sections::{SyncReport, check_idle, check_sync, check_unified_layout};

/// I/O pattern issued by the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Workload {
    RandRead,
    RandWrite,
    RandTrim,
    RandRw,
}

impl Workload {
    pub fn as_arg(self) -> &'static str {
        match self {
            Self::RandRead => "randread",
            Self::RandWrite => "randwrite",
            Self::RandTrim => "randtrim",
            Self::RandRw => "randrw",
        }
    }
}

/// I/O engine class; the asynchronous engine is platform dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoEngine {
    /// Synchronous engine that completes I/O without touching storage.
    Null,
    /// The platform's native asynchronous engine.
    Async,
}

/// Output format requested from the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Json,
    JsonPlus,
    TerseJsonPlus,
}

impl OutputFormat {
    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::JsonPlus => "json+",
            Self::TerseJsonPlus => "terse,json+",
        }
    }

    pub fn encoding(self) -> Encoding {
        match self {
            Self::Json => Encoding::Plain,
            Self::JsonPlus | Self::TerseJsonPlus => Encoding::Extended,
        }
    }

    pub fn has_terse(self) -> bool {
        matches!(self, Self::TerseJsonPlus)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// `*_percentiles` options passed to the benchmark; `None` leaves the
/// option unset so the benchmark default applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentileOptions {
    pub slat: Option<bool>,
    pub clat: Option<bool>,
    pub lat: Option<bool>,
}

impl PercentileOptions {
    pub const fn set(slat: bool, clat: bool, lat: bool) -> Self {
        Self {
            slat: Some(slat),
            clat: Some(clat),
            lat: Some(lat),
        }
    }
}

/// One direction to validate and its expected percentile types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveDirection {
    pub direction: Direction,
    pub enabled: EnabledTypes,
}

/// A benchmark invocation and the checks applied to its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: u32,
    pub description: String,
    pub runtime_secs: u32,
    pub output_format: OutputFormat,
    pub percentiles: PercentileOptions,
    pub ioengine: IoEngine,
    pub workload: Workload,
    pub unified: bool,
    pub fsync: Option<u32>,
    pub active: Vec<ActiveDirection>,
    pub idle: Vec<Direction>,
    pub check_sync: bool,
    /// Latency type whose percentiles the condensed line carries.
    pub terse: Option<LatencyType>,
}

fn active(direction: Direction, slat: bool, clat: bool, lat: bool) -> ActiveDirection {
    ActiveDirection {
        direction,
        enabled: EnabledTypes::new(slat, clat, lat),
    }
}

#[allow(clippy::too_many_arguments)]
fn scenario(
    id: u32,
    description: &str,
    runtime_secs: u32,
    output_format: OutputFormat,
    percentiles: PercentileOptions,
    ioengine: IoEngine,
    workload: Workload,
    active: Vec<ActiveDirection>,
    idle: Vec<Direction>,
) -> Scenario {
    Scenario {
        id,
        description: description.to_string(),
        runtime_secs,
        output_format,
        percentiles,
        ioengine,
        workload,
        unified: false,
        fsync: None,
        active,
        idle,
        check_sync: false,
        terse: None,
    }
}

/// The built-in scenario table.
pub fn builtin_scenarios() -> Vec<Scenario> {
    use Direction::{Mixed, Read, Trim, Write};

    let all = PercentileOptions::set(true, true, true);
    vec![
        // The null engine is synchronous, so slat never appears.
        scenario(1, "randread, null engine, all types requested", 2, OutputFormat::Json, all,
            IoEngine::Null, Workload::RandRead, vec![active(Read, false, true, true)], vec![Write, Trim]),
        scenario(2, "randwrite, null engine, lat only", 2, OutputFormat::Json,
            PercentileOptions::set(false, false, true), IoEngine::Null, Workload::RandWrite,
            vec![active(Write, false, false, true)], vec![Read, Trim]),
        scenario(3, "randtrim, null engine, clat only", 2, OutputFormat::Json,
            PercentileOptions::set(false, true, false), IoEngine::Null, Workload::RandTrim,
            vec![active(Trim, false, true, false)], vec![Read, Write]),
        scenario(4, "randread, async engine, all types", 5, OutputFormat::JsonPlus, all,
            IoEngine::Async, Workload::RandRead, vec![active(Read, true, true, true)], vec![Write, Trim]),
        scenario(5, "randwrite, async engine, clat and lat", 5, OutputFormat::JsonPlus,
            PercentileOptions::set(false, true, true), IoEngine::Async, Workload::RandWrite,
            vec![active(Write, false, true, true)], vec![Read, Trim]),
        scenario(6, "randread, async engine, default percentile options", 5, OutputFormat::JsonPlus,
            PercentileOptions::default(), IoEngine::Async, Workload::RandRead,
            vec![active(Read, false, true, false)], vec![Write, Trim]),
        scenario(7, "randrw, async engine, slat only", 5, OutputFormat::JsonPlus,
            PercentileOptions::set(true, false, false), IoEngine::Async, Workload::RandRw,
            vec![active(Read, true, false, false), active(Write, true, false, false)], vec![Trim]),
        Scenario {
            unified: true,
            ..scenario(8, "randrw, async engine, unified reporting", 5, OutputFormat::JsonPlus, all,
                IoEngine::Async, Workload::RandRw, vec![active(Mixed, true, true, true)], vec![])
        },
        Scenario {
            fsync: Some(32),
            check_sync: true,
            ..scenario(9, "randwrite, null engine, fsync every 32 writes", 2, OutputFormat::JsonPlus,
                all, IoEngine::Null, Workload::RandWrite, vec![active(Write, false, true, true)],
                vec![Read, Trim])
        },
        Scenario {
            terse: Some(LatencyType::Clat),
            ..scenario(10, "randrw, async engine, terse and json+", 5, OutputFormat::TerseJsonPlus,
                all, IoEngine::Async, Workload::RandRw,
                vec![active(Read, true, true, true), active(Write, true, true, true)], vec![Trim])
        },
        Scenario {
            terse: Some(LatencyType::Lat),
            ..scenario(11, "randrw, async engine, terse and json+, lat only", 5,
                OutputFormat::TerseJsonPlus, PercentileOptions::set(false, false, true),
                IoEngine::Async, Workload::RandRw,
                vec![active(Read, false, false, true), active(Write, false, false, true)], vec![Trim])
        },
    ]
}

/// Look up a built-in scenario by id.
pub fn find_scenario(id: u32) -> Option<Scenario> {
    builtin_scenarios().into_iter().find(|s| s.id == id)
}

/// Where a scenario's output and latency logs live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioArtifacts {
    pub dir: PathBuf,
    pub stub: String,
}

impl ScenarioArtifacts {
    pub fn new(dir: impl Into<PathBuf>, stub: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stub: stub.into(),
        }
    }

    /// Default layout: `<root>/<NNN>/latency<NNN>.*`.
    pub fn for_scenario(root: &Path, id: u32) -> Self {
        Self::new(root.join(format!("{id:03}")), default_stub(id))
    }

    pub fn file(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{extension}", self.stub))
    }

    pub fn output_path(&self) -> PathBuf {
        self.file("out")
    }

    pub fn logs(&self) -> LogDirectory {
        LogDirectory::new(&self.dir, &self.stub)
    }
}

/// File name stub for a scenario, e.g. `latency007`.
pub fn default_stub(id: u32) -> String {
    format!("latency{id:03}")
}

/// Decoding limits applied to report files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Non-data lines tolerated ahead of the structured report.
    pub max_banner_lines: usize,
    /// Lines searched for the condensed report.
    pub terse_scan_lines: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_banner_lines: 4,
            terse_scan_lines: 8,
        }
    }
}

/// Findings for a direction that must be idle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdleReport {
    pub direction: Direction,
    pub findings: Vec<Finding>,
}

/// Everything checked for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub scenario_id: u32,
    pub verdict: String,
    pub directions: Vec<DirectionReport>,
    pub idle: Vec<IdleReport>,
    pub sync: Option<SyncReport>,
    pub terse: Vec<CrossEncodingReport>,
    /// Scenario-level findings (run failure, undecodable output, layout).
    pub findings: Vec<Finding>,
}

impl ScenarioOutcome {
    fn empty(scenario_id: u32) -> Self {
        Self {
            scenario_id,
            verdict: VERDICT_PASS.to_string(),
            directions: Vec::new(),
            idle: Vec::new(),
            sync: None,
            terse: Vec::new(),
            findings: Vec::new(),
        }
    }

    /// Outcome for a scenario whose benchmark run did not succeed.
    pub fn run_failed(scenario_id: u32, reason: impl Into<String>) -> Self {
        let mut outcome = Self::empty(scenario_id);
        outcome
            .findings
            .push(Finding::new(FindingCode::RunFailed, reason));
        outcome.finish()
    }

    pub fn passed(&self) -> bool {
        self.verdict == VERDICT_PASS
    }

    /// Every finding in the outcome, scenario-level first.
    pub fn all_findings(&self) -> Vec<&Finding> {
        let mut all: Vec<&Finding> = self.findings.iter().collect();
        all.extend(self.idle.iter().flat_map(|i| i.findings.iter()));
        all.extend(self.directions.iter().flat_map(|d| d.findings()));
        all.extend(self.sync.iter().flat_map(|s| s.findings.iter()));
        all.extend(self.terse.iter().flat_map(|t| t.findings.iter()));
        all
    }

    fn finish(mut self) -> Self {
        let passed = self.all_findings().is_empty();
        self.verdict = if passed { VERDICT_PASS } else { VERDICT_FAIL }.to_string();
        self
    }

    fn fail(mut self, code: FindingCode, message: String) -> Self {
        warn!(scenario = self.scenario_id, %code, "{message}");
        self.findings.push(Finding::new(code, message));
        self.finish()
    }
}

/// Check a finished scenario's artifacts.
#[instrument(skip_all, fields(scenario = scenario.id))]
pub fn evaluate_scenario(
    scenario: &Scenario,
    artifacts: &ScenarioArtifacts,
    options: &ParseOptions,
) -> ScenarioOutcome {
    let mut outcome = ScenarioOutcome::empty(scenario.id);
    let output_path = artifacts.output_path();

    let text = match read_report_file(&output_path) {
        Ok(text) => text,
        Err(err) => return outcome.fail(FindingCode::MalformedReport, err.to_string()),
    };
    let report = match parse_structured(&text, options.max_banner_lines) {
        Ok(report) => report,
        Err(err) => {
            return outcome.fail(
                FindingCode::MalformedReport,
                format!("could not decode structured report: {err}"),
            );
        }
    };
    let job = match report.first_job() {
        Ok(job) => job,
        Err(err) => return outcome.fail(FindingCode::MalformedReport, err.to_string()),
    };

    if scenario.unified {
        outcome.findings.extend(check_unified_layout(job));
    }
    for direction in &scenario.idle {
        outcome.idle.push(IdleReport {
            direction: *direction,
            findings: check_idle(*direction, job.section(*direction)),
        });
    }

    let logs = artifacts.logs();
    let encoding = scenario.output_format.encoding();
    for active in &scenario.active {
        let Some(section) = job.section(active.direction) else {
            outcome.findings.push(Finding::new(
                FindingCode::MalformedReport,
                format!("{} section missing from report", active.direction),
            ));
            continue;
        };
        let check = DirectionCheck {
            direction: active.direction,
            enabled: active.enabled,
            encoding,
            unified: scenario.unified,
        };
        outcome
            .directions
            .push(validate_direction(section, &check, &logs));
    }

    if scenario.check_sync {
        outcome.sync = Some(check_sync(job.sync.as_ref(), encoding));
    }

    if let Some(terse_type) = scenario.terse {
        match parse_terse(&text, options.terse_scan_lines) {
            Ok(line) => {
                let map = TerseFieldMap::default_set();
                for direction in [Direction::Read, Direction::Write] {
                    let ptiles = job
                        .section(direction)
                        .and_then(|s| s.stats(terse_type).percentile.as_ref());
                    match ptiles {
                        Some(ptiles) => outcome
                            .terse
                            .push(check_condensed(&line, &map, direction, ptiles)),
                        None => outcome.findings.push(Finding::new(
                            FindingCode::EncodingMismatch,
                            format!(
                                "{direction} {terse_type} percentiles missing; cannot compare condensed report"
                            ),
                        )),
                    }
                }
            }
            Err(err) => outcome
                .findings
                .push(Finding::new(FindingCode::MalformedReport, err.to_string())),
        }
    }

    let outcome = outcome.finish();
    info!(scenario = scenario.id, verdict = %outcome.verdict, "scenario evaluated");
    outcome
}
