//! Benchmark process execution and artifact capture.
//!
//! Each scenario runs in its own directory under the artifact root. The
//! command line, stdout, stderr and exit code are saved next to the report
//! and latency logs the benchmark writes there.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::scenario::{IoEngine, Scenario, ScenarioArtifacts};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Native asynchronous I/O engine for the build target.
pub fn platform_async_ioengine() -> &'static str {
    if cfg!(target_os = "linux") {
        "libaio"
    } else if cfg!(windows) {
        "windowsaio"
    } else {
        "posixaio"
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to create artifact directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write artifact {path}: {source}")]
    WriteArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// How to launch the benchmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    pub fio_path: String,
    pub timeout: Duration,
    pub async_ioengine: String,
    pub size: String,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            fio_path: "fio".to_string(),
            timeout: Duration::from_secs(300),
            async_ioengine: platform_async_ioengine().to_string(),
            size: "512M".to_string(),
        }
    }
}

/// Outcome of one benchmark process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// `None` when the process was killed or ended by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub test_dir: PathBuf,
    pub stub: String,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Human-readable reason for an unsuccessful run.
    pub fn failure_reason(&self) -> Option<String> {
        if self.timed_out {
            Some("benchmark timed out and was killed".to_string())
        } else {
            match self.exit_code {
                Some(0) => None,
                Some(code) => Some(format!("benchmark exited with code {code}")),
                None => Some("benchmark terminated by signal".to_string()),
            }
        }
    }

    pub fn artifacts(&self) -> ScenarioArtifacts {
        ScenarioArtifacts::new(&self.test_dir, &self.stub)
    }
}

/// Benchmark arguments for `scenario`, writing output under `stub`.
pub fn fio_args(scenario: &Scenario, stub: &str, settings: &RunnerSettings) -> Vec<String> {
    let ioengine = match scenario.ioengine {
        IoEngine::Null => "null",
        IoEngine::Async => settings.async_ioengine.as_str(),
    };
    let mut args = vec![
        "--name=latency".to_string(),
        "--randrepeat=0".to_string(),
        "--norandommap".to_string(),
        "--time_based".to_string(),
        format!("--size={}", settings.size),
        "--rwmixread=50".to_string(),
        format!("--write_lat_log={stub}"),
        format!("--output={stub}.out"),
        format!("--ioengine={ioengine}"),
        format!("--rw={}", scenario.workload.as_arg()),
        format!("--runtime={}", scenario.runtime_secs),
        format!("--output-format={}", scenario.output_format.as_arg()),
    ];
    let ptiles = &scenario.percentiles;
    for (name, value) in [
        ("slat_percentiles", ptiles.slat),
        ("clat_percentiles", ptiles.clat),
        ("lat_percentiles", ptiles.lat),
    ] {
        if let Some(enabled) = value {
            args.push(format!("--{name}={}", u8::from(enabled)));
        }
    }
    if scenario.unified {
        args.push("--unified_rw_reporting=1".to_string());
    }
    if let Some(interval) = scenario.fsync {
        args.push(format!("--fsync={interval}"));
    }
    args
}

fn create_artifact(path: &Path) -> Result<File, RunError> {
    File::create(path).map_err(|source| RunError::WriteArtifact {
        path: path.to_path_buf(),
        source,
    })
}

fn write_artifact(path: &Path, contents: &str) -> Result<(), RunError> {
    fs::write(path, contents).map_err(|source| RunError::WriteArtifact {
        path: path.to_path_buf(),
        source,
    })
}

/// Path used to launch `program` from a different working directory.
///
/// Bare names stay as-is for a `PATH` lookup; relative paths are anchored
/// to the current directory.
pub fn launch_path(program: &str) -> std::io::Result<PathBuf> {
    let path = Path::new(program);
    if path.is_absolute() || path.components().count() <= 1 {
        return Ok(path.to_path_buf());
    }
    std::path::absolute(path)
}

/// Run `scenario` under `artifact_root`, waiting up to the configured timeout.
#[instrument(skip_all, fields(scenario = scenario.id))]
pub fn run_scenario(
    artifact_root: &Path,
    scenario: &Scenario,
    settings: &RunnerSettings,
) -> Result<RunResult, RunError> {
    let artifacts = ScenarioArtifacts::for_scenario(artifact_root, scenario.id);
    fs::create_dir_all(&artifacts.dir).map_err(|source| RunError::CreateDir {
        path: artifacts.dir.clone(),
        source,
    })?;

    let program = launch_path(&settings.fio_path).map_err(|source| RunError::Spawn {
        program: settings.fio_path.clone(),
        source,
    })?;
    let args = fio_args(scenario, &artifacts.stub, settings);
    let mut command_line = vec![program.display().to_string()];
    command_line.extend(args.iter().cloned());
    write_artifact(&artifacts.file("command"), &format!("{}\n", command_line.join(" ")))?;

    let stdout = create_artifact(&artifacts.file("stdout"))?;
    let stderr = create_artifact(&artifacts.file("stderr"))?;

    info!(dir = %artifacts.dir.display(), "launching benchmark");
    let mut child = Command::new(&program)
        .args(&args)
        .current_dir(&artifacts.dir)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .spawn()
        .map_err(|source| RunError::Spawn {
            program: settings.fio_path.clone(),
            source,
        })?;

    let wait_err = |source: std::io::Error| RunError::Wait {
        program: settings.fio_path.clone(),
        source,
    };
    let start = Instant::now();
    let (exit_code, timed_out) = loop {
        if let Some(status) = child.try_wait().map_err(wait_err)? {
            break (status.code(), false);
        }
        if start.elapsed() > settings.timeout {
            warn!(timeout_secs = settings.timeout.as_secs(), "benchmark timed out, killing");
            let _ = child.kill();
            let _ = child.wait();
            break (None, true);
        }
        thread::sleep(POLL_INTERVAL);
    };

    let exit_record = match (timed_out, exit_code) {
        (true, _) => "timeout\n".to_string(),
        (false, Some(code)) => format!("{code}\n"),
        (false, None) => "signal\n".to_string(),
    };
    write_artifact(&artifacts.file("exitcode"), &exit_record)?;

    let result = RunResult {
        exit_code,
        timed_out,
        test_dir: artifacts.dir,
        stub: artifacts.stub,
    };
    info!(exit_code = ?result.exit_code, timed_out, "benchmark finished");
    Ok(result)
}
