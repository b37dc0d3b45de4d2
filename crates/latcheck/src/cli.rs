#![allow(clippy::doc_markdown)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// latcheck: latency percentile consistency checker.
///
/// Runs the benchmark under a fixed set of scenarios and checks that the
/// percentiles, histograms and condensed report it produces agree with the
/// raw per-I/O latency logs.
#[derive(Debug, Parser)]
#[command(
    name = "latcheck",
    version,
    about,
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run scenarios and check their output.
    Run(RunArgs),

    /// Check artifacts from an earlier run without launching the benchmark.
    Check(CheckArgs),

    /// Print the built-in scenario table.
    List(ListArgs),

    /// Print the resolved configuration and its merge decisions.
    Config(ConfigArgs),
}

// -- run --

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Benchmark executable override.
    #[arg(long)]
    pub fio: Option<String>,

    /// Artifact root; a timestamped directory is created when omitted.
    #[arg(long)]
    pub artifact_root: Option<PathBuf>,

    /// Config file override (default discovery is used when omitted).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Only run these scenario ids (repeatable).
    #[arg(long = "scenario")]
    pub scenarios: Vec<u32>,

    /// Emit machine-readable outcomes.
    #[arg(long)]
    pub json: bool,
}

// -- check --

#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// Directory holding the scenario's report and latency logs.
    #[arg(long)]
    pub dir: PathBuf,

    /// Scenario id whose checks apply.
    #[arg(long)]
    pub scenario: u32,

    /// File name stub (default: latencyNNN).
    #[arg(long)]
    pub stub: Option<String>,

    /// Config file override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Emit machine-readable outcome.
    #[arg(long)]
    pub json: bool,
}

// -- list --

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Emit the scenario table as JSON.
    #[arg(long)]
    pub json: bool,
}

// -- config --

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    /// Config file override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Emit machine-readable configuration.
    #[arg(long)]
    pub json: bool,
}
