#![forbid(unsafe_code)]

mod cli;
mod config;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{CheckArgs, Cli, Command, ConfigArgs, ListArgs, RunArgs};
use config::{CliOverrides, Config};
use latcheck::runner::run_scenario;
use latcheck::scenario::{
    ParseOptions, Scenario, ScenarioArtifacts, ScenarioOutcome, builtin_scenarios, default_stub,
    evaluate_scenario, find_scenario,
};

fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn default_artifact_root() -> PathBuf {
    PathBuf::from(format!(
        "latency-test-{}",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ))
}

fn select_scenarios(ids: &[u32]) -> Result<Vec<Scenario>> {
    if ids.is_empty() {
        return Ok(builtin_scenarios());
    }
    ids.iter()
        .map(|id| {
            find_scenario(*id).ok_or_else(|| anyhow::anyhow!("unknown scenario id {id} (expected 1-11)"))
        })
        .collect()
}

fn outcome_label(outcome: &ScenarioOutcome) -> &'static str {
    if outcome.passed() { "PASSED" } else { "FAILED" }
}

fn print_outcome_human(outcome: &ScenarioOutcome) {
    println!("Test {} {}", outcome.scenario_id, outcome_label(outcome));
    for finding in outcome.all_findings() {
        println!("  {finding}");
    }
}

fn exit_code(failed: usize) -> i32 {
    i32::try_from(failed).unwrap_or(i32::MAX)
}

fn run_one(root: &Path, scenario: &Scenario, config: &Config, options: &ParseOptions) -> ScenarioOutcome {
    match run_scenario(root, scenario, &config.runner_settings()) {
        Ok(result) => match result.failure_reason() {
            None => evaluate_scenario(scenario, &result.artifacts(), options),
            Some(reason) => ScenarioOutcome::run_failed(scenario.id, reason),
        },
        Err(err) => ScenarioOutcome::run_failed(scenario.id, err.to_string()),
    }
}

fn handle_run(args: RunArgs) -> Result<i32> {
    let RunArgs {
        fio,
        artifact_root,
        config,
        scenarios,
        json,
    } = args;

    let resolved = Config::resolve(
        config.as_deref(),
        CliOverrides {
            fio_path: fio,
            artifact_root,
        },
    )
    .context("failed resolving configuration for run")?;
    init_logging(&resolved.config.observability.log_filter);

    let selected = select_scenarios(&scenarios)?;
    let root = resolved
        .config
        .artifacts
        .root
        .clone()
        .unwrap_or_else(default_artifact_root);
    std::fs::create_dir_all(&root)
        .with_context(|| format!("failed creating artifact root {}", root.display()))?;
    if !json {
        println!("Artifact directory is {}", root.display());
    }

    let options = resolved.config.parse_options();
    let mut outcomes = Vec::with_capacity(selected.len());
    for scenario in &selected {
        let outcome = run_one(&root, scenario, &resolved.config, &options);
        if !json {
            print_outcome_human(&outcome);
        }
        outcomes.push(outcome);
    }

    let passed = outcomes.iter().filter(|o| o.passed()).count();
    let failed = outcomes.len() - passed;
    info!(passed, failed, root = %root.display(), "run complete");

    if json {
        let payload = serde_json::json!({
            "command": "run",
            "artifact_root": root,
            "generated_at_utc": chrono::Utc::now().to_rfc3339(),
            "passed": passed,
            "failed": failed,
            "outcomes": outcomes,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{passed} tests passed, {failed} failed");
    }
    Ok(exit_code(failed))
}

fn handle_check(args: CheckArgs) -> Result<i32> {
    let CheckArgs {
        dir,
        scenario,
        stub,
        config,
        json,
    } = args;

    let resolved = Config::resolve(config.as_deref(), CliOverrides::default())
        .context("failed resolving configuration for check")?;
    init_logging(&resolved.config.observability.log_filter);

    let scenario = find_scenario(scenario)
        .ok_or_else(|| anyhow::anyhow!("unknown scenario id {scenario} (expected 1-11)"))?;
    if !dir.is_dir() {
        anyhow::bail!("artifact directory {} does not exist", dir.display());
    }
    let stub = stub.unwrap_or_else(|| default_stub(scenario.id));
    let artifacts = ScenarioArtifacts::new(&dir, stub);
    let outcome = evaluate_scenario(&scenario, &artifacts, &resolved.config.parse_options());

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome_human(&outcome);
    }
    Ok(if outcome.passed() { 0 } else { 1 })
}

fn handle_list(args: ListArgs) -> Result<i32> {
    init_logging("warn");
    let scenarios = builtin_scenarios();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&scenarios)?);
        return Ok(0);
    }
    for scenario in &scenarios {
        println!(
            "{:>3}  {:<12} {:<10} {}",
            scenario.id,
            scenario.output_format.as_arg(),
            scenario.workload.as_arg(),
            scenario.description
        );
    }
    Ok(0)
}

fn handle_config(args: ConfigArgs) -> Result<i32> {
    let resolved = Config::resolve(args.config.as_deref(), CliOverrides::default())
        .context("failed resolving configuration")?;
    init_logging(&resolved.config.observability.log_filter);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(0);
    }

    match &resolved.source_path {
        Some(path) => println!("# source: {}", path.display()),
        None => println!("# source: built-in defaults"),
    }
    let toml = resolved
        .config
        .to_toml()
        .context("failed serializing resolved config")?;
    print!("{toml}");
    println!();
    println!("# merge decisions");
    for decision in &resolved.decisions {
        let stage = serde_json::to_value(&decision.stage)?;
        println!(
            "# {:<8} {} = {}",
            stage.as_str().unwrap_or("?"),
            decision.field,
            decision.value
        );
    }
    Ok(0)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let code = match cli.command {
        Command::Run(args) => handle_run(args)?,
        Command::Check(args) => handle_check(args)?,
        Command::List(args) => handle_list(args)?,
        Command::Config(args) => handle_config(args)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
