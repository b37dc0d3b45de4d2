#![allow(clippy::doc_markdown)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use latcheck::runner::{RunnerSettings, platform_async_ioengine};
use latcheck::scenario::ParseOptions;

/// Upper bound for `parse.max_banner_lines`.
const MAX_BANNER_LINES_LIMIT: usize = 64;

/// Top-level configuration for latcheck.
///
/// Loaded from `latcheck.toml` in the working directory or a user-specified path.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Benchmark launch settings.
    pub runner: RunnerConfig,

    /// Artifact placement.
    pub artifacts: ArtifactsConfig,

    /// Report decoding limits.
    pub parse: ParseConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Resolve configuration with deterministic precedence:
    ///
    /// `CLI > env > file > defaults`
    pub fn resolve(
        explicit_path: Option<&Path>,
        cli_overrides: CliOverrides,
    ) -> Result<ResolvedConfig, ConfigError> {
        Self::resolve_with_env(explicit_path, cli_overrides, &|key| std::env::var(key).ok())
    }

    fn resolve_with_env(
        explicit_path: Option<&Path>,
        cli_overrides: CliOverrides,
        env_lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<ResolvedConfig, ConfigError> {
        let source_path = if let Some(path) = explicit_path {
            Some(path.to_path_buf())
        } else {
            default_candidates().into_iter().find(|path| path.exists())
        };

        let document = if let Some(path) = source_path.as_deref() {
            ConfigDocument::load(path)?
        } else {
            ConfigDocument::default()
        };

        let mut config = Self::default();
        let mut decisions = vec![MergeDecision::new(
            MergeStage::Default,
            "runner.async_ioengine",
            &config.runner.async_ioengine,
        )];

        config.apply_document(&document, &mut decisions);
        config.apply_env_overrides(env_lookup, &mut decisions)?;
        config.apply_cli_overrides(cli_overrides, &mut decisions);
        config.validate()?;

        Ok(ResolvedConfig {
            config,
            source_path,
            decisions,
        })
    }

    /// Serialize this configuration to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            fio_path: self.runner.fio_path.clone(),
            timeout: Duration::from_secs(self.runner.timeout_secs),
            async_ioengine: self.runner.async_ioengine.clone(),
            size: self.runner.size.clone(),
        }
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            max_banner_lines: self.parse.max_banner_lines,
            terse_scan_lines: self.parse.terse_scan_lines,
        }
    }

    fn apply_document(&mut self, document: &ConfigDocument, decisions: &mut Vec<MergeDecision>) {
        let stage = MergeStage::File;
        if let Some(section) = &document.runner {
            if let Some(value) = &section.fio_path {
                self.runner.fio_path = value.clone();
                decisions.push(MergeDecision::new(stage.clone(), "runner.fio_path", value));
            }
            if let Some(value) = section.timeout_secs {
                self.runner.timeout_secs = value;
                decisions.push(MergeDecision::new(stage.clone(), "runner.timeout_secs", value));
            }
            if let Some(value) = &section.async_ioengine {
                self.runner.async_ioengine = value.clone();
                decisions.push(MergeDecision::new(
                    stage.clone(),
                    "runner.async_ioengine",
                    value,
                ));
            }
            if let Some(value) = &section.size {
                self.runner.size = value.clone();
                decisions.push(MergeDecision::new(stage.clone(), "runner.size", value));
            }
        }
        if let Some(section) = &document.artifacts {
            if let Some(value) = &section.root {
                self.artifacts.root = Some(value.clone());
                decisions.push(MergeDecision::new(
                    stage.clone(),
                    "artifacts.root",
                    value.display(),
                ));
            }
        }
        if let Some(section) = &document.parse {
            if let Some(value) = section.max_banner_lines {
                self.parse.max_banner_lines = value;
                decisions.push(MergeDecision::new(stage.clone(), "parse.max_banner_lines", value));
            }
            if let Some(value) = section.terse_scan_lines {
                self.parse.terse_scan_lines = value;
                decisions.push(MergeDecision::new(stage.clone(), "parse.terse_scan_lines", value));
            }
        }
        if let Some(section) = &document.observability {
            if let Some(value) = &section.log_filter {
                self.observability.log_filter = value.clone();
                decisions.push(MergeDecision::new(stage, "observability.log_filter", value));
            }
        }
    }

    fn apply_env_overrides(
        &mut self,
        env_lookup: &impl Fn(&str) -> Option<String>,
        decisions: &mut Vec<MergeDecision>,
    ) -> Result<(), ConfigError> {
        apply_env_field_string(
            "LATCHECK_FIO_PATH",
            env_lookup,
            &mut self.runner.fio_path,
            "runner.fio_path",
            decisions,
        );

        if let Some(raw) = env_lookup("LATCHECK_TIMEOUT_SECS") {
            let parsed = parse_env_u64("LATCHECK_TIMEOUT_SECS", &raw)?;
            self.runner.timeout_secs = parsed;
            decisions.push(MergeDecision::new(
                MergeStage::Env,
                "runner.timeout_secs",
                parsed,
            ));
        }

        apply_env_field_string(
            "LATCHECK_ASYNC_IOENGINE",
            env_lookup,
            &mut self.runner.async_ioengine,
            "runner.async_ioengine",
            decisions,
        );

        if let Some(raw) = env_lookup("LATCHECK_ARTIFACT_ROOT") {
            let root = PathBuf::from(raw.trim());
            decisions.push(MergeDecision::new(
                MergeStage::Env,
                "artifacts.root",
                root.display(),
            ));
            self.artifacts.root = Some(root);
        }

        if let Some(raw) = env_lookup("LATCHECK_MAX_BANNER_LINES") {
            let parsed = parse_env_usize("LATCHECK_MAX_BANNER_LINES", &raw)?;
            self.parse.max_banner_lines = parsed;
            decisions.push(MergeDecision::new(
                MergeStage::Env,
                "parse.max_banner_lines",
                parsed,
            ));
        }

        if let Some(raw) = env_lookup("LATCHECK_TERSE_SCAN_LINES") {
            let parsed = parse_env_usize("LATCHECK_TERSE_SCAN_LINES", &raw)?;
            self.parse.terse_scan_lines = parsed;
            decisions.push(MergeDecision::new(
                MergeStage::Env,
                "parse.terse_scan_lines",
                parsed,
            ));
        }

        apply_env_field_string(
            "LATCHECK_LOG_FILTER",
            env_lookup,
            &mut self.observability.log_filter,
            "observability.log_filter",
            decisions,
        );

        Ok(())
    }

    fn apply_cli_overrides(&mut self, cli: CliOverrides, decisions: &mut Vec<MergeDecision>) {
        if let Some(fio_path) = cli.fio_path {
            decisions.push(MergeDecision::new(MergeStage::Cli, "runner.fio_path", &fio_path));
            self.runner.fio_path = fio_path;
        }
        if let Some(root) = cli.artifact_root {
            decisions.push(MergeDecision::new(
                MergeStage::Cli,
                "artifacts.root",
                root.display(),
            ));
            self.artifacts.root = Some(root);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "runner.timeout_secs must be > 0".to_string(),
            ));
        }
        if self.runner.fio_path.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "runner.fio_path must be non-empty".to_string(),
            ));
        }
        if self.parse.max_banner_lines > MAX_BANNER_LINES_LIMIT {
            return Err(ConfigError::ValidationFailed(format!(
                "parse.max_banner_lines must be <= {MAX_BANNER_LINES_LIMIT}"
            )));
        }
        if self.parse.terse_scan_lines == 0 {
            return Err(ConfigError::ValidationFailed(
                "parse.terse_scan_lines must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from("latcheck.toml")];
    if let Some(config_path) = dirs_next().map(|d| d.join("config.toml")) {
        candidates.push(config_path);
    }
    candidates
}

fn dirs_next() -> Option<PathBuf> {
    dirs_path().map(|d| d.join("latcheck"))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|home| {
                let mut p = PathBuf::from(home);
                p.push(".config");
                p
            })
        })
}

fn apply_env_field_string(
    key: &str,
    env_lookup: &impl Fn(&str) -> Option<String>,
    slot: &mut String,
    field: &str,
    decisions: &mut Vec<MergeDecision>,
) {
    if let Some(raw) = env_lookup(key) {
        let value = raw.trim().to_string();
        decisions.push(MergeDecision::new(MergeStage::Env, field, &value));
        *slot = value;
    }
}

fn parse_env_u64(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::EnvParseFailed {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "expected unsigned integer".to_string(),
        })
}

fn parse_env_usize(key: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::EnvParseFailed {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "expected unsigned integer".to_string(),
        })
}

// -- Sections --

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Benchmark executable.
    pub fio_path: String,
    /// Per-scenario wall-clock limit.
    pub timeout_secs: u64,
    /// Engine used by the asynchronous scenarios.
    pub async_ioengine: String,
    /// File size passed to every scenario.
    pub size: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            fio_path: "fio".to_string(),
            timeout_secs: 300,
            async_ioengine: platform_async_ioengine().to_string(),
            size: "512M".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Artifact root; a timestamped directory is created when unset.
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ParseConfig {
    pub max_banner_lines: usize,
    pub terse_scan_lines: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        let defaults = ParseOptions::default();
        Self {
            max_banner_lines: defaults.max_banner_lines,
            terse_scan_lines: defaults.terse_scan_lines,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default `tracing` filter directive; `RUST_LOG` takes precedence.
    pub log_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "warn".to_string(),
        }
    }
}

// -- Resolution Model --

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub fio_path: Option<String>,
    pub artifact_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub config: Config,
    pub source_path: Option<PathBuf>,
    pub decisions: Vec<MergeDecision>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeDecision {
    pub stage: MergeStage,
    pub field: String,
    pub value: String,
}

impl MergeDecision {
    fn new(stage: MergeStage, field: &str, value: impl ToString) -> Self {
        Self {
            stage,
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStage {
    Default,
    File,
    Env,
    Cli,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigDocument {
    pub runner: Option<RunnerOverrides>,
    pub artifacts: Option<ArtifactsOverrides>,
    pub parse: Option<ParseOverrides>,
    pub observability: Option<ObservabilityOverrides>,
}

impl ConfigDocument {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed(path.into(), e))?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(path.into(), e))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RunnerOverrides {
    pub fio_path: Option<String>,
    pub timeout_secs: Option<u64>,
    pub async_ioengine: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ArtifactsOverrides {
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ParseOverrides {
    pub max_banner_lines: Option<usize>,
    pub terse_scan_lines: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ObservabilityOverrides {
    pub log_filter: Option<String>,
}

// -- Errors --

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),

    #[error("failed to parse config file {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeFailed(toml::ser::Error),

    #[error("environment override parse error for {key}=`{value}`: {reason}")]
    EnvParseFailed {
        key: String,
        value: String,
        reason: String,
    },

    #[error("config validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn map_lookup(map: BTreeMap<String, String>) -> impl Fn(&str) -> Option<String> {
        move |key| map.get(key).cloned()
    }

    fn no_env() -> impl Fn(&str) -> Option<String> {
        map_lookup(BTreeMap::new())
    }

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("latcheck.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.runner.fio_path, "fio");
        assert_eq!(config.runner.timeout_secs, 300);
        assert_eq!(config.runner.size, "512M");
        assert_eq!(config.parse.max_banner_lines, 4);
        assert_eq!(config.parse.terse_scan_lines, 8);
        assert!(config.artifacts.root.is_none());
        assert_eq!(config.runner_settings().timeout, Duration::from_secs(300));
    }

    #[test]
    fn roundtrip_toml_serialization() {
        let mut config = Config::default();
        config.artifacts.root = Some(PathBuf::from("/tmp/artifacts"));
        let toml_str = config.to_toml().expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed, config);
    }

    #[test]
    fn load_nonexistent_file_returns_error() {
        let result = Config::resolve_with_env(
            Some(Path::new("/nonexistent/latcheck.toml")),
            CliOverrides::default(),
            &no_env(),
        );
        assert!(matches!(result, Err(ConfigError::ReadFailed(..))));
    }

    #[test]
    fn resolve_precedence_cli_over_env_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "[runner]\nfio_path = \"/opt/file/fio\"\ntimeout_secs = 60\n",
        );
        let env = BTreeMap::from([
            ("LATCHECK_FIO_PATH".to_string(), "/opt/env/fio".to_string()),
            ("LATCHECK_TIMEOUT_SECS".to_string(), "90".to_string()),
        ]);

        let resolved = Config::resolve_with_env(
            Some(&path),
            CliOverrides {
                fio_path: Some("/opt/cli/fio".to_string()),
                artifact_root: None,
            },
            &map_lookup(env),
        )
        .unwrap();

        assert_eq!(resolved.config.runner.fio_path, "/opt/cli/fio");
        assert_eq!(resolved.config.runner.timeout_secs, 90);
        assert_eq!(resolved.source_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn resolve_records_merge_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[parse]\nmax_banner_lines = 6\n");
        let env = BTreeMap::from([(
            "LATCHECK_TERSE_SCAN_LINES".to_string(),
            "12".to_string(),
        )]);

        let resolved = Config::resolve_with_env(
            Some(&path),
            CliOverrides {
                fio_path: None,
                artifact_root: Some(PathBuf::from("/tmp/out")),
            },
            &map_lookup(env),
        )
        .unwrap();

        let stages: Vec<(MergeStage, &str)> = resolved
            .decisions
            .iter()
            .map(|d| (d.stage.clone(), d.field.as_str()))
            .collect();
        assert_eq!(stages[0], (MergeStage::Default, "runner.async_ioengine"));
        assert!(stages.contains(&(MergeStage::File, "parse.max_banner_lines")));
        assert!(stages.contains(&(MergeStage::Env, "parse.terse_scan_lines")));
        assert!(stages.contains(&(MergeStage::Cli, "artifacts.root")));
        assert_eq!(resolved.config.parse_options().max_banner_lines, 6);
        assert_eq!(resolved.config.parse_options().terse_scan_lines, 12);
    }

    #[test]
    fn resolve_rejects_invalid_env_integer() {
        let env = BTreeMap::from([(
            "LATCHECK_TIMEOUT_SECS".to_string(),
            "soon".to_string(),
        )]);
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "");
        let err =
            Config::resolve_with_env(Some(&path), CliOverrides::default(), &map_lookup(env))
                .unwrap_err();
        match err {
            ConfigError::EnvParseFailed { key, .. } => assert_eq!(key, "LATCHECK_TIMEOUT_SECS"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[runner]\nfio = \"typo\"\n");
        let err = Config::resolve_with_env(Some(&path), CliOverrides::default(), &no_env())
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailed(..)));
    }

    #[test]
    fn validation_rejects_zero_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[runner]\ntimeout_secs = 0\n");
        let err = Config::resolve_with_env(Some(&path), CliOverrides::default(), &no_env())
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed(_)));
    }

    #[test]
    fn validation_rejects_excessive_banner_lines() {
        let env = BTreeMap::from([(
            "LATCHECK_MAX_BANNER_LINES".to_string(),
            "65".to_string(),
        )]);
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "");
        let err =
            Config::resolve_with_env(Some(&path), CliOverrides::default(), &map_lookup(env))
                .unwrap_err();
        assert!(err.to_string().contains("max_banner_lines"));
    }

    #[test]
    fn validation_rejects_empty_fio_path_and_zero_scan_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[runner]\nfio_path = \"  \"\n");
        assert!(
            Config::resolve_with_env(Some(&path), CliOverrides::default(), &no_env()).is_err()
        );
        let path = write_config(dir.path(), "[parse]\nterse_scan_lines = 0\n");
        assert!(
            Config::resolve_with_env(Some(&path), CliOverrides::default(), &no_env()).is_err()
        );
    }
}
