//! Config file loading and merging with command-line values.
//!
//! The config file is a flat list of `key = value` lines using the same
//! names as the long CLI flags (with underscores). Command-line and
//! environment values win over the file, the file wins over defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use enricher_core::credential::DEFAULT_KEY_PROVIDER_URL;
use enricher_core::verify::DEFAULT_MAILTESTER_BASE_URL;
use enricher_core::{DEFAULT_MAX_COMBOS, DEFAULT_WAVE_SIZE};

use crate::cli::Args;

/// Default minimum delay between verification requests.
pub(crate) const DEFAULT_MIN_DELAY_MS: u64 = 1000;

/// Default HTTP request timeout.
pub(crate) const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Values read from the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FileConfig {
    pub wave_size: Option<u64>,
    pub max_combos: Option<u64>,
    pub min_delay_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub mailtester_base_url: Option<String>,
    pub key_provider_url: Option<String>,
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates values against the same ranges the CLI enforces.
    pub(crate) fn validate(&self) -> Result<()> {
        validate_range("wave_size", self.wave_size, 1, 500)?;
        validate_range("max_combos", self.max_combos, 1, 50)?;
        validate_range("min_delay_ms", self.min_delay_ms, 0, 60_000)?;
        validate_range("request_timeout_secs", self.request_timeout_secs, 1, 3600)?;
        validate_url("mailtester_base_url", self.mailtester_base_url.as_deref())?;
        validate_url("key_provider_url", self.key_provider_url.as_deref())?;
        Ok(())
    }
}

fn validate_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

fn validate_url(field: &str, value: Option<&str>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    let parsed = url::Url::parse(value)
        .with_context(|| format!("Invalid config value for `{field}`: '{value}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("Invalid config value for `{field}`: '{value}'. Expected an http(s) URL");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Log level used when the CLI does not set one.
    #[must_use]
    pub(crate) fn log_level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Result of looking for a config file.
#[derive(Debug, Clone, Default)]
pub(crate) struct LoadedConfig {
    pub path: Option<PathBuf>,
    pub config: Option<FileConfig>,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/enricher/config.toml`
/// 2. `$HOME/.config/enricher/config.toml`
#[must_use]
pub(crate) fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("enricher")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("enricher")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config selected by the CLI.
///
/// An explicit `--config` path must exist; the default path is optional.
pub(crate) fn load_config(args: &Args) -> Result<LoadedConfig> {
    if args.no_config {
        return Ok(LoadedConfig::default());
    }

    if let Some(explicit) = args.config.as_deref() {
        let config = load_file_config(explicit)?;
        return Ok(LoadedConfig {
            path: Some(explicit.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

pub(crate) fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_number = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_number}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {line_number}");

        match key {
            "wave_size" => cfg.wave_size = Some(parse_integer_u64(value).with_context(context)?),
            "max_combos" => cfg.max_combos = Some(parse_integer_u64(value).with_context(context)?),
            "min_delay_ms" => {
                cfg.min_delay_ms = Some(parse_integer_u64(value).with_context(context)?);
            }
            "request_timeout_secs" => {
                cfg.request_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "mailtester_base_url" => {
                cfg.mailtester_base_url = Some(parse_string_literal(value).with_context(context)?);
            }
            "key_provider_url" => {
                cfg.key_provider_url = Some(parse_string_literal(value).with_context(context)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_number}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

/// Fully resolved run settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunSettings {
    pub wave_size: usize,
    pub max_combos: usize,
    pub min_delay: Duration,
    pub request_timeout: Duration,
    pub mailtester_base_url: String,
    pub key_provider_url: String,
}

impl RunSettings {
    /// Merges CLI values over file values over defaults.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn resolve(args: &Args, file: Option<&FileConfig>) -> Self {
        let file = file.cloned().unwrap_or_default();

        // File values are range-checked (<= 500 and <= 50), so they fit usize.
        let wave_size = args
            .wave_size
            .map(usize::from)
            .or(file.wave_size.map(|value| value as usize))
            .unwrap_or(DEFAULT_WAVE_SIZE);
        let max_combos = args
            .max_combos
            .map(usize::from)
            .or(file.max_combos.map(|value| value as usize))
            .unwrap_or(DEFAULT_MAX_COMBOS);

        Self {
            wave_size,
            max_combos,
            min_delay: Duration::from_millis(
                args.min_delay_ms
                    .or(file.min_delay_ms)
                    .unwrap_or(DEFAULT_MIN_DELAY_MS),
            ),
            request_timeout: Duration::from_secs(
                args.request_timeout_secs
                    .or(file.request_timeout_secs)
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            mailtester_base_url: args
                .mailtester_base_url
                .clone()
                .or(file.mailtester_base_url)
                .unwrap_or_else(|| DEFAULT_MAILTESTER_BASE_URL.to_string()),
            key_provider_url: args
                .key_provider_url
                .clone()
                .or(file.key_provider_url)
                .unwrap_or_else(|| DEFAULT_KEY_PROVIDER_URL.to_string()),
        }
    }
}

/// Default log level: CLI flags first, then the file's verbosity.
pub(crate) fn resolve_default_log_level(args: &Args, file: Option<&FileConfig>) -> &'static str {
    if args.quiet {
        return "error";
    }
    match args.verbose {
        0 => file
            .and_then(|cfg| cfg.verbosity)
            .map_or("info", VerbositySetting::log_level),
        1 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["enricher", "--no-config"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_config_all_fields() {
        let cfg = parse_config_str(
            r#"
wave_size = 10
max_combos = 4 # keep it short
min_delay_ms = 250
request_timeout_secs = 12
mailtester_base_url = "http://localhost:9000/ninja"
key_provider_url = "http://localhost:9000/key#frag"
verbosity = "verbose"
"#,
        )
        .unwrap();
        assert_eq!(cfg.wave_size, Some(10));
        assert_eq!(cfg.max_combos, Some(4));
        assert_eq!(cfg.min_delay_ms, Some(250));
        assert_eq!(cfg.request_timeout_secs, Some(12));
        assert_eq!(
            cfg.key_provider_url.as_deref(),
            Some("http://localhost:9000/key#frag")
        );
        assert_eq!(cfg.verbosity, Some(VerbositySetting::Verbose));
    }

    #[test]
    fn test_parse_config_rejects_out_of_range_values() {
        for (raw, field) in [
            ("wave_size = 0", "wave_size"),
            ("wave_size = 501", "wave_size"),
            ("max_combos = 51", "max_combos"),
            ("min_delay_ms = 60001", "min_delay_ms"),
            ("request_timeout_secs = 0", "request_timeout_secs"),
        ] {
            let err = parse_config_str(raw).unwrap_err();
            assert!(err.to_string().contains(field), "{raw}: {err}");
        }
    }

    #[test]
    fn test_parse_config_rejects_bad_url() {
        let err = parse_config_str(r#"mailtester_base_url = "ftp://x""#).unwrap_err();
        assert!(err.to_string().contains("mailtester_base_url"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_keys_and_syntax() {
        let err = parse_config_str("concurrency = 3").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));

        let err = parse_config_str("wave_size 3").unwrap_err();
        assert!(err.to_string().contains("expected key = value"));

        let err = parse_config_str("wave_size = 3 trailing").unwrap_err();
        assert!(format!("{err:#}").contains("wave_size"));
    }

    #[test]
    fn test_run_settings_defaults() {
        let settings = RunSettings::resolve(&args(&[]), None);
        assert_eq!(settings.max_combos, DEFAULT_MAX_COMBOS);
        assert_eq!(settings.min_delay, Duration::from_millis(1000));
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_run_settings_cli_wins_over_file() {
        let file = FileConfig {
            max_combos: Some(3),
            min_delay_ms: Some(10),
            mailtester_base_url: Some("http://file/ninja".to_string()),
            ..FileConfig::default()
        };
        let settings = RunSettings::resolve(
            &args(&["--max-combos", "6", "--mailtester-base-url", "http://cli/ninja"]),
            Some(&file),
        );
        assert_eq!(settings.max_combos, 6);
        assert_eq!(settings.min_delay, Duration::from_millis(10));
        assert_eq!(settings.mailtester_base_url, "http://cli/ninja");
    }

    #[test]
    fn test_resolve_default_log_level() {
        let file = FileConfig {
            verbosity: Some(VerbositySetting::Quiet),
            ..FileConfig::default()
        };
        assert_eq!(resolve_default_log_level(&args(&[]), Some(&file)), "error");
        assert_eq!(resolve_default_log_level(&args(&["-v"]), Some(&file)), "debug");
        assert_eq!(resolve_default_log_level(&args(&["-q"]), None), "error");
        assert_eq!(resolve_default_log_level(&args(&[]), None), "info");
    }

    #[test]
    fn test_load_config_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "max_combos = 2\n").unwrap();

        let parsed = Args::try_parse_from([
            "enricher",
            "--config",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let loaded = load_config(&parsed).unwrap();
        assert_eq!(loaded.config.unwrap().max_combos, Some(2));
    }

    #[test]
    fn test_load_config_missing_explicit_path_errors() {
        let parsed = Args::try_parse_from(["enricher", "--config", "/nonexistent/enricher.toml"])
            .unwrap();
        assert!(load_config(&parsed).is_err());
    }
}
