//! Application configuration: config file loading and CLI precedence.
//!
//! Values resolve as CLI flag, then config file, then built-in default.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use segmerge_core::fetch::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_FETCH_ATTEMPTS, DEFAULT_FETCH_DELAY, READ_TIMEOUT_SECS,
};
use segmerge_core::merge::video::{DEFAULT_REMUX_PROGRAM, DEFAULT_REMUX_TIMEOUT};
use segmerge_core::{
    DEFAULT_MAX_PARALLELISM, DEFAULT_RETRY_TIMES, GapPolicy, MediaKind, PipelineOptions, Remuxer,
    RetryPolicy, StackMode,
};
use serde::Deserialize;

use crate::cli::Args;

/// TOML-backed file configuration. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Directory for segments and artifacts.
    pub output_dir: Option<PathBuf>,
    /// Worker-pool size (same range as CLI).
    pub max_parallelism: Option<usize>,
    /// Retry rounds (same range as CLI).
    pub retry_times: Option<u32>,
    /// Image stacking direction.
    pub merge_mode: Option<StackMode>,
    /// Segment kind.
    pub media: Option<MediaKind>,
    /// Title limit.
    pub max_titles: Option<usize>,
    /// Handling of titles with permanently failed segments.
    pub gap_policy: Option<GapPolicy>,
    /// Keep segment files after merging.
    pub keep_segments: Option<bool>,
    /// Remux video to mp4.
    pub remux: Option<bool>,
    /// Remux tool path.
    pub ffmpeg_path: Option<PathBuf>,
    /// Remux time limit in seconds.
    pub remux_timeout_secs: Option<u64>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP request timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Immediate attempts per fetch.
    pub fetch_attempts: Option<u32>,
    /// Pause between immediate attempts in milliseconds.
    pub fetch_delay_ms: Option<u64>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(value) = self.max_parallelism
            && !(1..=256).contains(&value)
        {
            bail!("Invalid config value for `max_parallelism`: {value}. Expected range: 1..=256");
        }
        if let Some(value) = self.retry_times
            && value > 10
        {
            bail!("Invalid config value for `retry_times`: {value}. Expected range: 0..=10");
        }
        if let Some(0) = self.max_titles {
            bail!("Invalid config value for `max_titles`: 0. Expected at least 1");
        }
        if let Some(value) = self.fetch_attempts
            && !(1..=10).contains(&value)
        {
            bail!("Invalid config value for `fetch_attempts`: {value}. Expected range: 1..=10");
        }
        if let Some(value) = self.fetch_delay_ms
            && value > 60_000
        {
            bail!("Invalid config value for `fetch_delay_ms`: {value}. Expected range: 0..=60000");
        }
        validate_secs("connect_timeout_secs", self.connect_timeout_secs, 3600)?;
        validate_secs("read_timeout_secs", self.read_timeout_secs, 3600)?;
        validate_secs("remux_timeout_secs", self.remux_timeout_secs, 86_400)?;
        Ok(())
    }
}

fn validate_secs(field: &str, value: Option<u64>, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..={max}");
    }
    Ok(())
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/segmerge/config.toml`
/// 2. `$HOME/.config/segmerge/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("segmerge")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("segmerge")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist; the default path is optional.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<(PathBuf, FileConfig)>> {
    if let Some(path) = explicit {
        let config = read_file_config(path)?;
        return Ok(Some((path.to_path_buf(), config)));
    }

    let Some(path) = resolve_default_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    let config = read_file_config(&path)?;
    Ok(Some((path, config)))
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let cfg: FileConfig = toml::from_str(raw)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Pipeline options.
    pub options: PipelineOptions,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// HTTP request timeout in seconds.
    pub read_timeout_secs: u64,
    /// Immediate retry policy for each fetch.
    pub fetch_policy: RetryPolicy,
}

/// Merges CLI flags over file values over defaults.
#[must_use]
pub fn resolve_settings(args: &Args, file: &FileConfig) -> Settings {
    let remuxer = if args.no_remux || file.remux == Some(false) {
        None
    } else {
        let program = args
            .ffmpeg
            .clone()
            .or_else(|| file.ffmpeg_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REMUX_PROGRAM));
        let timeout = file
            .remux_timeout_secs
            .map_or(DEFAULT_REMUX_TIMEOUT, Duration::from_secs);
        Some(Remuxer::new(program, timeout))
    };

    let gap_policy = if args.skip_incomplete {
        GapPolicy::Skip
    } else {
        file.gap_policy.unwrap_or_default()
    };

    let keep_segments = if args.clean_segments {
        false
    } else {
        file.keep_segments.unwrap_or(true)
    };

    let options = PipelineOptions {
        output_dir: args
            .output_dir
            .clone()
            .or_else(|| file.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(".")),
        media: args.media.or(file.media).unwrap_or_default(),
        max_parallelism: args
            .max_parallelism
            .map(usize::from)
            .or(file.max_parallelism)
            .unwrap_or(DEFAULT_MAX_PARALLELISM),
        retry_times: args
            .retry_times
            .map(u32::from)
            .or(file.retry_times)
            .unwrap_or(DEFAULT_RETRY_TIMES),
        stack_mode: args.merge_mode.or(file.merge_mode).unwrap_or_default(),
        gap_policy,
        max_titles: args
            .max_titles
            .and_then(|n| usize::try_from(n).ok())
            .or(file.max_titles),
        keep_segments,
        remuxer,
    };

    let fetch_policy = RetryPolicy::new(
        file.fetch_attempts.unwrap_or(DEFAULT_FETCH_ATTEMPTS),
        file.fetch_delay_ms
            .map_or(DEFAULT_FETCH_DELAY, Duration::from_millis),
    );

    Settings {
        options,
        connect_timeout_secs: file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
        read_timeout_secs: file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
        fetch_policy,
    }
}
