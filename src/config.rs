//! Runtime configuration shared by the TubeFetch binaries.
//!
//! Configuration lives in a tiny `KEY="value"` env-style file so the same
//! settings can be sourced from shell scripts and systemd units. Every key
//! has a default; a missing file simply yields the default configuration.

use anyhow::{Context, Result};
use std::{
    env,
    fs,
    path::{Path, PathBuf},
};

use crate::filename::FilenamePolicy;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/tubefetch-env";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_YTDLP_BIN: &str = "yt-dlp";

/// Raw values read from the config file. All optional so callers can tell
/// "absent" apart from "set to the default".
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ytdlp_bin: Option<PathBuf>,
    pub ffmpeg_location: Option<PathBuf>,
    pub filename_max_len: Option<usize>,
    pub filename_strict: Option<bool>,
}

/// Fully resolved configuration handed to the server.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub host: String,
    pub port: u16,
    /// Path to the external extraction tool invoked for resolution,
    /// search, and streaming.
    pub ytdlp_bin: PathBuf,
    /// Optional transcoder location forwarded to the extraction tool via
    /// `--ffmpeg-location`.
    pub ffmpeg_location: Option<PathBuf>,
    pub filename: FilenamePolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ytdlp_bin: PathBuf::from(DEFAULT_YTDLP_BIN),
            ffmpeg_location: None,
            filename: FilenamePolicy::default(),
        }
    }
}

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            let value = value_raw.trim().trim_matches('"');
            if value.is_empty() {
                continue;
            }
            match key {
                "TUBEFETCH_HOST" => cfg.host = Some(value.to_string()),
                "TUBEFETCH_PORT" => {
                    let port: u16 = value.parse().with_context(|| {
                        format!("Parsing TUBEFETCH_PORT from {}", path.display())
                    })?;
                    cfg.port = Some(port);
                }
                "YTDLP_BIN" => cfg.ytdlp_bin = Some(PathBuf::from(value)),
                "FFMPEG_LOCATION" => cfg.ffmpeg_location = Some(PathBuf::from(value)),
                "FILENAME_MAX_LEN" => {
                    let len: usize = value.parse().with_context(|| {
                        format!("Parsing FILENAME_MAX_LEN from {}", path.display())
                    })?;
                    cfg.filename_max_len = Some(len);
                }
                "FILENAME_STRICT" => {
                    cfg.filename_strict = Some(matches!(value, "1" | "true" | "yes"));
                }
                _ => {}
            }
        }
    }
    Ok(Some(cfg))
}

pub fn load_runtime_config() -> Result<RuntimeConfig> {
    load_runtime_config_from(Path::new(DEFAULT_CONFIG_PATH))
}

/// Resolves the layered configuration: file values override defaults, and
/// `TUBEFETCH_HOST`/`TUBEFETCH_PORT` environment variables override both so
/// one-off invocations do not require editing the config file.
pub fn load_runtime_config_from(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let cfg = read_env_config(path.as_ref())?.unwrap_or_default();
    let mut runtime = RuntimeConfig::default();

    if let Some(host) = cfg.host {
        runtime.host = host;
    }
    if let Some(port) = cfg.port {
        runtime.port = port;
    }
    if let Some(bin) = cfg.ytdlp_bin {
        runtime.ytdlp_bin = bin;
    }
    runtime.ffmpeg_location = cfg.ffmpeg_location;
    if let Some(max_len) = cfg.filename_max_len {
        runtime.filename.max_len = max_len;
    }
    if let Some(strict) = cfg.filename_strict {
        runtime.filename.strict = strict;
    }

    if let Some(host) = env::var("TUBEFETCH_HOST").ok().filter(|v| !v.is_empty()) {
        runtime.host = host;
    }
    if let Some(port) = env::var("TUBEFETCH_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        runtime.port = port;
    }

    Ok(runtime)
}
