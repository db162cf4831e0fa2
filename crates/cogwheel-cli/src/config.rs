//! Run configuration – reads/writes `~/.cogwheel/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use cogwheel_runtime::{LogFormat, SchedulerConfig};

/// Persisted settings for a robot run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Control period in milliseconds.
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// Early-tick tolerance in milliseconds.
    #[serde(default = "default_jitter_tolerance_ms")]
    pub jitter_tolerance_ms: u64,

    /// Stop after this many seconds; `0` runs until Ctrl-C.
    #[serde(default)]
    pub run_seconds: u64,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_period_ms() -> u64 {
    SchedulerConfig::default().period_ms
}
fn default_jitter_tolerance_ms() -> u64 {
    SchedulerConfig::default().jitter_tolerance_ms
}

impl Default for Config {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            jitter_tolerance_ms: default_jitter_tolerance_ms(),
            run_seconds: 0,
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            period_ms: self.period_ms,
            jitter_tolerance_ms: self.jitter_tolerance_ms,
        }
    }
}

/// Return the path to `~/.cogwheel/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".cogwheel").join("config.toml")
}

/// Load the config from disk with environment overrides applied.
/// Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `COGWHEEL_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `COGWHEEL_PERIOD_MS` | `period_ms` |
/// | `COGWHEEL_RUN_SECONDS` | `run_seconds` |
///
/// Unparseable values are ignored.  `COGWHEEL_LOG_FORMAT` is handled by the
/// telemetry layer.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides_from(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("COGWHEEL_PERIOD_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.period_ms = ms;
    }
    if let Some(v) = lookup("COGWHEEL_RUN_SECONDS")
        && let Ok(secs) = v.trim().parse::<u64>()
    {
        cfg.run_seconds = secs;
    }
}

/// Save the config to disk, creating `~/.cogwheel/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
