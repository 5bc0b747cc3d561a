//! Configuration for the paramsync engine and CLI.
//!
//! Layered loading (built-in defaults, a TOML file, `PARAMSYNC_*`
//! environment variables) and translation to
//! `paramsync_core::EngineConfig`. The engine itself never reads files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use paramsync_core::{BackoffConfig, CoreError, EngineConfig};

/// Prefix for environment overrides. Nested keys use `__`, e.g.
/// `PARAMSYNC_BACKOFF__MAX_DELAY_MS=10000`.
pub const ENV_PREFIX: &str = "PARAMSYNC_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Method and event names, channel sizing.
    #[serde(default)]
    pub engine: EngineSection,

    /// Snapshot retry policy.
    #[serde(default)]
    pub backoff: BackoffSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSection {
    pub snapshot_method: String,
    pub write_method: String,
    pub changed_event: String,
    pub bulk_changed_event: String,
    pub change_channel_capacity: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            snapshot_method: engine.snapshot_method,
            write_method: engine.write_method,
            changed_event: engine.changed_event,
            bulk_changed_event: engine.bulk_changed_event,
            change_channel_capacity: engine.change_channel_capacity,
        }
    }
}

/// Backoff in milliseconds, as written in TOML.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffSection {
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for BackoffSection {
    fn default() -> Self {
        let backoff = BackoffConfig::default();
        Self {
            initial_delay_ms: duration_ms(backoff.initial_delay),
            multiplier: backoff.multiplier,
            max_delay_ms: duration_ms(backoff.max_delay),
            jitter: backoff.jitter,
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Validate and convert into the engine's runtime configuration.
    pub fn to_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let config = EngineConfig {
            snapshot_method: self.engine.snapshot_method.clone(),
            write_method: self.engine.write_method.clone(),
            changed_event: self.engine.changed_event.clone(),
            bulk_changed_event: self.engine.bulk_changed_event.clone(),
            change_channel_capacity: self.engine.change_channel_capacity,
            backoff: BackoffConfig {
                initial_delay: Duration::from_millis(self.backoff.initial_delay_ms),
                multiplier: self.backoff.multiplier,
                max_delay: Duration::from_millis(self.backoff.max_delay_ms),
                jitter: self.backoff.jitter,
            },
        };

        config.validate().map_err(|e| match e {
            CoreError::Config { message } => ConfigError::Validation {
                field: "engine".into(),
                reason: message,
            },
            other => ConfigError::Validation {
                field: "engine".into(),
                reason: other.to_string(),
            },
        })?;
        Ok(config)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "paramsync", "paramsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("paramsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// The layered provider stack: defaults, then `path`, then environment.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load config from `path`, or the platform default when `None`. A
/// missing file is not an error; its layer is simply empty.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let config: Config = figment(&path).extract()?;
    Ok(config)
}

/// Load config, falling back to defaults on any error.
pub fn load_config_or_default(path: Option<&Path>) -> Config {
    load_config(path).unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, or the platform
/// default when `None`. Returns the path written.
pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_engine_defaults() {
        let engine = Config::default().to_engine_config().unwrap();
        assert_eq!(engine, EngineConfig::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[engine]\nwrite_method = \"host.set\"\n\n[backoff]\ninitial_delay_ms = 250\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.engine.write_method, "host.set");
        assert_eq!(config.engine.snapshot_method, "params.snapshot");
        assert_eq!(config.backoff.initial_delay_ms, 250);

        let engine = config.to_engine_config().unwrap();
        assert_eq!(engine.backoff.initial_delay, Duration::from_millis(250));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backoff]\njitter = \"lots\"\n").unwrap();

        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::Figment(_))
        ));
        assert_eq!(load_config_or_default(Some(&path)), Config::default());
    }

    #[test]
    fn environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[backoff]\njitter = 0.1\nmax_delay_ms = 5000\n")?;
            jail.set_env("PARAMSYNC_BACKOFF__MAX_DELAY_MS", "8000");
            jail.set_env("PARAMSYNC_ENGINE__CHANGED_EVENT", "host.changed");

            let config: Config = figment(Path::new("config.toml")).extract()?;
            assert_eq!(config.backoff.jitter, 0.1);
            assert_eq!(config.backoff.max_delay_ms, 8000);
            assert_eq!(config.engine.changed_event, "host.changed");
            Ok(())
        });
    }

    #[test]
    fn invalid_backoff_is_rejected() {
        let config = Config {
            backoff: BackoffSection {
                multiplier: 1.1,
                ..BackoffSection::default()
            },
            ..Config::default()
        };
        let err = config.to_engine_config().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
        assert!(err.to_string().contains("multiplier"));
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.engine.change_channel_capacity = 32;

        let written = save_config(&config, Some(&path)).unwrap();
        assert_eq!(written, path);
        assert_eq!(load_config(Some(&path)).unwrap(), config);
    }
}
