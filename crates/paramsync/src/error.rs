//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use paramsync_api::TransportError;
use paramsync_config::ConfigError;
use paramsync_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Parameters ───────────────────────────────────────────────────
    #[error("Parameter '{id}' not found")]
    #[diagnostic(
        code(paramsync::not_found),
        help("Only parameters announced by the remote snapshot can be written.")
    )]
    UnknownParameter { id: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(paramsync::validation))]
    Validation { field: String, reason: String },

    // ── Link ─────────────────────────────────────────────────────────
    #[error("Remote engine is not connected")]
    #[diagnostic(
        code(paramsync::not_connected),
        help("Writes are rejected until the link is up and the snapshot has landed.")
    )]
    NotConnected,

    #[error(transparent)]
    #[diagnostic(code(paramsync::transport))]
    Transport(TransportError),

    #[error("Timed out after {seconds}s waiting for {what}")]
    #[diagnostic(
        code(paramsync::timeout),
        help("Raise --timeout, or lower [backoff] delays in the config file.")
    )]
    Timeout { what: String, seconds: u64 },

    #[error("Engine has been shut down")]
    #[diagnostic(code(paramsync::stopped))]
    EngineStopped,

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(paramsync::config),
        help("Check the config file, or run: paramsync config show")
    )]
    Config(#[from] ConfigError),

    #[error("Config file already exists: {path}")]
    #[diagnostic(
        code(paramsync::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(paramsync::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render TOML: {0}")]
    #[diagnostic(code(paramsync::toml))]
    Toml(#[from] toml::ser::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(paramsync::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownParameter { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::Config(ConfigError::Validation { .. }) => {
                exit_code::USAGE
            }
            Self::NotConnected | Self::Transport(_) => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::ConfigExists { .. } => exit_code::CONFLICT,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation { id, reason } => CliError::Validation { field: id, reason },
            CoreError::UnknownParameter { id } => CliError::UnknownParameter { id },
            CoreError::EngineStopped => CliError::EngineStopped,
            CoreError::Transport(TransportError::NotConnected) => CliError::NotConnected,
            CoreError::Transport(e) => CliError::Transport(e),
            CoreError::Config { message } => CliError::Config(ConfigError::Validation {
                field: "engine".into(),
                reason: message,
            }),
            other @ (CoreError::Decode { .. } | CoreError::Internal(_)) => {
                CliError::Internal(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (
                CoreError::UnknownParameter { id: "x".into() },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::Validation {
                    id: "mode".into(),
                    reason: "no variant 7".into(),
                },
                exit_code::USAGE,
            ),
            (
                CoreError::Transport(TransportError::NotConnected),
                exit_code::CONNECTION,
            ),
            (
                CoreError::Transport(TransportError::remote("params.set", "busy")),
                exit_code::CONNECTION,
            ),
            (CoreError::EngineStopped, exit_code::GENERAL),
            (CoreError::Internal("boom".into()), exit_code::GENERAL),
        ];

        for (core, code) in cases {
            let label = core.to_string();
            assert_eq!(CliError::from(core).exit_code(), code, "{label}");
        }
    }
}
