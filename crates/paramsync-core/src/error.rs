// ── Core error types ──
//
// What consumers of the engine see. Stale events and superseded write
// resolutions are not errors and never surface here. The
// `From<TransportError>` impl keeps the transport failure intact so a
// rejected write reports exactly what the link said.

use paramsync_api::TransportError;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    // ── Synchronous rejections ───────────────────────────────────────
    #[error("Invalid value for `{id}`: {reason}")]
    Validation { id: String, reason: String },

    #[error("Unknown parameter: {id}")]
    UnknownParameter { id: String },

    #[error("Engine has been shut down")]
    EngineStopped,

    // ── Remote failures ──────────────────────────────────────────────
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Malformed {what} payload: {message}")]
    Decode { what: &'static str, message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Rejections decided locally, before anything reached the transport.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::UnknownParameter { .. })
    }

    /// The transport error behind this failure, if any.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }

    pub(crate) fn validation(id: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            id: id.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(what: &'static str, err: &serde_json::Error) -> Self {
        Self::Decode {
            what,
            message: err.to_string(),
        }
    }
}
