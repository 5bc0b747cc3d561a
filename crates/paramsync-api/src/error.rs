use thiserror::Error;

/// Failure of a single remote interaction.
///
/// Covers every way a call can fail on the transport side: the link is
/// down, the peer rejected the request, the call timed out, or the
/// payload could not be decoded. `paramsync-core` maps these into its own
/// error type and never inspects transport internals beyond this enum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    // ── Connectivity ────────────────────────────────────────────────
    /// The transport is not connected; the call never left the process.
    #[error("Transport is not connected")]
    NotConnected,

    /// The connection dropped while the call was in flight.
    #[error("Connection lost while `{method}` was in flight")]
    ConnectionLost { method: String },

    /// The transport gave up waiting for a response.
    #[error("Remote call `{method}` timed out")]
    Timeout { method: String },

    // ── Peer ────────────────────────────────────────────────────────
    /// The peer processed the call and reported a failure.
    #[error("Remote call `{method}` failed: {message}")]
    Remote { method: String, message: String },

    /// The request or response body did not have the expected shape.
    #[error("Malformed payload: {message}")]
    Payload { message: String },
}

impl TransportError {
    /// Build a [`TransportError::Remote`] for `method`.
    pub fn remote(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Whether the failure happened because the link was down, as opposed
    /// to the peer rejecting the request.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::ConnectionLost { .. } | Self::Timeout { .. }
        )
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_classification() {
        assert!(TransportError::NotConnected.is_connectivity());
        assert!(
            TransportError::Timeout {
                method: "params.set".into()
            }
            .is_connectivity()
        );
        assert!(!TransportError::remote("params.set", "out of range").is_connectivity());
    }

    #[test]
    fn remote_error_message_names_method() {
        let err = TransportError::remote("params.set", "engine busy");
        assert_eq!(err.to_string(), "Remote call `params.set` failed: engine busy");
    }
}
