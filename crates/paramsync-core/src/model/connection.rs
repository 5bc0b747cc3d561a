// ── Connection status ──

use serde::Serialize;
use tokio::time::Instant;

/// Coarse link health as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
    /// The link is up but the snapshot keeps failing; retrying under backoff.
    Degraded,
}

/// Process-wide connection state. Fetch failures show up here and nowhere
/// else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    /// Consecutive failed snapshot attempts since the last success.
    pub retry_count: u32,
    pub next_retry_at: Option<Instant>,
}

impl ConnectionState {
    pub fn disconnected() -> Self {
        Self::with_phase(ConnectionPhase::Disconnected)
    }

    pub fn connecting() -> Self {
        Self::with_phase(ConnectionPhase::Connecting)
    }

    pub fn connected() -> Self {
        Self::with_phase(ConnectionPhase::Connected)
    }

    pub fn degraded(retry_count: u32, next_retry_at: Instant) -> Self {
        Self {
            phase: ConnectionPhase::Degraded,
            retry_count,
            next_retry_at: Some(next_retry_at),
        }
    }

    fn with_phase(phase: ConnectionPhase) -> Self {
        Self {
            phase,
            retry_count: 0,
            next_retry_at: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::disconnected()
    }
}
