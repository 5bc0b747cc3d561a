// ── Transport contract ──
//
// The engine's only view of the remote audio process: fire a call, listen
// for named push events, observe the link phase.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::TransportError;

/// Settlement of a remote call. The call itself is already issued by the
/// time this future is handed out; polling only observes the outcome.
pub type CallFuture = BoxFuture<'static, Result<serde_json::Value, TransportError>>;

/// Push-event callback. Invoked on the transport's delivery context with
/// the raw JSON payload of the event.
pub type EventHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

// ── TransportPhase ──────────────────────────────────────────────────

/// Link state as reported by the transport.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransportPhase {
    Disconnected,
    Connecting,
    Connected,
}

// ── Transport ───────────────────────────────────────────────────────

/// Request/response calls plus push events against a remote peer.
///
/// Implementations must be cheap to share (`Arc<dyn Transport>`) and must
/// not block inside any of these methods.
pub trait Transport: Send + Sync + 'static {
    /// Issue `method` with JSON `args`.
    fn call(&self, method: &str, args: serde_json::Value) -> CallFuture;

    /// Register `handler` for push events named `event`.
    ///
    /// The returned guard removes the handler when consumed via
    /// [`Unsubscribe::unsubscribe`] or dropped.
    fn subscribe(&self, event: &str, handler: EventHandler) -> Unsubscribe;

    /// Subscribe to link phase changes. Implementations only notify on
    /// actual transitions, never re-announce the same phase.
    fn phase(&self) -> watch::Receiver<TransportPhase>;
}

// ── Unsubscribe ─────────────────────────────────────────────────────

/// Removes a push-event handler exactly once.
#[must_use = "dropping an Unsubscribe guard removes the handler immediately"]
pub struct Unsubscribe {
    cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl Unsubscribe {
    pub fn new(cleanup: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cleanup: Some(Box::new(cleanup)),
        }
    }

    /// A guard with nothing to clean up.
    pub fn noop() -> Self {
        Self { cleanup: None }
    }

    /// Remove the handler now.
    pub fn unsubscribe(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("armed", &self.cleanup.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn unsubscribe_runs_cleanup_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let guard = Unsubscribe::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        guard.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_guard_runs_cleanup() {
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let counter = Arc::clone(&calls);
            let _guard = Unsubscribe::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn phase_round_trips_through_strings() {
        assert_eq!(TransportPhase::Connected.to_string(), "connected");
        assert_eq!(
            "disconnected".parse::<TransportPhase>().ok(),
            Some(TransportPhase::Disconnected)
        );
    }
}
