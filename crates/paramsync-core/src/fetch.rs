// ── Fetch controller ──
//
// Owns the snapshot lifecycle: wait for the link, fetch, retry under
// backoff, then park until the link drops and resync on the way back up.
// Fetch failures never surface as errors; they only move the connection
// state to `Degraded`.

use std::sync::{Arc, Mutex, PoisonError};

use paramsync_api::{SnapshotResponse, Transport, TransportPhase, WireParameter};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::BackoffConfig;
use crate::error::CoreError;
use crate::model::ConnectionState;
use crate::store::ParameterStore;

/// Where the snapshot lifecycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case", tag = "state")]
#[strum(serialize_all = "kebab-case")]
pub enum FetchState {
    /// Not started, or stopped.
    Idle,
    /// A snapshot call is outstanding. `resync` is set when records were
    /// already seeded by an earlier snapshot.
    Fetching { resync: bool },
    /// The last attempt failed; waiting out the backoff before retry
    /// number `attempt`.
    Retrying { attempt: u32 },
    /// Snapshot applied; following the link until it drops.
    Ready,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub(crate) struct FetchController {
    shared: Arc<FetchShared>,
    running: Mutex<Option<Running>>,
}

struct FetchShared {
    transport: Arc<dyn Transport>,
    store: Arc<ParameterStore>,
    method: String,
    backoff: BackoffConfig,
    state: watch::Sender<FetchState>,
    connection: watch::Sender<ConnectionState>,
}

impl FetchController {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        store: Arc<ParameterStore>,
        method: String,
        backoff: BackoffConfig,
        connection: watch::Sender<ConnectionState>,
    ) -> Self {
        let (state, _) = watch::channel(FetchState::Idle);
        Self {
            shared: Arc::new(FetchShared {
                transport,
                store,
                method,
                backoff,
                state,
                connection,
            }),
            running: Mutex::new(None),
        }
    }

    /// Spawn the fetch loop. No-op while it is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(shared.run(cancel.clone()));
        *running = Some(Running { cancel, handle });
    }

    /// Cancel any outstanding fetch or retry timer and go idle. Idempotent.
    pub(crate) fn stop(&self) {
        let taken = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Running { cancel, handle }) = taken {
            cancel.cancel();
            handle.abort();
            debug!("fetch controller stopped");
        }
        self.shared.state.send_replace(FetchState::Idle);
    }

    pub(crate) fn state(&self) -> watch::Receiver<FetchState> {
        self.shared.state.subscribe()
    }
}

impl FetchShared {
    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut phase = self.transport.phase();

        loop {
            let linked = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                linked = self.await_link(&cancel, &mut phase) => linked,
            };
            if !linked {
                debug!("transport phase channel closed; fetch loop exiting");
                return;
            }

            let fetched = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                fetched = self.fetch_until_ready(&cancel, &mut phase) => fetched,
            };
            if !fetched {
                // Link dropped mid-retry; start over once it is back.
                continue;
            }

            let changed = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                changed = phase.changed() => changed,
            };
            if changed.is_err() {
                return;
            }
            info!("link changed after snapshot; resync on reconnect");
        }
    }

    /// Mirror the transport phase into the connection state until the link
    /// is up. Returns `false` if the transport went away.
    async fn await_link(
        &self,
        cancel: &CancellationToken,
        phase: &mut watch::Receiver<TransportPhase>,
    ) -> bool {
        loop {
            let current = *phase.borrow_and_update();
            let mirrored = match current {
                TransportPhase::Disconnected => ConnectionState::disconnected(),
                // Up, but not usable until the snapshot lands.
                TransportPhase::Connecting | TransportPhase::Connected => {
                    ConnectionState::connecting()
                }
            };
            self.publish_connection(cancel, mirrored);

            if current == TransportPhase::Connected {
                return true;
            }
            if phase.changed().await.is_err() {
                return false;
            }
        }
    }

    /// Fetch until a snapshot is applied. Returns `false` if the link
    /// dropped while retrying.
    async fn fetch_until_ready(
        &self,
        cancel: &CancellationToken,
        phase: &mut watch::Receiver<TransportPhase>,
    ) -> bool {
        let resync = self.store.is_seeded();
        let mut attempt: u32 = 0;

        loop {
            self.publish_state(cancel, FetchState::Fetching { resync });

            let error = match self.fetch_once().await {
                Ok(parameters) => {
                    let stats = self.store.apply_snapshot(&parameters);
                    info!(
                        parameters = parameters.len(),
                        records = self.store.len(),
                        created = stats.created,
                        refreshed = stats.refreshed,
                        held = stats.held,
                        stale = stats.stale,
                        resync,
                        "snapshot applied"
                    );
                    self.publish_connection(cancel, ConnectionState::connected());
                    self.publish_state(cancel, FetchState::Ready);
                    return true;
                }
                Err(e) => e,
            };

            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            warn!(
                error = %error,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "snapshot fetch failed; retrying"
            );
            self.publish_connection(
                cancel,
                ConnectionState::degraded(attempt, Instant::now() + delay),
            );
            self.publish_state(cancel, FetchState::Retrying { attempt });

            tokio::select! {
                biased;
                dropped = link_dropped(phase) => {
                    if dropped {
                        info!(attempt, "link dropped while retrying snapshot");
                    }
                    return false;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn fetch_once(&self) -> Result<Vec<WireParameter>, CoreError> {
        let value = self
            .transport
            .call(&self.method, serde_json::Value::Null)
            .await?;
        let response: SnapshotResponse =
            serde_json::from_value(value).map_err(|e| CoreError::decode("snapshot", &e))?;
        Ok(response.parameters)
    }

    // Both publishers refuse to write once cancelled so a loop that races
    // `stop()` cannot overwrite the idle state.

    fn publish_state(&self, cancel: &CancellationToken, next: FetchState) {
        self.state.send_if_modified(|state| {
            if cancel.is_cancelled() || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    fn publish_connection(&self, cancel: &CancellationToken, next: ConnectionState) {
        self.connection.send_if_modified(|state| {
            if cancel.is_cancelled() || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }
}

/// Resolves once the link leaves `Connected`. `false` means the transport
/// itself went away.
async fn link_dropped(phase: &mut watch::Receiver<TransportPhase>) -> bool {
    phase
        .wait_for(|p| *p != TransportPhase::Connected)
        .await
        .is_ok()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use paramsync_api::{LoopbackTransport, WireParameter};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::ConnectionPhase;

    fn controller(peer: &LoopbackTransport) -> (FetchController, Arc<ParameterStore>, watch::Receiver<ConnectionState>) {
        let store = Arc::new(ParameterStore::new(16));
        let (connection, rx) = watch::channel(ConnectionState::default());
        let fetch = FetchController::new(
            Arc::new(peer.clone()),
            Arc::clone(&store),
            paramsync_api::wire::names::SNAPSHOT.to_owned(),
            BackoffConfig::default(),
            connection,
        );
        (fetch, store, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_link_before_fetching() {
        let peer = LoopbackTransport::new([WireParameter::float("gain", 0.0, 1.0, 0.5)]);
        let (fetch, store, connection) = controller(&peer);

        fetch.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(peer.calls().is_empty());
        assert_eq!(connection.borrow().phase, ConnectionPhase::Disconnected);

        peer.set_phase(TransportPhase::Connected);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*fetch.state().borrow(), FetchState::Ready);
        assert_eq!(connection.borrow().phase, ConnectionPhase::Connected);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_degrade_then_recover() {
        let peer = LoopbackTransport::connected([WireParameter::float("gain", 0.0, 1.0, 0.5)]);
        peer.fail_snapshots(1);
        let (fetch, _store, connection) = controller(&peer);

        fetch.start();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(*fetch.state().borrow(), FetchState::Retrying { attempt: 1 });
        let degraded = connection.borrow().clone();
        assert_eq!(degraded.phase, ConnectionPhase::Degraded);
        assert_eq!(degraded.retry_count, 1);
        assert!(degraded.next_retry_at.is_some());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*fetch.state().borrow(), FetchState::Ready);
        assert_eq!(connection.borrow().phase, ConnectionPhase::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_idles() {
        let peer = LoopbackTransport::connected([]);
        peer.fail_snapshots(u32::MAX);
        let (fetch, _store, _connection) = controller(&peer);

        fetch.start();
        fetch.start();
        tokio::time::sleep(Duration::from_millis(1)).await;
        fetch.stop();
        fetch.stop();
        assert_eq!(*fetch.state().borrow(), FetchState::Idle);

        let calls = peer.calls().len();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(peer.calls().len(), calls, "no retries after stop");
    }
}
