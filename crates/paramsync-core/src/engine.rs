// ── Engine ──
//
// Full lifecycle management for one remote parameter set. Wires the
// store to the fetch controller, the subscription wiring and the write
// reconciler, and is the only surface consumers see.

use std::sync::Arc;

use paramsync_api::Transport;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::fetch::{FetchController, FetchState};
use crate::model::{ConnectionState, ParamValue, ParameterChange, ParameterRecord};
use crate::reconciler::{WriteHandle, WriteReconciler};
use crate::store::ParameterStore;
use crate::stream::ParameterStream;
use crate::subscription::SubscriptionWiring;

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<EngineInner>`. Create one per remote peer,
/// call [`start`](Self::start), read and write parameters, and call
/// [`shutdown`](Self::shutdown) on the way out.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: Arc<ParameterStore>,
    fetch: FetchController,
    subscriptions: SubscriptionWiring,
    reconciler: WriteReconciler,
    connection_state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(transport: Arc<dyn Transport>, config: EngineConfig) -> Self {
        let store = Arc::new(ParameterStore::new(config.change_channel_capacity));
        let (connection_state, _) = watch::channel(ConnectionState::disconnected());

        let fetch = FetchController::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            config.snapshot_method,
            config.backoff,
            connection_state.clone(),
        );
        let subscriptions = SubscriptionWiring::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            config.changed_event,
            config.bulk_changed_event,
        );
        let reconciler = WriteReconciler::new(transport, Arc::clone(&store), config.write_method);

        Self {
            inner: Arc::new(EngineInner {
                store,
                fetch,
                subscriptions,
                reconciler,
                connection_state,
                cancel: CancellationToken::new(),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Register event handlers and begin fetching the snapshot.
    ///
    /// Handlers go in first so no change pushed while the snapshot is in
    /// flight is lost. Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::EngineStopped);
        }
        self.inner.subscriptions.start();
        self.inner.fetch.start();
        info!("engine started");
        Ok(())
    }

    /// Tear the engine down. Idempotent.
    ///
    /// Stops fetching and event delivery and freezes the store. Writes
    /// already in flight still settle on the transport, but their outcome
    /// no longer touches any record.
    pub fn shutdown(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.cancel.cancel();
        self.inner.store.close();
        self.inner.fetch.stop();
        self.inner.subscriptions.stop();
        self.inner
            .connection_state
            .send_replace(ConnectionState::disconnected());
        info!("engine shut down");
    }

    pub fn is_running(&self) -> bool {
        !self.inner.cancel.is_cancelled()
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<Arc<ParameterRecord>> {
        self.inner.store.get(id)
    }

    /// Every record, in the order the parameters first appeared.
    pub fn get_all(&self) -> Arc<Vec<Arc<ParameterRecord>>> {
        self.inner.store.snapshot()
    }

    /// Current value of `id` rendered for display.
    pub fn display(&self, id: &str) -> Option<String> {
        self.get(id).map(|record| record.display_value())
    }

    pub fn connection_status(&self) -> ConnectionState {
        self.inner.connection_state.borrow().clone()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    pub fn fetch_state(&self) -> watch::Receiver<FetchState> {
        self.inner.fetch.state()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Optimistically set `id` to `value`.
    ///
    /// On `Ok` the new value is already visible through [`get`](Self::get);
    /// await the handle for the remote outcome.
    pub fn set(&self, id: &str, value: impl Into<ParamValue>) -> Result<WriteHandle, CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::EngineStopped);
        }
        self.inner.reconciler.write(id, value.into()).inspect_err(|e| {
            debug!(id = %id, error = %e, "write rejected");
        })
    }

    // ── Change notification ──────────────────────────────────────────

    /// Every change to any record's visible value.
    pub fn changes(&self) -> broadcast::Receiver<ParameterChange> {
        self.inner.store.subscribe_changes()
    }

    /// Watch-backed view of all records.
    pub fn parameters(&self) -> ParameterStream {
        ParameterStream::new(self.inner.store.subscribe())
    }

    /// Invoke `callback` for every change until the returned subscription
    /// is dropped, unsubscribed, or the engine shuts down.
    ///
    /// Callbacks run on a background task, in the order changes happened.
    /// Must be called from within a Tokio runtime.
    pub fn on_change<F>(&self, callback: F) -> ChangeSubscription
    where
        F: Fn(&ParameterChange) + Send + Sync + 'static,
    {
        let mut rx = self.changes();
        let cancel = self.inner.cancel.child_token();
        let token = cancel.clone();

        tokio::spawn(async move {
            loop {
                let change = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    change = rx.recv() => change,
                };
                match change {
                    Ok(change) => callback(&change),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "change listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        ChangeSubscription { cancel }
    }
}

// ── ChangeSubscription ───────────────────────────────────────────────

/// Keeps an [`Engine::on_change`] callback registered.
#[derive(Debug)]
#[must_use = "dropping a ChangeSubscription unregisters the callback"]
pub struct ChangeSubscription {
    cancel: CancellationToken,
}

impl ChangeSubscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
