// ── Write reconciler ──
//
// Turns `set` calls into optimistic writes: validate, show the value,
// issue the remote call, then fold the outcome back into the record once
// it settles. Everything up to issuing the call happens synchronously in
// the caller, so the new value is visible before `set` returns.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use paramsync_api::{SetRequest, Transport, TransportError, TransportPhase};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{ParamValue, WriteStatus};
use crate::store::ParameterStore;

pub(crate) struct WriteReconciler {
    transport: Arc<dyn Transport>,
    store: Arc<ParameterStore>,
    method: String,
}

impl WriteReconciler {
    pub(crate) fn new(transport: Arc<dyn Transport>, store: Arc<ParameterStore>, method: String) -> Self {
        Self {
            transport,
            store,
            method,
        }
    }

    /// Issue an optimistic write.
    ///
    /// Synchronous rejections (validation, unknown id, stopped engine, link
    /// down) leave the store untouched and never reach the transport.
    pub(crate) fn write(&self, id: &str, value: ParamValue) -> Result<WriteHandle, CoreError> {
        if !self.store.is_live() {
            return Err(CoreError::EngineStopped);
        }
        if *self.transport.phase().borrow() != TransportPhase::Connected {
            return Err(TransportError::NotConnected.into());
        }

        let write = self.store.begin_write(id, value)?;
        let local_seq = write.local_seq;
        let args = serde_json::to_value(SetRequest {
            id: id.to_owned(),
            value: write.requested_value.as_f64(),
        })
        .map_err(|e| CoreError::Internal(format!("encode set request: {e}")))?;

        debug!(id = %id, seq = local_seq, value = %write.requested_value, "write issued");
        let call = self.transport.call(&self.method, args);

        let store = Arc::clone(&self.store);
        let id = id.to_owned();
        let task = tokio::spawn(async move {
            let outcome = call.await;
            match store.settle_write(&id, local_seq, outcome.is_ok()) {
                Some(WriteStatus::RolledBack) => {
                    if let Err(e) = &outcome {
                        warn!(id = %id, seq = local_seq, error = %e, "write failed; rolled back");
                    }
                }
                Some(WriteStatus::Discarded) => {
                    debug!(id = %id, seq = local_seq, "write settled after a newer update; discarded");
                }
                Some(status) => debug!(id = %id, seq = local_seq, %status, "write settled"),
                None => info!(id = %id, seq = local_seq, "write settled after shutdown; ignored"),
            }
            outcome.map(|_| ()).map_err(CoreError::from)
        });

        Ok(WriteHandle { local_seq, task })
    }
}

// ── WriteHandle ──────────────────────────────────────────────────────

/// Remote outcome of one write.
///
/// Resolves once the transport settles the call: `Ok(())` on success, the
/// transport error otherwise, whether or not a rollback happened. Dropping
/// the handle does not cancel the write.
#[derive(Debug)]
#[must_use = "a write handle only reports the outcome; the write proceeds without it"]
pub struct WriteHandle {
    local_seq: u64,
    task: JoinHandle<Result<(), CoreError>>,
}

impl WriteHandle {
    /// Sequence allocated to this write on its parameter.
    pub fn local_seq(&self) -> u64 {
        self.local_seq
    }

    pub fn is_settled(&self) -> bool {
        self.task.is_finished()
    }
}

impl Future for WriteHandle {
    type Output = Result<(), CoreError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task).poll(cx).map(|joined| {
            joined.unwrap_or_else(|e| Err(CoreError::Internal(format!("write task failed: {e}"))))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use paramsync_api::wire::names;
    use paramsync_api::{LoopbackTransport, WireParameter};
    use pretty_assertions::assert_eq;

    use super::*;

    fn setup(peer: &LoopbackTransport) -> (Arc<ParameterStore>, WriteReconciler) {
        let store = Arc::new(ParameterStore::new(16));
        store.apply_snapshot(&[WireParameter::float("gain", 0.0, 1.0, 0.5)]);
        let reconciler = WriteReconciler::new(Arc::new(peer.clone()), Arc::clone(&store), names::SET.into());
        (store, reconciler)
    }

    #[tokio::test]
    async fn successful_write_reaches_peer() {
        let peer = LoopbackTransport::connected([WireParameter::float("gain", 0.0, 1.0, 0.5)]);
        let (store, reconciler) = setup(&peer);

        let handle = reconciler.write("gain", ParamValue::Float(0.8)).unwrap();
        assert_eq!(store.get("gain").unwrap().current_value(), ParamValue::Float(0.8));
        handle.await.unwrap();

        assert_eq!(peer.value("gain"), Some(0.8));
        assert_eq!(store.get("gain").unwrap().authoritative_value(), ParamValue::Float(0.8));
    }

    #[tokio::test]
    async fn failed_write_surfaces_transport_error() {
        let peer = LoopbackTransport::connected([WireParameter::float("gain", 0.0, 1.0, 0.5)]);
        let (store, reconciler) = setup(&peer);
        peer.fail_next_write(TransportError::remote(names::SET, "busy"));

        let err = reconciler.write("gain", ParamValue::Float(0.8)).unwrap().await.unwrap_err();
        assert_eq!(err, CoreError::Transport(TransportError::remote(names::SET, "busy")));
        assert_eq!(store.get("gain").unwrap().current_value(), ParamValue::Float(0.5));
    }

    #[tokio::test]
    async fn disconnected_write_fails_fast() {
        let peer = LoopbackTransport::new([WireParameter::float("gain", 0.0, 1.0, 0.5)]);
        let (store, reconciler) = setup(&peer);

        let err = reconciler.write("gain", ParamValue::Float(0.8)).unwrap_err();
        assert_eq!(err.transport(), Some(&TransportError::NotConnected));
        assert!(peer.calls().is_empty());
        assert!(!store.get("gain").unwrap().has_pending_write());
    }

    #[tokio::test]
    async fn clamped_value_is_sent() {
        let peer = LoopbackTransport::connected([WireParameter::float("gain", 0.0, 1.0, 0.5)]);
        let (_store, reconciler) = setup(&peer);

        reconciler.write("gain", ParamValue::Float(3.0)).unwrap().await.unwrap();
        let sent = peer.calls_to(names::SET);
        assert_eq!(sent[0].args["value"], serde_json::json!(1.0));
    }
}
