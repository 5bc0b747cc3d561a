// ── Subscription wiring ──
//
// Routes the peer's change events into the store. Handlers run on the
// transport's delivery context and apply synchronously; ordering against
// local writes is settled by each record's sequence check.

use std::sync::{Arc, Mutex, PoisonError};

use paramsync_api::{BulkChanged, EventHandler, ParameterChanged, Transport, Unsubscribe};
use tracing::{debug, trace, warn};

use crate::model::RemoteOutcome;
use crate::store::ParameterStore;

pub(crate) struct SubscriptionWiring {
    transport: Arc<dyn Transport>,
    store: Arc<ParameterStore>,
    changed_event: String,
    bulk_changed_event: String,
    guards: Mutex<Vec<Unsubscribe>>,
}

impl SubscriptionWiring {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        store: Arc<ParameterStore>,
        changed_event: String,
        bulk_changed_event: String,
    ) -> Self {
        Self {
            transport,
            store,
            changed_event,
            bulk_changed_event,
            guards: Mutex::new(Vec::new()),
        }
    }

    /// Register both event handlers. No-op while already registered.
    pub(crate) fn start(&self) {
        let mut guards = self.guards.lock().unwrap_or_else(PoisonError::into_inner);
        if !guards.is_empty() {
            return;
        }

        let store = Arc::clone(&self.store);
        let single: EventHandler = Arc::new(move |payload| {
            match serde_json::from_value::<ParameterChanged>(payload) {
                Ok(change) => apply(&store, &change),
                Err(e) => warn!(error = %e, "malformed change event dropped"),
            }
        });

        let store = Arc::clone(&self.store);
        let bulk: EventHandler = Arc::new(move |payload| {
            match serde_json::from_value::<BulkChanged>(payload) {
                Ok(batch) => {
                    trace!(changes = batch.changes.len(), "bulk change event");
                    for change in &batch.changes {
                        apply(&store, change);
                    }
                }
                Err(e) => warn!(error = %e, "malformed bulk change event dropped"),
            }
        });

        guards.push(self.transport.subscribe(&self.changed_event, single));
        guards.push(self.transport.subscribe(&self.bulk_changed_event, bulk));
        debug!(
            changed = %self.changed_event,
            bulk = %self.bulk_changed_event,
            "event handlers registered"
        );
    }

    /// Unregister both handlers. Idempotent.
    pub(crate) fn stop(&self) {
        let guards = std::mem::take(&mut *self.guards.lock().unwrap_or_else(PoisonError::into_inner));
        if guards.is_empty() {
            return;
        }
        for guard in guards {
            guard.unsubscribe();
        }
        debug!("event handlers removed");
    }
}

fn apply(store: &ParameterStore, change: &ParameterChanged) {
    let id = change.id.as_str();
    match store.apply_remote(id, change.value, change.seq) {
        Some(RemoteOutcome::Applied) => trace!(id = %id, seq = change.seq, "remote change applied"),
        Some(RemoteOutcome::Stale) => debug!(id = %id, seq = change.seq, "stale event discarded"),
        Some(RemoteOutcome::Tie) => {
            debug!(id = %id, seq = change.seq, "event ties an in-flight write; write wins");
        }
        None if store.is_live() => debug!(id = %id, "event for unknown parameter dropped"),
        None => {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use paramsync_api::wire::names;
    use paramsync_api::{LoopbackTransport, WireParameter};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::ParamValue;

    fn wired() -> (LoopbackTransport, Arc<ParameterStore>, SubscriptionWiring) {
        let params = [
            WireParameter::float("gain", 0.0, 1.0, 0.5),
            WireParameter::toggle("bypass", false),
        ];
        let peer = LoopbackTransport::connected(params.clone());
        let store = Arc::new(ParameterStore::new(16));
        store.apply_snapshot(&params);
        let wiring = SubscriptionWiring::new(
            Arc::new(peer.clone()),
            Arc::clone(&store),
            names::PARAM_CHANGED.into(),
            names::PARAMS_CHANGED.into(),
        );
        (peer, store, wiring)
    }

    #[test]
    fn single_event_updates_record() {
        let (peer, store, wiring) = wired();
        wiring.start();

        peer.remote_change("gain", 0.95);
        assert_eq!(store.get("gain").unwrap().current_value(), ParamValue::Float(0.95));
    }

    #[test]
    fn bulk_event_applies_every_change() {
        let (peer, store, wiring) = wired();
        wiring.start();

        peer.push(
            names::PARAMS_CHANGED,
            &BulkChanged {
                changes: vec![
                    ParameterChanged { id: "gain".into(), value: 0.1, seq: 4 },
                    ParameterChanged { id: "bypass".into(), value: 1.0, seq: 5 },
                    ParameterChanged { id: "ghost".into(), value: 1.0, seq: 6 },
                ],
            },
        );
        assert_eq!(store.get("gain").unwrap().current_value(), ParamValue::Float(0.1));
        assert_eq!(store.get("bypass").unwrap().current_value(), ParamValue::Bool(true));
    }

    #[test]
    fn malformed_payload_is_ignored() {
        let (peer, store, wiring) = wired();
        wiring.start();

        peer.push(names::PARAM_CHANGED, &serde_json::json!({ "id": "gain" }));
        assert_eq!(store.get("gain").unwrap().current_value(), ParamValue::Float(0.5));
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let (peer, store, wiring) = wired();
        wiring.start();
        wiring.start();
        assert_eq!(peer.handler_count(names::PARAM_CHANGED), 1);

        wiring.stop();
        wiring.stop();
        assert_eq!(peer.handler_count(names::PARAM_CHANGED), 0);
        assert_eq!(peer.handler_count(names::PARAMS_CHANGED), 0);

        peer.remote_change("gain", 0.2);
        assert_eq!(store.get("gain").unwrap().current_value(), ParamValue::Float(0.5));
    }
}
