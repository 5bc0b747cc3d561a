//! In-process stand-in for the remote audio engine.
//!
//! [`LoopbackTransport`] keeps a parameter table, answers the snapshot and
//! set calls, and pushes change events to subscribers with a peer-wide,
//! strictly increasing sequence. On top of that it exposes the knobs a test
//! or demo needs to reproduce the awkward cases: phase flips, failing
//! snapshots, failing writes, and snapshots or writes parked until
//! released in a chosen order.
//!
//! # Example
//!
//! ```rust,ignore
//! use paramsync_api::{LoopbackTransport, TransportPhase, WireParameter};
//!
//! let peer = LoopbackTransport::new(vec![WireParameter::float("gain", 0.0, 1.0, 0.5)]);
//! peer.set_phase(TransportPhase::Connected);
//!
//! peer.hold_writes(true);
//! // ... engine issues writes ...
//! for write in peer.held_writes() {
//!     peer.release_write(write.ticket, Ok(()));
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

use crate::error::TransportError;
use crate::transport::{CallFuture, EventHandler, Transport, TransportPhase, Unsubscribe};
use crate::wire::{ParameterChanged, SetRequest, SnapshotResponse, WireParameter, names};

// ── Records ──────────────────────────────────────────────────────────

/// One call observed by the peer, in arrival order.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub method: String,
    pub args: Value,
    pub at: Instant,
}

/// A write parked by [`LoopbackTransport::hold_writes`].
#[derive(Debug, Clone, PartialEq)]
pub struct HeldWrite {
    pub ticket: u64,
    pub id: String,
    pub value: f64,
}

struct ParkedWrite {
    write: HeldWrite,
    respond: oneshot::Sender<Result<Value, TransportError>>,
}

/// A snapshot answer built when the call arrived, delivered on release.
struct ParkedSnapshot {
    response: Result<Value, TransportError>,
    respond: oneshot::Sender<Result<Value, TransportError>>,
}

#[derive(Default)]
struct Faults {
    snapshot_failures: u32,
    write_failures: VecDeque<TransportError>,
}

// ── LoopbackTransport ────────────────────────────────────────────────

/// In-process peer implementing [`Transport`].
///
/// Cheaply cloneable; clones share the same peer state.
#[derive(Clone)]
pub struct LoopbackTransport {
    inner: Arc<LoopbackInner>,
}

struct LoopbackInner {
    parameters: Mutex<IndexMap<String, WireParameter>>,
    handlers: Mutex<HashMap<String, Vec<(u64, EventHandler)>>>,
    next_handler: AtomicU64,
    next_ticket: AtomicU64,
    seq: AtomicU64,
    phase: watch::Sender<TransportPhase>,
    faults: Mutex<Faults>,
    hold_writes: AtomicBool,
    parked: Mutex<Vec<ParkedWrite>>,
    hold_snapshots: AtomicBool,
    parked_snapshots: Mutex<VecDeque<ParkedSnapshot>>,
    calls: Mutex<Vec<CallRecord>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LoopbackTransport {
    /// Create a peer holding `parameters`. Starts disconnected.
    pub fn new(parameters: impl IntoIterator<Item = WireParameter>) -> Self {
        let (phase, _) = watch::channel(TransportPhase::Disconnected);
        let parameters = parameters
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        Self {
            inner: Arc::new(LoopbackInner {
                parameters: Mutex::new(parameters),
                handlers: Mutex::new(HashMap::new()),
                next_handler: AtomicU64::new(1),
                next_ticket: AtomicU64::new(1),
                seq: AtomicU64::new(0),
                phase,
                faults: Mutex::new(Faults::default()),
                hold_writes: AtomicBool::new(false),
                parked: Mutex::new(Vec::new()),
                hold_snapshots: AtomicBool::new(false),
                parked_snapshots: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a peer that is already connected.
    pub fn connected(parameters: impl IntoIterator<Item = WireParameter>) -> Self {
        let peer = Self::new(parameters);
        peer.set_phase(TransportPhase::Connected);
        peer
    }

    // ── Link control ─────────────────────────────────────────────────

    pub fn set_phase(&self, phase: TransportPhase) {
        let changed = self.inner.phase.send_if_modified(|current| {
            let changed = *current != phase;
            *current = phase;
            changed
        });
        if changed {
            tracing::debug!(%phase, "loopback phase change");
        }
    }

    pub fn current_phase(&self) -> TransportPhase {
        *self.inner.phase.borrow()
    }

    // ── Fault injection ──────────────────────────────────────────────

    /// Fail the next `count` snapshot calls.
    pub fn fail_snapshots(&self, count: u32) {
        lock(&self.inner.faults).snapshot_failures = count;
    }

    /// Fail the next write (queued behind any already-armed failures).
    pub fn fail_next_write(&self, error: TransportError) {
        lock(&self.inner.faults).write_failures.push_back(error);
    }

    /// Park incoming writes until [`release_write`](Self::release_write).
    pub fn hold_writes(&self, hold: bool) {
        self.inner.hold_writes.store(hold, Ordering::SeqCst);
    }

    /// Writes currently parked, oldest first.
    pub fn held_writes(&self) -> Vec<HeldWrite> {
        lock(&self.inner.parked)
            .iter()
            .map(|p| p.write.clone())
            .collect()
    }

    /// Settle a parked write. A successful release commits the value to the
    /// peer's table before answering. Returns `false` for an unknown ticket.
    pub fn release_write(&self, ticket: u64, outcome: Result<(), TransportError>) -> bool {
        let parked = {
            let mut parked = lock(&self.inner.parked);
            let Some(pos) = parked.iter().position(|p| p.write.ticket == ticket) else {
                return false;
            };
            parked.remove(pos)
        };

        let response = outcome.map(|()| {
            self.commit(&parked.write.id, parked.write.value);
            Value::Null
        });
        // The engine may have been torn down; nobody left to answer.
        let _ = parked.respond.send(response);
        true
    }

    /// Park snapshot answers until [`release_snapshot`](Self::release_snapshot).
    /// The answer reflects the table at the time of the call, so peer-side
    /// changes made while it is parked are not included.
    pub fn hold_snapshots(&self, hold: bool) {
        self.inner.hold_snapshots.store(hold, Ordering::SeqCst);
    }

    /// Number of snapshot answers currently parked.
    pub fn held_snapshots(&self) -> usize {
        lock(&self.inner.parked_snapshots).len()
    }

    /// Deliver the oldest parked snapshot answer. Returns `false` when none
    /// is parked.
    pub fn release_snapshot(&self) -> bool {
        let Some(parked) = lock(&self.inner.parked_snapshots).pop_front() else {
            return false;
        };
        let _ = parked.respond.send(parked.response);
        true
    }

    // ── Peer-side mutation ───────────────────────────────────────────

    /// Change a value on the peer and push a `param.changed` event.
    /// Returns the sequence the event was stamped with.
    pub fn remote_change(&self, id: &str, value: f64) -> u64 {
        let seq = self.next_seq();
        if let Some(param) = lock(&self.inner.parameters).get_mut(id) {
            param.value = Some(value);
            param.seq = Some(seq);
        }
        self.push(
            names::PARAM_CHANGED,
            &ParameterChanged {
                id: id.to_owned(),
                value,
                seq,
            },
        );
        seq
    }

    /// Change a value on the peer without telling subscribers, as if the
    /// event was lost while disconnected.
    pub fn remote_change_silently(&self, id: &str, value: f64) -> u64 {
        let seq = self.next_seq();
        if let Some(param) = lock(&self.inner.parameters).get_mut(id) {
            param.value = Some(value);
            param.seq = Some(seq);
        }
        seq
    }

    /// Deliver an arbitrary payload to every handler of `event`.
    pub fn push(&self, event: &str, payload: &impl serde::Serialize) {
        let payload = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, event, "loopback: unserializable push payload");
                return;
            }
        };
        // Clone the handler list so handlers may (un)subscribe re-entrantly.
        let handlers: Vec<EventHandler> = lock(&self.inner.handlers)
            .get(event)
            .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        for handler in handlers {
            handler(payload.clone());
        }
    }

    /// Current peer-side value of `id`.
    pub fn value(&self, id: &str) -> Option<f64> {
        lock(&self.inner.parameters)
            .get(id)
            .map(|p| p.value.unwrap_or(p.default))
    }

    // ── Introspection ────────────────────────────────────────────────

    /// Every call received so far.
    pub fn calls(&self) -> Vec<CallRecord> {
        lock(&self.inner.calls).clone()
    }

    /// Calls received for `method`.
    pub fn calls_to(&self, method: &str) -> Vec<CallRecord> {
        lock(&self.inner.calls)
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        lock(&self.inner.handlers).get(event).map_or(0, Vec::len)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn next_seq(&self) -> u64 {
        self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn commit(&self, id: &str, value: f64) {
        let seq = self.next_seq();
        if let Some(param) = lock(&self.inner.parameters).get_mut(id) {
            param.value = Some(value);
            param.seq = Some(seq);
        }
    }

    fn answer_snapshot(&self) -> Result<Value, TransportError> {
        {
            let mut faults = lock(&self.inner.faults);
            if faults.snapshot_failures > 0 {
                faults.snapshot_failures -= 1;
                return Err(TransportError::remote(names::SNAPSHOT, "snapshot unavailable"));
            }
        }
        let parameters = lock(&self.inner.parameters).values().cloned().collect();
        Ok(serde_json::to_value(SnapshotResponse { parameters })?)
    }

    fn park_or_answer_snapshot(&self, method: &str) -> CallFuture {
        let response = self.answer_snapshot();
        if !self.inner.hold_snapshots.load(Ordering::SeqCst) {
            return futures_util::future::ready(response).boxed();
        }

        let (respond, rx) = oneshot::channel();
        lock(&self.inner.parked_snapshots).push_back(ParkedSnapshot { response, respond });
        let method = method.to_owned();
        async move {
            rx.await
                .unwrap_or(Err(TransportError::ConnectionLost { method }))
        }
        .boxed()
    }

    fn answer_set(&self, method: &str, args: Value) -> CallFuture {
        let request: SetRequest = match serde_json::from_value(args) {
            Ok(r) => r,
            Err(e) => return futures_util::future::ready(Err(e.into())).boxed(),
        };

        if !lock(&self.inner.parameters).contains_key(&request.id) {
            let err = TransportError::remote(method, format!("unknown parameter `{}`", request.id));
            return futures_util::future::ready(Err(err)).boxed();
        }

        if self.inner.hold_writes.load(Ordering::SeqCst) {
            let (respond, rx) = oneshot::channel();
            let ticket = self.inner.next_ticket.fetch_add(1, Ordering::SeqCst);
            lock(&self.inner.parked).push(ParkedWrite {
                write: HeldWrite {
                    ticket,
                    id: request.id,
                    value: request.value,
                },
                respond,
            });
            let method = method.to_owned();
            return async move {
                rx.await
                    .unwrap_or(Err(TransportError::ConnectionLost { method }))
            }
            .boxed();
        }

        let armed = lock(&self.inner.faults).write_failures.pop_front();
        let result = match armed {
            Some(err) => Err(err),
            None => {
                self.commit(&request.id, request.value);
                Ok(Value::Null)
            }
        };
        futures_util::future::ready(result).boxed()
    }
}

impl Transport for LoopbackTransport {
    fn call(&self, method: &str, args: Value) -> CallFuture {
        lock(&self.inner.calls).push(CallRecord {
            method: method.to_owned(),
            args: args.clone(),
            at: Instant::now(),
        });

        if *self.inner.phase.borrow() != TransportPhase::Connected {
            return futures_util::future::ready(Err(TransportError::NotConnected)).boxed();
        }

        match method {
            names::SNAPSHOT => self.park_or_answer_snapshot(method),
            names::SET => self.answer_set(method, args),
            other => {
                let err = TransportError::remote(other, "unknown method");
                futures_util::future::ready(Err(err)).boxed()
            }
        }
    }

    fn subscribe(&self, event: &str, handler: EventHandler) -> Unsubscribe {
        let id = self.inner.next_handler.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.handlers)
            .entry(event.to_owned())
            .or_default()
            .push((id, handler));

        let inner = Arc::downgrade(&self.inner);
        let event = event.to_owned();
        Unsubscribe::new(move || {
            if let Some(inner) = inner.upgrade() {
                if let Some(handlers) = lock(&inner.handlers).get_mut(&event) {
                    handlers.retain(|(hid, _)| *hid != id);
                }
            }
        })
    }

    fn phase(&self) -> watch::Receiver<TransportPhase> {
        self.inner.phase.subscribe()
    }
}
