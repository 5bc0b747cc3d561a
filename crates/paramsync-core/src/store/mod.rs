// ── Local parameter store ──
//
// The single owner of every `ParameterRecord`. Components never touch a
// record directly: they call one of the transition methods here, which
// runs the record's state machine under the entry lock, emits a
// `ParameterChange` when the visible value moved, and republishes the
// snapshot.

mod records;
mod snapshot;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::mapref::entry::Entry;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use self::records::RecordTable;
pub(crate) use self::records::RecordSnapshot;
use crate::error::CoreError;
use crate::model::{
    ChangeCause, ParamValue, ParameterChange, ParameterRecord, PendingWrite, RemoteOutcome,
    WriteStatus,
};
use crate::normalize;

pub(crate) struct ParameterStore {
    records: RecordTable,
    changes: broadcast::Sender<ParameterChange>,
    /// Set once the first snapshot has been applied. From then on writes
    /// to unknown ids are rejected instead of creating speculative records.
    seeded: AtomicBool,
    /// Cleared on teardown; every mutation becomes a no-op.
    live: AtomicBool,
}

impl ParameterStore {
    pub(crate) fn new(change_capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(change_capacity.max(1));
        Self {
            records: RecordTable::new(),
            changes,
            seeded: AtomicBool::new(false),
            live: AtomicBool::new(true),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub(crate) fn get(&self, id: &str) -> Option<Arc<ParameterRecord>> {
        self.records.get(id)
    }

    pub(crate) fn snapshot(&self) -> RecordSnapshot {
        self.records.snapshot()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<RecordSnapshot> {
        self.records.subscribe()
    }

    pub(crate) fn subscribe_changes(&self) -> broadcast::Receiver<ParameterChange> {
        self.changes.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_seeded(&self) -> bool {
        self.seeded.load(Ordering::Acquire)
    }

    pub(crate) fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Freeze the store. Records stay readable.
    pub(crate) fn close(&self) {
        self.live.store(false, Ordering::Release);
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Validate `value` and register it as an optimistic write.
    ///
    /// Before the first snapshot an unknown id gets a speculative record
    /// that only requires a finite number; afterwards it is rejected.
    pub(crate) fn begin_write(&self, id: &str, value: ParamValue) -> Result<PendingWrite, CoreError> {
        if !self.is_live() {
            return Err(CoreError::EngineStopped);
        }

        let write = match self.records.entry(id) {
            Entry::Occupied(mut entry) => {
                let slot = entry.get_mut();
                let value = if slot.record.is_speculative() {
                    finite(id, value)?
                } else {
                    normalize::validate(slot.record.descriptor(), value)?
                };
                let record = slot.record_mut();
                let previous = record.current_value();
                let write = record.begin_write(value);
                self.notify(id, Some(previous), record.current_value(), ChangeCause::OptimisticWrite);
                write
            }
            Entry::Vacant(entry) => {
                if self.is_seeded() {
                    return Err(CoreError::UnknownParameter { id: id.to_owned() });
                }
                let value = finite(id, value)?;
                let mut record = ParameterRecord::speculative(id);
                let write = record.begin_write(value);
                entry.insert(self.records.slot(record));
                debug!(id = %id, "speculative record created ahead of snapshot");
                self.notify(id, None, value, ChangeCause::OptimisticWrite);
                write
            }
        };

        self.records.publish();
        Ok(write)
    }

    /// Fold a write's remote outcome into its record. Returns `None` once
    /// the store is closed.
    pub(crate) fn settle_write(&self, id: &str, local_seq: u64, succeeded: bool) -> Option<WriteStatus> {
        self.mutate(id, |record| {
            let status = record.settle_write(local_seq, succeeded);
            let cause = match status {
                WriteStatus::Resolved => ChangeCause::WriteConfirmed,
                WriteStatus::RolledBack | WriteStatus::Discarded | WriteStatus::InFlight => {
                    ChangeCause::Rollback
                }
            };
            (status, cause)
        })
    }

    /// Offer a pushed value to a record. Returns `None` for unknown ids or
    /// a closed store.
    pub(crate) fn apply_remote(&self, id: &str, raw: f64, seq: u64) -> Option<RemoteOutcome> {
        self.mutate(id, |record| {
            let value = normalize::coerce(record.descriptor(), raw);
            (record.apply_remote(value, seq), ChangeCause::RemoteEvent)
        })
    }

    fn mutate<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut ParameterRecord) -> (R, ChangeCause),
    ) -> Option<R> {
        if !self.is_live() {
            return None;
        }

        let result = {
            let mut slot = self.records.get_mut(id)?;
            let record = slot.record_mut();
            let previous = record.current_value();
            let (result, cause) = f(record);
            self.notify(id, Some(previous), record.current_value(), cause);
            result
        };

        self.records.publish();
        Some(result)
    }

    /// Broadcast a change if the visible value moved. Called with the entry
    /// lock held so per-parameter notifications stay in order.
    fn notify(&self, id: &str, previous: Option<ParamValue>, current: ParamValue, cause: ChangeCause) {
        if previous == Some(current) {
            return;
        }
        // No receivers is fine.
        let _ = self.changes.send(ParameterChange {
            id: id.to_owned(),
            previous,
            current,
            cause,
        });
    }
}

fn finite(id: &str, value: ParamValue) -> Result<ParamValue, CoreError> {
    if value.as_f64().is_finite() {
        Ok(value)
    } else {
        Err(CoreError::validation(id, "value is not a finite number"))
    }
}
