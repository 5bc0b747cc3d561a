// ── Reactive record table ──
//
// Concurrent storage keyed by parameter id, with a `watch` snapshot of
// every record in first-seen order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use tokio::sync::watch;

use crate::model::ParameterRecord;

pub(crate) type RecordSnapshot = Arc<Vec<Arc<ParameterRecord>>>;

/// One stored record plus its position in the published snapshot.
pub(super) struct Slot {
    pub(super) ordinal: u64,
    pub(super) record: Arc<ParameterRecord>,
}

impl Slot {
    /// Copy-on-write access; readers holding the published `Arc` keep
    /// their version.
    pub(super) fn record_mut(&mut self) -> &mut ParameterRecord {
        Arc::make_mut(&mut self.record)
    }
}

pub(super) struct RecordTable {
    by_id: DashMap<String, Slot>,
    next_ordinal: AtomicU64,
    snapshot: watch::Sender<RecordSnapshot>,
}

impl RecordTable {
    pub(super) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_id: DashMap::new(),
            next_ordinal: AtomicU64::new(0),
            snapshot,
        }
    }

    pub(super) fn get(&self, id: &str) -> Option<Arc<ParameterRecord>> {
        self.by_id.get(id).map(|slot| Arc::clone(&slot.record))
    }

    /// Exclusive access to one slot. The guard must be dropped before
    /// calling [`publish`](Self::publish).
    pub(super) fn get_mut(&self, id: &str) -> Option<RefMut<'_, String, Slot>> {
        self.by_id.get_mut(id)
    }

    pub(super) fn entry(&self, id: &str) -> Entry<'_, String, Slot> {
        self.by_id.entry(id.to_owned())
    }

    pub(super) fn slot(&self, record: ParameterRecord) -> Slot {
        Slot {
            ordinal: self.next_ordinal.fetch_add(1, Ordering::Relaxed),
            record: Arc::new(record),
        }
    }

    pub(super) fn len(&self) -> usize {
        self.by_id.len()
    }

    pub(super) fn snapshot(&self) -> RecordSnapshot {
        self.snapshot.borrow().clone()
    }

    pub(super) fn subscribe(&self) -> watch::Receiver<RecordSnapshot> {
        self.snapshot.subscribe()
    }

    /// Rebuild the snapshot and notify subscribers.
    ///
    /// Records are collected while the watch lock is held, so concurrent
    /// publishers are serialized and a later publication never carries
    /// older state than an earlier one.
    pub(super) fn publish(&self) {
        self.snapshot.send_modify(|snap| {
            let mut slots: Vec<(u64, Arc<ParameterRecord>)> = self
                .by_id
                .iter()
                .map(|slot| (slot.ordinal, Arc::clone(&slot.record)))
                .collect();
            slots.sort_unstable_by_key(|(ordinal, _)| *ordinal);
            *snap = Arc::new(slots.into_iter().map(|(_, record)| record).collect());
        });
    }
}
