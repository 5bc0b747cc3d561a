// ── Snapshot merge ──
//
// Seeds or refreshes records from a full snapshot. Records are merged in
// place, never pruned: a parameter missing from a later snapshot keeps
// its last known state until the engine is torn down.

use std::sync::atomic::Ordering;

use dashmap::mapref::entry::Entry;
use paramsync_api::WireParameter;

use super::ParameterStore;
use crate::convert;
use crate::model::{ChangeCause, ParameterRecord};

/// What a snapshot merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct MergeStats {
    pub(crate) created: usize,
    pub(crate) refreshed: usize,
    /// Records whose visible value was held back by an in-flight write.
    pub(crate) held: usize,
    /// Entries older than a remote update the record already applied.
    pub(crate) stale: usize,
}

impl ParameterStore {
    /// Merge `parameters` into the store and mark it seeded.
    ///
    /// Applying the same snapshot twice is a no-op for records without a
    /// pending write: no change notification fires.
    pub(crate) fn apply_snapshot(&self, parameters: &[WireParameter]) -> MergeStats {
        let mut stats = MergeStats::default();
        if !self.is_live() {
            return stats;
        }

        for wire in parameters {
            let (descriptor, value, seq) = convert::from_wire(wire);
            let id = descriptor.id.clone();

            match self.records.entry(&id) {
                Entry::Occupied(mut entry) => {
                    let record = entry.get_mut().record_mut();
                    let previous = record.current_value();
                    if record.has_pending_write() {
                        stats.held += 1;
                    }
                    if !record.apply_snapshot(descriptor, value, seq) {
                        stats.stale += 1;
                    }
                    self.notify(&id, Some(previous), record.current_value(), ChangeCause::Snapshot);
                    stats.refreshed += 1;
                }
                Entry::Vacant(entry) => {
                    let record = ParameterRecord::from_snapshot(descriptor, value, seq);
                    entry.insert(self.records.slot(record));
                    self.notify(&id, None, value, ChangeCause::Snapshot);
                    stats.created += 1;
                }
            }
        }

        self.seeded.store(true, Ordering::Release);
        self.records.publish();
        stats
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use paramsync_api::WireParameter;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::ParamValue;

    fn params() -> Vec<WireParameter> {
        vec![
            WireParameter::float("gain", 0.0, 1.0, 0.5).with_value(0.6),
            WireParameter::toggle("bypass", false),
        ]
    }

    #[test]
    fn first_snapshot_seeds_records() {
        let store = ParameterStore::new(16);
        let stats = store.apply_snapshot(&params());

        assert_eq!(stats.created, 2);
        assert!(store.is_seeded());
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("gain").unwrap().current_value(), ParamValue::Float(0.6));
    }

    #[test]
    fn repeated_snapshot_is_silent() {
        let store = ParameterStore::new(16);
        store.apply_snapshot(&params());
        let before = store.snapshot();
        let mut rx = store.subscribe_changes();

        let stats = store.apply_snapshot(&params());
        assert_eq!(stats.refreshed, 2);
        assert!(rx.try_recv().is_err());

        let after = store.snapshot();
        let values = |snap: &crate::store::RecordSnapshot| {
            snap.iter().map(|r| r.current_value()).collect::<Vec<_>>()
        };
        assert_eq!(values(&before), values(&after));
    }

    #[test]
    fn snapshot_does_not_override_pending_write() {
        let store = ParameterStore::new(16);
        store.apply_snapshot(&params());
        store.begin_write("gain", ParamValue::Float(0.9)).unwrap();

        let stats = store.apply_snapshot(&[WireParameter::float("gain", 0.0, 1.0, 0.5).with_value(0.1)]);
        assert_eq!(stats.held, 1);

        let record = store.get("gain").unwrap();
        assert_eq!(record.current_value(), ParamValue::Float(0.9));
        assert_eq!(record.authoritative_value(), ParamValue::Float(0.1));
    }

    #[test]
    fn older_entry_does_not_revert_newer_event() {
        let store = ParameterStore::new(16);
        let mut gain = WireParameter::float("gain", 0.0, 1.0, 0.5).with_value(0.6);
        gain.seq = Some(3);
        store.apply_snapshot(&[gain.clone()]);
        store.apply_remote("gain", 0.9, 5).unwrap();
        let mut rx = store.subscribe_changes();

        gain.value = Some(0.4);
        gain.seq = Some(4);
        let stats = store.apply_snapshot(&[gain]);

        assert_eq!(stats.stale, 1);
        assert!(rx.try_recv().is_err());
        let record = store.get("gain").unwrap();
        assert_eq!(record.current_value(), ParamValue::Float(0.9));
        assert_eq!(record.authoritative_value(), ParamValue::Float(0.9));
    }

    #[test]
    fn missing_parameters_are_kept() {
        let store = ParameterStore::new(16);
        store.apply_snapshot(&params());
        store.apply_snapshot(&[WireParameter::toggle("bypass", true)]);

        assert!(store.get("gain").is_some());
        assert_eq!(store.get("bypass").unwrap().current_value(), ParamValue::Bool(true));
    }

    #[test]
    fn speculative_record_gets_real_descriptor() {
        let store = ParameterStore::new(16);
        store.begin_write("gain", ParamValue::Float(0.7)).unwrap();

        store.apply_snapshot(&params());
        let record = store.get("gain").unwrap();
        assert!(!record.is_speculative());
        assert_eq!(record.descriptor().max, 1.0);
        assert_eq!(record.current_value(), ParamValue::Float(0.7));
    }
}
