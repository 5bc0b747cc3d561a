// ── Parameter records ──
//
// One record per parameter. All ordering arbitration between optimistic
// writes, their settlements, push events and snapshots happens in the
// transition methods below; the store applies them under its per-entry
// lock and the components only decide *which* transition to run.

use std::collections::BTreeMap;
use std::ops::Bound;

use serde::Serialize;

use super::{ParamValue, ParameterDescriptor};
use crate::normalize;

// ── PendingWrite ─────────────────────────────────────────────────────

/// Lifecycle of an optimistic write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum WriteStatus {
    InFlight,
    /// Confirmed and folded into the authoritative value.
    Resolved,
    /// Failed; the visible value went back to the authoritative one.
    RolledBack,
    /// Settled after a newer update had already landed; state untouched.
    Discarded,
}

/// Bookkeeping for one optimistic write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingWrite {
    pub requested_value: ParamValue,
    pub local_seq: u64,
    pub snapshot_before_write: ParamValue,
    pub status: WriteStatus,
}

/// Result of offering a push event to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemoteOutcome {
    Applied,
    /// Token not newer than what was already applied.
    Stale,
    /// Token equal to an in-flight write's sequence; the write wins.
    Tie,
}

// ── ParameterRecord ──────────────────────────────────────────────────

/// The engine's view of one parameter.
///
/// Consumers only ever hold clones; the store owns the live copy.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRecord {
    pub(crate) descriptor: ParameterDescriptor,
    pub(crate) speculative: bool,
    pub(crate) authoritative_value: ParamValue,
    pub(crate) current_value: ParamValue,
    /// Newest update folded in, local writes and remote tokens alike.
    pub(crate) last_applied_seq: u64,
    /// Newest token seen from the remote side through events or snapshots.
    pub(crate) last_remote_seq: u64,
    pub(crate) last_local_seq: u64,
    /// Writes issued but not yet settled, keyed by local sequence.
    pub(crate) in_flight: BTreeMap<u64, PendingWrite>,
}

impl ParameterRecord {
    pub(crate) fn from_snapshot(
        descriptor: ParameterDescriptor,
        value: ParamValue,
        seq: Option<u64>,
    ) -> Self {
        Self {
            descriptor,
            speculative: false,
            authoritative_value: value,
            current_value: value,
            last_applied_seq: seq.unwrap_or(0),
            last_remote_seq: seq.unwrap_or(0),
            last_local_seq: 0,
            in_flight: BTreeMap::new(),
        }
    }

    pub(crate) fn speculative(id: &str) -> Self {
        let descriptor = ParameterDescriptor::speculative(id);
        let value = ParamValue::Float(descriptor.default);
        Self {
            speculative: true,
            ..Self::from_snapshot(descriptor, value, None)
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &ParameterDescriptor {
        &self.descriptor
    }

    /// `true` until the snapshot has supplied real metadata.
    pub fn is_speculative(&self) -> bool {
        self.speculative
    }

    /// What the UI should show.
    pub fn current_value(&self) -> ParamValue {
        self.current_value
    }

    /// Last value confirmed by the remote side.
    pub fn authoritative_value(&self) -> ParamValue {
        self.authoritative_value
    }

    pub fn last_applied_seq(&self) -> u64 {
        self.last_applied_seq
    }

    pub fn last_remote_seq(&self) -> u64 {
        self.last_remote_seq
    }

    /// The newest write still awaiting settlement.
    pub fn pending_write(&self) -> Option<&PendingWrite> {
        self.in_flight.values().next_back()
    }

    /// All unsettled writes, oldest first.
    pub fn in_flight_writes(&self) -> impl Iterator<Item = &PendingWrite> {
        self.in_flight.values()
    }

    pub fn has_pending_write(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Current value rendered for display.
    pub fn display_value(&self) -> String {
        normalize::display(&self.descriptor, self.current_value)
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Show `value` immediately and register it as in flight.
    ///
    /// The sequence is allocated above everything issued *or applied* so
    /// far, which keeps local writes and remote tokens on one timeline.
    pub(crate) fn begin_write(&mut self, value: ParamValue) -> PendingWrite {
        let local_seq = self.last_local_seq.max(self.last_applied_seq) + 1;
        self.last_local_seq = local_seq;

        let write = PendingWrite {
            requested_value: value,
            local_seq,
            snapshot_before_write: self.authoritative_value,
            status: WriteStatus::InFlight,
        };
        self.in_flight.insert(local_seq, write.clone());
        self.current_value = value;
        write
    }

    /// Fold the remote outcome of write `local_seq` into the record.
    ///
    /// A failure only rolls back when nothing newer (a later local write
    /// still in flight or already applied, or a push event with a higher
    /// token) has landed since the write was issued. A rollback restores
    /// the authoritative value, which push events keep fresh while the
    /// write is pending, so it never resurrects an older state than the
    /// remote has confirmed.
    pub(crate) fn settle_write(&mut self, local_seq: u64, succeeded: bool) -> WriteStatus {
        let Some(write) = self.in_flight.remove(&local_seq) else {
            return WriteStatus::Discarded;
        };

        let newer_in_flight = self
            .in_flight
            .keys()
            .next_back()
            .is_some_and(|&seq| seq > local_seq);
        let newer_applied = self.last_applied_seq > local_seq;

        let status = if succeeded {
            if newer_applied {
                WriteStatus::Discarded
            } else {
                self.authoritative_value = write.requested_value;
                self.last_applied_seq = local_seq;
                WriteStatus::Resolved
            }
        } else if newer_in_flight || newer_applied {
            WriteStatus::Discarded
        } else {
            WriteStatus::RolledBack
        };

        self.refresh_current();
        status
    }

    /// Offer a push event carrying `value` with ordering token `seq`.
    ///
    /// Staleness is judged against remote tokens only; local sequences,
    /// including those burned by rejected writes, never count.
    pub(crate) fn apply_remote(&mut self, value: ParamValue, seq: u64) -> RemoteOutcome {
        if seq <= self.last_remote_seq {
            return RemoteOutcome::Stale;
        }
        if self.in_flight.contains_key(&seq) {
            return RemoteOutcome::Tie;
        }

        self.authoritative_value = value;
        self.last_remote_seq = seq;
        self.last_applied_seq = self.last_applied_seq.max(seq);
        if self.in_flight.is_empty() {
            self.current_value = value;
        }
        RemoteOutcome::Applied
    }

    /// Merge a snapshot entry. Metadata is always refreshed. The value is
    /// skipped when the entry's token is older than a remote update already
    /// applied, and the visible value only moves when no write is in flight.
    /// Entries without a token are taken as-is.
    ///
    /// Returns `false` when the value was skipped as stale.
    pub(crate) fn apply_snapshot(
        &mut self,
        descriptor: ParameterDescriptor,
        value: ParamValue,
        seq: Option<u64>,
    ) -> bool {
        self.descriptor = descriptor;
        self.speculative = false;
        if let Some(seq) = seq {
            if seq < self.last_remote_seq {
                return false;
            }
            self.last_remote_seq = seq;
            self.last_applied_seq = self.last_applied_seq.max(seq);
        }
        self.authoritative_value = value;
        if self.in_flight.is_empty() {
            self.current_value = value;
        }
        true
    }

    /// Newest in-flight intent wins; otherwise the authoritative value.
    /// Writes already overtaken by an applied update are bound to be
    /// discarded and never govern the display.
    fn refresh_current(&mut self) {
        let floor = (Bound::Excluded(self.last_applied_seq), Bound::Unbounded);
        self.current_value = self
            .in_flight
            .range(floor)
            .next_back()
            .map_or(self.authoritative_value, |(_, w)| w.requested_value);
    }
}
