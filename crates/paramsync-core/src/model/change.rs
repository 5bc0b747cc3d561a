// ── Change notifications ──

use serde::Serialize;

use super::ParamValue;

/// What moved a parameter's visible value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ChangeCause {
    Snapshot,
    RemoteEvent,
    OptimisticWrite,
    WriteConfirmed,
    Rollback,
}

/// Emitted whenever a record's current value changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterChange {
    pub id: String,
    /// `None` the first time a parameter appears.
    pub previous: Option<ParamValue>,
    pub current: ParamValue,
    pub cause: ChangeCause,
}
