//! JSON payloads exchanged with the remote engine.
//!
//! Shapes are deliberately loose on the way in: optional metadata falls
//! back to defaults so an older peer that omits `unit` or `variants` still
//! decodes.

use serde::{Deserialize, Serialize};

/// Default method and event names used by the remote engine.
pub mod names {
    /// Full parameter snapshot.
    pub const SNAPSHOT: &str = "params.snapshot";
    /// Single parameter write.
    pub const SET: &str = "params.set";
    /// One parameter changed on the remote side.
    pub const PARAM_CHANGED: &str = "param.changed";
    /// Several parameters changed at once (preset load, undo, ...).
    pub const PARAMS_CHANGED: &str = "params.changed";
}

// ── Descriptors ──────────────────────────────────────────────────────

/// Parameter type as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireKind {
    Float,
    Bool,
    Enum,
}

/// One entry of a snapshot: descriptor metadata plus the current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireParameter {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: WireKind,
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_max")]
    pub max: f64,
    #[serde(default)]
    pub default: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<String>,
    /// Current value; absent means "still at default".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Ordering token of the last change folded into `value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

fn default_max() -> f64 {
    1.0
}

impl WireParameter {
    /// A float parameter over `[min, max]`.
    pub fn float(id: impl Into<String>, min: f64, max: f64, default: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: WireKind::Float,
            min,
            max,
            default,
            unit: None,
            variants: Vec::new(),
            value: None,
            seq: None,
        }
    }

    /// A boolean toggle.
    pub fn toggle(id: impl Into<String>, default: bool) -> Self {
        Self {
            kind: WireKind::Bool,
            default: if default { 1.0 } else { 0.0 },
            ..Self::float(id, 0.0, 1.0, 0.0)
        }
    }

    /// An enumeration over `variants`.
    pub fn choice(id: impl Into<String>, variants: &[&str], default: usize) -> Self {
        #[allow(clippy::as_conversions, clippy::cast_precision_loss)]
        let (max, default) = (variants.len().saturating_sub(1) as f64, default as f64);
        Self {
            kind: WireKind::Enum,
            variants: variants.iter().map(|v| (*v).to_owned()).collect(),
            ..Self::float(id, 0.0, max, default)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }
}

/// Response body of the snapshot call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotResponse {
    #[serde(default)]
    pub parameters: Vec<WireParameter>,
}

// ── Writes ───────────────────────────────────────────────────────────

/// Arguments of the set call. Values travel as plain numbers: booleans as
/// `0.0`/`1.0`, enums as their variant index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRequest {
    pub id: String,
    pub value: f64,
}

// ── Push events ──────────────────────────────────────────────────────

/// Payload of a single-parameter change event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterChanged {
    pub id: String,
    pub value: f64,
    pub seq: u64,
}

/// Payload of a bulk change event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkChanged {
    #[serde(default)]
    pub changes: Vec<ParameterChanged>,
}
