// ── Parameter metadata ──

use serde::{Deserialize, Serialize};

use super::ParamValue;

/// Domain type of a parameter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ParamKind {
    Float,
    Bool,
    Enum,
}

/// Immutable metadata for one parameter, as announced by the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub id: String,
    pub name: String,
    pub kind: ParamKind,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub unit: Option<String>,
    /// Variant labels; empty unless `kind` is [`ParamKind::Enum`].
    pub variants: Vec<String>,
}

impl ParameterDescriptor {
    /// Placeholder for a record created by a write that raced ahead of the
    /// first snapshot. Unbounded float, default zero, replaced wholesale
    /// once the snapshot lands.
    pub(crate) fn speculative(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            name: id.to_owned(),
            kind: ParamKind::Float,
            min: f64::MIN,
            max: f64::MAX,
            default: 0.0,
            unit: None,
            variants: Vec::new(),
        }
    }

    /// The descriptor's default, coerced into its domain type.
    pub fn default_value(&self) -> ParamValue {
        crate::normalize::coerce(self, self.default)
    }

    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }
}
