// ── Wire-to-domain conversions ──
//
// Bridges `paramsync_api::wire` payloads into `crate::model` types. Names
// default to the id, and values are coerced into the descriptor's domain.

use paramsync_api::{WireKind, WireParameter};

use crate::model::{ParamKind, ParamValue, ParameterDescriptor};
use crate::normalize;

impl From<WireKind> for ParamKind {
    fn from(kind: WireKind) -> Self {
        match kind {
            WireKind::Float => Self::Float,
            WireKind::Bool => Self::Bool,
            WireKind::Enum => Self::Enum,
        }
    }
}

impl From<&WireParameter> for ParameterDescriptor {
    fn from(p: &WireParameter) -> Self {
        let name = if p.name.trim().is_empty() {
            p.id.clone()
        } else {
            p.name.clone()
        };
        Self {
            id: p.id.clone(),
            name,
            kind: p.kind.into(),
            min: p.min,
            max: p.max,
            default: p.default,
            unit: p.unit.clone().filter(|u| !u.is_empty()),
            variants: p.variants.clone(),
        }
    }
}

/// Descriptor, coerced current value and ordering token of a snapshot entry.
///
/// A missing value means the peer still holds the default.
pub(crate) fn from_wire(p: &WireParameter) -> (ParameterDescriptor, ParamValue, Option<u64>) {
    let descriptor = ParameterDescriptor::from(p);
    let value = normalize::coerce(&descriptor, p.value.unwrap_or(p.default));
    (descriptor, value, p.seq)
}
