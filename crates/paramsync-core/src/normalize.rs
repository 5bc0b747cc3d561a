// ── Value normalizer ──
//
// Pure helpers that map raw numbers onto a descriptor's domain and back
// into display strings. No state, no side effects.

use crate::error::CoreError;
use crate::model::{ParamKind, ParamValue, ParameterDescriptor};

/// Unit string that switches [`format`] to percentage rendering.
pub const PERCENT_UNIT: &str = "%";

/// Clamp `value` into `[min, max]`. Tolerates inverted bounds.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    if value < lo {
        lo
    } else if value > hi {
        hi
    } else {
        value
    }
}

/// Numeric truthiness: anything at or above one half is `true`.
pub fn to_bool(value: f64) -> bool {
    value >= 0.5
}

/// Round `value` to a variant index, or `None` when it falls outside
/// `0..variant_count`.
#[allow(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn to_enum_index(value: f64, variant_count: usize) -> Option<usize> {
    if !value.is_finite() {
        return None;
    }
    let rounded = value.round();
    if rounded < 0.0 || rounded >= variant_count as f64 {
        return None;
    }
    Some(rounded as usize)
}

/// Render a number with its unit.
///
/// Percent units scale by 100 and drop the fraction; everything else gets
/// two decimals and a space-separated suffix.
pub fn format(value: f64, unit: Option<&str>) -> String {
    match unit {
        Some(PERCENT_UNIT) => format!("{:.0}%", value * 100.0),
        Some(unit) if !unit.is_empty() => format!("{value:.2} {unit}"),
        _ => format!("{value:.2}"),
    }
}

/// Map a wire number onto the descriptor's domain without rejecting.
///
/// Used for values the remote side reports: it is authoritative, so an
/// out-of-range enum index is pinned to the nearest variant rather than
/// dropped.
#[allow(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn coerce(descriptor: &ParameterDescriptor, raw: f64) -> ParamValue {
    match descriptor.kind {
        ParamKind::Float => ParamValue::Float(clamp(raw, descriptor.min, descriptor.max)),
        ParamKind::Bool => ParamValue::Bool(to_bool(raw)),
        ParamKind::Enum => {
            let last = descriptor.variant_count().saturating_sub(1);
            let index = if raw.is_finite() {
                clamp(raw.round(), 0.0, last as f64) as usize
            } else {
                0
            };
            ParamValue::Enum(index)
        }
    }
}

/// Check a caller-supplied value against the descriptor's domain.
///
/// Floats are clamped into range. Booleans accept a bool or a number.
/// Enums accept an index or a number that rounds to one, and reject
/// anything out of range.
pub fn validate(descriptor: &ParameterDescriptor, value: ParamValue) -> Result<ParamValue, CoreError> {
    let id = descriptor.id.as_str();
    if !value.as_f64().is_finite() {
        return Err(CoreError::validation(id, "value is not a finite number"));
    }

    match (descriptor.kind, value) {
        (ParamKind::Float, ParamValue::Float(v)) => {
            Ok(ParamValue::Float(clamp(v, descriptor.min, descriptor.max)))
        }
        (ParamKind::Bool, ParamValue::Bool(_)) => Ok(value),
        (ParamKind::Bool, ParamValue::Float(v)) => Ok(ParamValue::Bool(to_bool(v))),
        (ParamKind::Enum, ParamValue::Enum(_) | ParamValue::Float(_)) => {
            let count = descriptor.variant_count();
            to_enum_index(value.as_f64(), count)
                .map(ParamValue::Enum)
                .ok_or_else(|| {
                    CoreError::validation(
                        id,
                        format!("variant index {} out of range 0..{count}", value.as_f64()),
                    )
                })
        }
        (kind, other) => Err(CoreError::validation(
            id,
            format!("expected a {kind} value, got {other}"),
        )),
    }
}

/// Human-readable rendering of `value` under `descriptor`.
pub fn display(descriptor: &ParameterDescriptor, value: ParamValue) -> String {
    match value {
        ParamValue::Float(v) => format(v, descriptor.unit.as_deref()),
        ParamValue::Bool(true) => "on".to_owned(),
        ParamValue::Bool(false) => "off".to_owned(),
        ParamValue::Enum(i) => descriptor
            .variants
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("#{i}")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn descriptor(kind: ParamKind) -> ParameterDescriptor {
        let variants = match kind {
            ParamKind::Enum => vec!["clean".into(), "warm".into(), "fuzz".into()],
            _ => Vec::new(),
        };
        ParameterDescriptor {
            id: "p".into(),
            name: "P".into(),
            kind,
            min: 0.0,
            max: 1.0,
            default: 0.0,
            unit: None,
            variants,
        }
    }

    #[test]
    fn clamp_pins_to_bounds() {
        assert_eq!(clamp(1.5, 0.0, 1.0), 1.0);
        assert_eq!(clamp(-0.2, 0.0, 1.0), 0.0);
        assert_eq!(clamp(0.3, 0.0, 1.0), 0.3);
        assert_eq!(clamp(5.0, 1.0, 0.0), 1.0);
    }

    #[test]
    fn bool_threshold_is_one_half() {
        assert!(to_bool(0.5));
        assert!(to_bool(1.0));
        assert!(!to_bool(0.49));
    }

    #[test]
    fn enum_index_is_bound_checked() {
        assert_eq!(to_enum_index(1.4, 3), Some(1));
        assert_eq!(to_enum_index(2.0, 3), Some(2));
        assert_eq!(to_enum_index(2.6, 3), None);
        assert_eq!(to_enum_index(-1.0, 3), None);
        assert_eq!(to_enum_index(0.0, 0), None);
        assert_eq!(to_enum_index(f64::NAN, 3), None);
    }

    #[test]
    fn format_scales_percentages() {
        assert_eq!(format(0.42, Some("%")), "42%");
        assert_eq!(format(-6.0, Some("dB")), "-6.00 dB");
        assert_eq!(format(0.126, None), "0.13");
        assert_eq!(format(3.0, Some("")), "3.00");
    }

    #[test]
    fn validate_clamps_floats() {
        let d = descriptor(ParamKind::Float);
        assert_eq!(validate(&d, ParamValue::Float(1.7)).unwrap(), ParamValue::Float(1.0));
    }

    #[test]
    fn validate_rejects_non_finite() {
        let d = descriptor(ParamKind::Float);
        let err = validate(&d, ParamValue::Float(f64::NAN)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn validate_rejects_out_of_range_enum() {
        let d = descriptor(ParamKind::Enum);
        assert_eq!(validate(&d, ParamValue::Enum(2)).unwrap(), ParamValue::Enum(2));
        assert_eq!(validate(&d, ParamValue::Float(1.2)).unwrap(), ParamValue::Enum(1));
        assert!(validate(&d, ParamValue::Enum(3)).unwrap_err().is_validation());
    }

    #[test]
    fn validate_converts_numbers_to_bool() {
        let d = descriptor(ParamKind::Bool);
        assert_eq!(validate(&d, ParamValue::Float(0.9)).unwrap(), ParamValue::Bool(true));
        assert!(validate(&descriptor(ParamKind::Float), ParamValue::Bool(true)).is_err());
    }

    #[test]
    fn coerce_pins_remote_enum_values() {
        let d = descriptor(ParamKind::Enum);
        assert_eq!(coerce(&d, 7.0), ParamValue::Enum(2));
        assert_eq!(coerce(&d, -3.0), ParamValue::Enum(0));
    }

    #[test]
    fn display_uses_labels() {
        assert_eq!(display(&descriptor(ParamKind::Enum), ParamValue::Enum(1)), "warm");
        assert_eq!(display(&descriptor(ParamKind::Bool), ParamValue::Bool(true)), "on");
        assert_eq!(display(&descriptor(ParamKind::Enum), ParamValue::Enum(9)), "#9");
    }
}
