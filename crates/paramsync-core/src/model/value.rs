// ── Typed parameter values ──

use std::fmt;

use serde::{Deserialize, Serialize};

/// A parameter value in its domain type.
///
/// On the wire every value is a plain number; [`as_f64`](Self::as_f64)
/// gives that encoding back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ParamValue {
    Float(f64),
    Bool(bool),
    /// Variant index.
    Enum(usize),
}

impl ParamValue {
    /// Wire encoding: booleans as `0.0`/`1.0`, enums as their index.
    #[allow(clippy::as_conversions, clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Float(v) => v,
            Self::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Enum(i) => i as f64,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_index(self) -> Option<usize> {
        match self {
            Self::Enum(i) => Some(i),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Enum(i) => write!(f, "#{i}"),
        }
    }
}
