//! Process variable values and addressing.
//!
//! A PV carries exactly one [`PvValue`] at a time. Typed access goes through
//! the [`PvType`] trait, which converts between Rust types and the wire value
//! and reports a [`MxError::TypeMismatch`] naming the PV when the pairing is
//! not representable.

use crate::error::{MxError, MxResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value held by a process variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PvValue {
    /// Floating point value (DBR_DOUBLE)
    Double(f64),
    /// Integer value (DBR_LONG, also used for enums and commands)
    Long(i64),
    /// String value (DBR_STRING)
    Str(String),
}

impl PvValue {
    /// Short label for the stored kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            PvValue::Double(_) => "double",
            PvValue::Long(_) => "long",
            PvValue::Str(_) => "string",
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PvValue::Double(v) => Some(*v),
            PvValue::Long(v) => Some(*v as f64),
            PvValue::Str(_) => None,
        }
    }
}

impl fmt::Display for PvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PvValue::Double(v) => write!(f, "{}", v),
            PvValue::Long(v) => write!(f, "{}", v),
            PvValue::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for PvValue {
    fn from(v: f64) -> Self {
        PvValue::Double(v)
    }
}

impl From<i64> for PvValue {
    fn from(v: i64) -> Self {
        PvValue::Long(v)
    }
}

impl From<&str> for PvValue {
    fn from(v: &str) -> Self {
        PvValue::Str(v.to_string())
    }
}

/// Rust types that can be carried by a PV.
pub trait PvType: Clone + Send + Sync + fmt::Debug + 'static {
    /// Name used in type mismatch errors.
    const TYPE_NAME: &'static str;

    /// Convert into a wire value.
    fn into_pv(self) -> PvValue;

    /// Convert from a wire value read from `pv`.
    fn from_pv(pv: &str, value: PvValue) -> MxResult<Self>;
}

fn mismatch(pv: &str, expected: &'static str, value: &PvValue) -> MxError {
    MxError::TypeMismatch {
        pv: pv.to_string(),
        expected,
        found: value.kind(),
    }
}

impl PvType for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn into_pv(self) -> PvValue {
        PvValue::Double(self)
    }

    fn from_pv(pv: &str, value: PvValue) -> MxResult<Self> {
        value
            .as_f64()
            .ok_or_else(|| mismatch(pv, Self::TYPE_NAME, &value))
    }
}

impl PvType for i64 {
    const TYPE_NAME: &'static str = "i64";

    fn into_pv(self) -> PvValue {
        PvValue::Long(self)
    }

    fn from_pv(pv: &str, value: PvValue) -> MxResult<Self> {
        match value {
            PvValue::Long(v) => Ok(v),
            PvValue::Double(v) if v.fract() == 0.0 && v.is_finite() => Ok(v as i64),
            other => Err(mismatch(pv, Self::TYPE_NAME, &other)),
        }
    }
}

impl PvType for u8 {
    const TYPE_NAME: &'static str = "u8";

    fn into_pv(self) -> PvValue {
        PvValue::Long(i64::from(self))
    }

    fn from_pv(pv: &str, value: PvValue) -> MxResult<Self> {
        let wide = i64::from_pv(pv, value.clone())
            .map_err(|_| mismatch(pv, Self::TYPE_NAME, &value))?;
        u8::try_from(wide).map_err(|_| mismatch(pv, Self::TYPE_NAME, &value))
    }
}

impl PvType for bool {
    const TYPE_NAME: &'static str = "bool";

    fn into_pv(self) -> PvValue {
        PvValue::Long(i64::from(self))
    }

    fn from_pv(pv: &str, value: PvValue) -> MxResult<Self> {
        value
            .as_f64()
            .map(|v| v != 0.0)
            .ok_or_else(|| mismatch(pv, Self::TYPE_NAME, &value))
    }
}

impl PvType for String {
    const TYPE_NAME: &'static str = "string";

    fn into_pv(self) -> PvValue {
        PvValue::Str(self)
    }

    fn from_pv(pv: &str, value: PvValue) -> MxResult<Self> {
        match value {
            PvValue::Str(s) => Ok(s),
            other => Err(mismatch(pv, Self::TYPE_NAME, &other)),
        }
    }
}

/// Full address of a component: parent prefix followed by the component suffix.
///
/// No separator is inserted; beamline naming schemes carry their own
/// punctuation (`XF:17IDB-ES:AMX` + `{Dew:1-Ax:R}Mtr`).
pub fn pv_name(prefix: &str, suffix: &str) -> String {
    let mut name = String::with_capacity(prefix.len() + suffix.len());
    name.push_str(prefix);
    name.push_str(suffix);
    name
}
