//! Tolerant decoding of bridge payloads
//!
//! The bridge stringifies most scalars (`"NodeClass": "1"`, `"IsForward": "True"`)
//! and sometimes embeds whole JSON documents inside string fields. These
//! helpers accept both the stringified and the native encodings.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A scalar the bridge may send either as a JSON string or as a native value.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub(crate) fn as_u32(&self) -> Option<u32> {
        match self {
            Scalar::Int(n) => u32::try_from(*n).ok(),
            Scalar::Float(f) if f.fract() == 0.0 && *f >= 0.0 => u32::try_from(*f as i64).ok(),
            Scalar::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub(crate) fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::Int(n) => Some(*n != 0),
            Scalar::Text(s) => match s.trim() {
                "True" | "true" | "1" => Some(true),
                "False" | "false" | "0" => Some(false),
                _ => None,
            },
            Scalar::Float(_) => None,
        }
    }

    pub(crate) fn into_text(self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(s) => s,
        }
    }
}

pub(crate) fn bool_like<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let scalar = Scalar::deserialize(d)?;
    scalar
        .as_bool()
        .ok_or_else(|| D::Error::custom(format!("expected boolean, got {:?}", scalar)))
}

pub(crate) fn u32_like<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let scalar = Scalar::deserialize(d)?;
    scalar
        .as_u32()
        .ok_or_else(|| D::Error::custom(format!("expected unsigned integer, got {:?}", scalar)))
}

pub(crate) fn text_like<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Scalar::deserialize(d)?.into_text())
}

/// Decode a value that is either structured JSON or a JSON document inside a string.
pub(crate) fn embedded<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(d)?;
    decode_embedded(value).map_err(D::Error::custom)
}

/// Optional variant of [`embedded`]: `null`, `""` and a missing field decode to `None`.
pub(crate) fn embedded_opt<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(d)?;
    match value {
        Value::Null => Ok(None),
        Value::String(ref s) if s.trim().is_empty() => Ok(None),
        other => decode_embedded(other).map(Some).map_err(D::Error::custom),
    }
}

pub(crate) fn decode_embedded<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    match value {
        Value::String(s) => {
            // Raw newlines and tabs leak out of the bridge's hand-built JSON.
            let cleaned: String = s.chars().filter(|c| *c != '\n' && *c != '\t').collect();
            match serde_json::from_str(&cleaned) {
                Ok(v) => Ok(v),
                // A plain string that is not itself JSON.
                Err(_) => serde_json::from_value(Value::String(s)),
            }
        }
        other => serde_json::from_value(other),
    }
}
