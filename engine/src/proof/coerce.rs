//! Lenient field decoders for client-supplied proof JSON.
//!
//! Submissions come from untrusted clients, so decoding never fails on a
//! field's shape.  Numbers given as strings are parsed; anything else that
//! is not a number decodes as NaN (or `None`) and is rejected later by the
//! verifier's range checks.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::events::{ProofEvent, ProofEventType, RunProof};

pub(crate) fn nan() -> f64 {
    f64::NAN
}

fn value_to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Number or NaN.
pub(crate) fn number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(value_to_number(&value).unwrap_or(f64::NAN))
}

/// Number when present; unparseable values keep their presence as NaN.
pub(crate) fn opt_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Null => None,
        other => Some(value_to_number(&other).unwrap_or(f64::NAN)),
    })
}

pub(crate) fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(value_to_string(&value))
}

pub(crate) fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(value_to_string(&value).unwrap_or_default())
}

/// Strict truthiness: `true`, non-zero numbers and `"true"`/`"1"`.
pub(crate) fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(s.trim(), "true" | "1"),
        _ => false,
    })
}

pub(crate) fn event_kind<'de, D: Deserializer<'de>>(d: D) -> Result<ProofEventType, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(value
        .as_str()
        .map(ProofEventType::parse)
        .unwrap_or(ProofEventType::Unknown))
}

/// Event list; a non-array decodes as empty and a malformed element as an
/// event with no valid time or type.
pub(crate) fn events<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ProofEvent>, D::Error> {
    let value = Value::deserialize(d)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .map(|item| match item {
            Value::Object(_) => {
                serde_json::from_value(item).unwrap_or_else(|_| ProofEvent::malformed())
            }
            _ => ProofEvent::malformed(),
        })
        .collect())
}

/// Proof object; anything other than an object decodes as absent.
pub(crate) fn proof<'de, D: Deserializer<'de>>(d: D) -> Result<Option<RunProof>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    })
}
