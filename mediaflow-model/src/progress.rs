//! Percent-complete values as reported by backends.
//!
//! Backends send progress as integers, floats or occasionally strings. Any
//! number is rounded and clamped to `0..=100`; anything else reads as absent
//! so a malformed progress never hides the rest of a report.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Rounds and clamps a raw percentage.
pub fn clamp(raw: f64) -> Option<u8> {
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, 100.0) as u8)
}

fn from_value(value: &Value) -> Option<u8> {
    match value {
        Value::Number(number) => number.as_f64().and_then(clamp),
        Value::String(raw) => raw.trim().parse::<f64>().ok().and_then(clamp),
        _ => None,
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(from_value))
}
