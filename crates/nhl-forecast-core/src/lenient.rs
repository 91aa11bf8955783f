//! Lenient decoding shared by every agent and store boundary.
//!
//! Contract: parse if string, coerce to default on any failure. Nothing in
//! this module returns an error; malformed JSON, wrong shapes and mistyped
//! fields all collapse to the empty value of the expected type.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[must_use]
pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Normalizes an agent `result` payload into a JSON object.
///
/// A string payload is parsed as JSON. Parse failures and any non-object
/// shape yield `{}`.
#[must_use]
pub fn decode_payload(value: &Value) -> Value {
    match value {
        Value::Object(_) => value.clone(),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => empty_object(),
        },
        _ => empty_object(),
    }
}

/// Parses stored JSON text, falling back to `default` when the text is
/// absent or malformed.
#[must_use]
pub fn decode_text(raw: Option<&str>, default: Value) -> Value {
    raw.and_then(|text| serde_json::from_str::<Value>(text).ok())
        .unwrap_or(default)
}

/// Decodes a value into `T`, substituting `T::default()` on failure.
#[must_use]
pub fn decode<T>(value: &Value) -> T
where
    T: DeserializeOwned + Default,
{
    T::deserialize(value).unwrap_or_default()
}

/// Extracts `value[name]` as a list. Any non-array yields an empty list.
/// Elements that fail to decode become `T::default()` so the element count
/// is preserved.
#[must_use]
pub fn array_field<T>(value: &Value, name: &str) -> Vec<T>
where
    T: DeserializeOwned + Default,
{
    value
        .get(name)
        .and_then(Value::as_array)
        .map(|items| items.iter().map(decode).collect())
        .unwrap_or_default()
}

/// Extracts `value[name]` as a record; missing, null or non-object values
/// yield `None`.
#[must_use]
pub fn object_field<T>(value: &Value, name: &str) -> Option<T>
where
    T: DeserializeOwned,
{
    match value.get(name) {
        Some(inner @ Value::Object(_)) => T::deserialize(inner).ok(),
        _ => None,
    }
}

/// Field adapter: numbers pass through, anything else is `None`.
///
/// # Errors
/// Never fails on well-formed JSON input.
pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_f64())
}

/// Field adapter: non-negative integers that fit in `u32`. Whole floats
/// such as `45.0` count as integers.
///
/// # Errors
/// Never fails on well-formed JSON input.
pub fn opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if let Some(raw) = value.as_u64() {
        return Ok(u32::try_from(raw).ok());
    }
    Ok(value.as_f64().and_then(whole_u32))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_u32(number: f64) -> Option<u32> {
    let in_range = number.is_finite() && number >= 0.0 && number <= f64::from(u32::MAX);
    (in_range && number.fract() == 0.0).then(|| number as u32)
}

/// Field adapter: strings pass through, numbers and booleans are rendered,
/// anything else is `None`.
///
/// # Errors
/// Never fails on well-formed JSON input.
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    })
}

/// Field adapter: arrays keep their string elements; any other shape is empty.
///
/// # Errors
/// Never fails on well-formed JSON input.
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// Field adapter: objects keep their numeric entries; any other shape is empty.
///
/// # Errors
/// Never fails on well-formed JSON input.
pub fn number_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(entries) => entries
            .into_iter()
            .filter_map(|(key, raw)| raw.as_f64().map(|number| (key, number)))
            .collect(),
        _ => BTreeMap::new(),
    })
}

/// Field adapter: objects decode into `T`, anything else (or a failed
/// decode) is `None`.
///
/// # Errors
/// Never fails on well-formed JSON input.
pub fn opt_record<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(_) => T::deserialize(&value).ok(),
        _ => None,
    })
}

/// Field adapter: arrays decode element-wise with defaults, any other shape
/// is empty.
///
/// # Errors
/// Never fails on well-formed JSON input.
pub fn record_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().map(decode).collect(),
        _ => Vec::new(),
    })
}
