//! Tolerant deserializers for loosely typed backend fields.
//!
//! The model behind the match service writes its JSON by hand, so the same
//! field shows up as `"12"`, `12`, `12.0` or `null` depending on the run.
//! These helpers accept any of those shapes and never fail on a scalar.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Renders a scalar JSON value as text. Objects and arrays yield `None`.
pub(crate) fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// String field that also accepts numbers and booleans; anything else is empty.
pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_text(&value).unwrap_or_default())
}

/// Optional string field with the same coercions as [`string`].
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_text(&value))
}

/// Optional whole number that also accepts numeric strings such as `"12"`,
/// `"#12"` or `12.0`. Negative values and sentinels
/// such as `"N/A"` become `None`.
pub fn opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_u32(&value))
}

pub(crate) fn parse_u32(value: &Value) -> Option<u32> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('#').trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (number.is_finite() && number >= 0.0 && number <= f64::from(u32::MAX))
        .then(|| number.round() as u32)
}

/// List of strings; a single string becomes a one-element list and
/// non-scalar elements are dropped.
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().filter_map(value_to_text).collect(),
        other => value_to_text(&other).into_iter().collect(),
    })
}

/// Nested record that falls back to its default when the value has the wrong shape.
pub fn record<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Reads a JSON array element by element, keeping every element that
/// decodes and logging the ones that do not.
///
/// Returns `None` when the value is not an array at all.
pub(crate) fn decode_list<T: DeserializeOwned>(value: &Value, field: &str) -> Option<Vec<T>> {
    let items = value.as_array()?;
    let mut decoded = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match serde_json::from_value::<T>(item.clone()) {
            Ok(record) => decoded.push(record),
            Err(e) => log::warn!("dropping {field}[{index}]: {e}"),
        }
    }
    Some(decoded)
}

/// Optional list decoded with [`decode_list`]; `null` and non-arrays are `None`.
pub fn opt_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(decode_list(&value, "list"))
}

/// Optional record; `null`, non-objects and undecodable objects are `None`.
pub fn opt_record<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(decode_record(&value))
}

pub(crate) fn decode_record<T: DeserializeOwned>(value: &Value) -> Option<T> {
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value.clone())
        .map_err(|e| log::warn!("dropping record: {e}"))
        .ok()
}
