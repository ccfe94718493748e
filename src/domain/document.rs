// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers for untyped configuration documents.
//!
//! A raw configuration document is an arbitrary JSON value. These helpers
//! provide the lenient conversions that legacy documents need (textual flags,
//! numeric strings) and the structural operations shared by inheritance and
//! migration.

use serde_json::{Map, Number, Value};

/// A raw, untyped configuration document.
pub type ConfigurationDocument = Value;

/// Interprets a value as a boolean flag.
///
/// Recognizes JSON booleans, the numbers `0` and `1`, and the following
/// strings (case-insensitive):
/// - `true`: "true", "yes", "1", "on"
/// - `false`: "false", "no", "0", "off"
///
/// # Examples
///
/// ```
/// use trustcfg::domain::document::parse_flag;
/// use serde_json::json;
///
/// assert_eq!(parse_flag(&json!("yes")), Some(true));
/// assert_eq!(parse_flag(&json!(false)), Some(false));
/// assert_eq!(parse_flag(&json!("maybe")), None);
/// ```
pub fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(true),
            "false" | "no" | "0" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Interprets a value as a number, accepting numeric strings.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Converts a float into a JSON number, preferring an integer representation
/// when the value is integral.
///
/// Non-finite input becomes `0`.
pub fn number_value(n: f64) -> Value {
    if !n.is_finite() {
        return Value::from(0);
    }
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        return Value::from(n as i64);
    }
    Number::from_f64(n).map(Value::Number).unwrap_or_else(|| Value::from(0))
}

/// Returns the size in bytes of the compact JSON serialization of `document`.
pub fn serialized_size(document: &Value) -> usize {
    serde_json::to_vec(document).map(|bytes| bytes.len()).unwrap_or(0)
}

/// Returns an empty JSON object.
pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Recursively merges `source` into `target`.
///
/// Objects are merged key by key. When `source_wins` is `true` leaf values from
/// `source` replace those in `target`; otherwise existing leaves in `target`
/// are kept and only missing keys are filled in.
///
/// # Examples
///
/// ```
/// use trustcfg::domain::document::deep_merge;
/// use serde_json::json;
///
/// let mut target = json!({ "a": 1, "b": { "c": 2 } });
/// deep_merge(&mut target, &json!({ "a": 9, "b": { "d": 3 } }), false);
/// assert_eq!(target, json!({ "a": 1, "b": { "c": 2, "d": 3 } }));
/// ```
pub fn deep_merge(target: &mut Value, source: &Value, source_wins: bool) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(key) {
                    Some(existing) if existing.is_object() && source_value.is_object() => {
                        deep_merge(existing, source_value, source_wins);
                    }
                    Some(existing) => {
                        if source_wins {
                            *existing = source_value.clone();
                        }
                    }
                    None => {
                        target_map.insert(key.clone(), source_value.clone());
                    }
                }
            }
        }
        (target, source) => {
            if source_wins {
                *target = source.clone();
            }
        }
    }
}

/// Returns a human-readable name for the JSON type of `value`.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
