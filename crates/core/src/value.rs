//! Helpers over the schema-less record value
//!
//! Records on both sides of a crosswalk are plain `serde_json::Value`s. Object
//! key order is insertion order (`preserve_order`), which keeps crosswalk
//! output deterministic for a fixed input.

use serde_json::{Map, Value};

/// A record: an open key-value map
pub type Record = Map<String, Value>;

/// Whether a value carries no information
///
/// Null, empty or whitespace-only strings, the literal string `"null"`,
/// empty arrays and empty objects are all blank.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let s = s.trim();
            s.is_empty() || s == "null"
        }
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Truthiness in the sense used by required-field checks
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// String content of a value, if it is a string
pub fn as_str(value: Option<&Value>) -> &str {
    value.and_then(Value::as_str).unwrap_or("")
}

/// Look up a dotted path inside a value
///
/// Numeric segments index into arrays.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Set a dotted path inside an object, creating intermediate objects
///
/// Returns `false` when an intermediate segment exists but is not an object.
pub fn set_path(target: &mut Record, path: &str, value: Value) -> bool {
    let mut segments = path.split('.').peekable();
    let mut current = target;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return true;
        }
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match entry {
            Value::Object(map) => current = map,
            _ => return false,
        }
    }
    false
}

/// Wrap a value in a chain of single-key objects
///
/// `nest(["a", "b"], v)` yields `{"a": {"b": v}}`.
pub fn nest(names: &[String], value: Value) -> Value {
    names.iter().rev().fold(value, |inner, name| {
        let mut map = Map::new();
        map.insert(name.clone(), inner);
        Value::Object(map)
    })
}

/// Coerce a value into a sequence, wrapping scalars and objects
pub fn cast_array(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Short, single-line rendering used in audit values and diagnostics
pub fn brief(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
