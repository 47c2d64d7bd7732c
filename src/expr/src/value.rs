//! Value coercion helpers
//!
//! Expressions evaluate to `serde_json::Value`. `Value::Null` stands for an
//! absent value throughout the engine.

use serde_json::{Number, Value};

/// Short type name used in type-error messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render a value as text; `None` for null
///
/// Strings are returned verbatim, everything else in its JSON rendering.
pub fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Append the text rendering of a value, skipping nulls
pub fn push_text(buf: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => buf.push_str(s),
        other => buf.push_str(&other.to_string()),
    }
}

/// Coerce to a number: numbers as-is, numeric strings parsed
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Coerce to a boolean: `true`/`false` strings (any case), non-zero numbers
pub fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

/// Whether a guard value lets evaluation proceed
///
/// Null and values that do not coerce to a boolean count as `true`.
pub fn truthy(value: &Value) -> bool {
    to_bool(value).unwrap_or(true)
}

/// View a value as a list: arrays by item, null as empty, scalars as one item
pub fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Build a JSON number, keeping integral results as integers
pub fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Apply `f` to each item of an array, or to the value itself
pub fn map_items(value: Value, f: impl Fn(Value) -> Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(f).collect()),
        other => f(other),
    }
}

/// Resolve a dotted path (`a.b.c`) into nested objects
///
/// Numeric segments index into arrays.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_rendering() {
        assert_eq!(to_text(&json!("abc")), Some("abc".to_string()));
        assert_eq!(to_text(&json!(12)), Some("12".to_string()));
        assert_eq!(to_text(&json!(true)), Some("true".to_string()));
        assert_eq!(to_text(&Value::Null), None);
    }

    #[test]
    fn test_number_coercion() {
        assert_eq!(to_number(&json!(" 42 ")), Some(42.0));
        assert_eq!(to_number(&json!(1.5)), Some(1.5));
        assert_eq!(to_number(&json!("abc")), None);
        assert_eq!(number(3.0), json!(3));
        assert_eq!(number(2.5), json!(2.5));
    }

    #[test]
    fn test_bool_coercion() {
        assert_eq!(to_bool(&json!("TRUE")), Some(true));
        assert_eq!(to_bool(&json!(0)), Some(false));
        assert_eq!(to_bool(&json!("maybe")), None);
        assert!(truthy(&Value::Null));
        assert!(!truthy(&json!(false)));
    }

    #[test]
    fn test_lookup_path() {
        let doc = json!({"a": {"b": [10, {"c": "deep"}]}});
        assert_eq!(lookup_path(&doc, "a.b.0"), Some(&json!(10)));
        assert_eq!(lookup_path(&doc, "a.b.1.c"), Some(&json!("deep")));
        assert_eq!(lookup_path(&doc, "a.x"), None);
    }
}
