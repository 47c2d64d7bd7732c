//! String pipes and string conditions

use crate::condition::{BasicConditionResolver, ConditionHandler, Not};
use crate::context::ExprContext;
use crate::error::Result;
use crate::pipe::{BasicPipeTransformResolver, PipeTransform};
use crate::value::{map_items, to_text};
use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};

const LIKE_CACHE_LIMIT: usize = 1024;

/// Applies a string function to a value or to each item of an array
#[derive(Clone, Copy)]
pub struct StringPipe(pub fn(&str) -> String);

impl PipeTransform for StringPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        map_items(value, |item| match to_text(&item) {
            Some(text) => Value::String((self.0)(&text)),
            None => Value::Null,
        })
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn format_phone(text: &str) -> String {
    let digits = text.trim();
    if digits.chars().count() == 10 && digits.is_ascii() {
        format!("({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..10])
    } else {
        digits.to_string()
    }
}

fn first_arg(args: &[String]) -> Option<String> {
    args.first().cloned()
}

#[derive(Default)]
pub struct AppendPipe {
    text: String,
}

impl PipeTransform for AppendPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        match to_text(&value) {
            Some(s) => Value::String(s + &self.text),
            None => Value::Null,
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        if let Some(text) = first_arg(args) {
            self.text = text;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct PrependPipe {
    text: String,
}

impl PipeTransform for PrependPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        match to_text(&value) {
            Some(s) => Value::String(format!("{}{}", self.text, s)),
            None => Value::Null,
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        if let Some(text) = first_arg(args) {
            self.text = text;
        }
        Ok(())
    }
}

pub struct JoinPipe {
    separator: String,
}

impl Default for JoinPipe {
    fn default() -> Self {
        Self {
            separator: ", ".to_string(),
        }
    }
}

impl PipeTransform for JoinPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        match value {
            Value::Array(items) => Value::String(
                items
                    .iter()
                    .filter_map(to_text)
                    .collect::<Vec<_>>()
                    .join(&self.separator),
            ),
            other => other,
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        if let Some(separator) = first_arg(args) {
            self.separator = separator;
        }
        Ok(())
    }
}

pub struct SplitPipe {
    separator: String,
}

impl Default for SplitPipe {
    fn default() -> Self {
        Self {
            separator: ",".to_string(),
        }
    }
}

impl SplitPipe {
    fn split(&self, value: &Value) -> Vec<Value> {
        match to_text(value) {
            Some(text) => text
                .split(self.separator.as_str())
                .map(|s| Value::String(s.to_string()))
                .collect(),
            None => Vec::new(),
        }
    }
}

impl PipeTransform for SplitPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        match value {
            Value::Null => Value::Null,
            Value::Array(items) => {
                Value::Array(items.iter().flat_map(|item| self.split(item)).collect())
            }
            other => Value::Array(self.split(&other)),
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        if let Some(separator) = first_arg(args) {
            self.separator = separator;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct EmptyToNullPipe;

impl PipeTransform for EmptyToNullPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        map_items(value, |item| match item {
            Value::String(s) if s.is_empty() => Value::Null,
            other => other,
        })
    }
}

#[derive(Default)]
pub struct RemoveCharsPipe {
    chars: String,
}

impl PipeTransform for RemoveCharsPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        map_items(value, |item| match to_text(&item) {
            Some(text) => {
                Value::String(text.chars().filter(|c| !self.chars.contains(*c)).collect())
            }
            None => Value::Null,
        })
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        if let Some(chars) = first_arg(args) {
            self.chars = chars;
        }
        Ok(())
    }
}

/// Form-encodes text (`a b&c` becomes `a+b%26c`)
fn url_encode(text: &str) -> String {
    urlencoding::encode(text).replace("%20", "+")
}

/// Applies a fallible string function; failures become null
#[derive(Clone, Copy)]
pub struct TryStringPipe(pub fn(&str) -> Option<String>);

impl PipeTransform for TryStringPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        map_items(value, |item| match to_text(&item).and_then(|text| (self.0)(&text)) {
            Some(text) => Value::String(text),
            None => Value::Null,
        })
    }
}

fn url_decode(text: &str) -> Option<String> {
    urlencoding::decode(&text.replace('+', " ")).ok().map(|s| s.into_owned())
}

/// Register the string pipes
pub fn pipes() -> BasicPipeTransformResolver {
    BasicPipeTransformResolver::new()
        .transform("upperCase", || Box::new(StringPipe(|s| s.to_uppercase())))
        .transform("lowerCase", || Box::new(StringPipe(|s| s.to_lowercase())))
        .transform("capitalize", || Box::new(StringPipe(capitalize)))
        .transform("trim", || Box::new(StringPipe(|s| s.trim().to_string())))
        .transform("formatPhone", || Box::new(StringPipe(format_phone)))
        .transform("urlEncode", || Box::new(StringPipe(url_encode)))
        .transform("urlDecode", || Box::new(TryStringPipe(url_decode)))
        .pipe::<AppendPipe>("append")
        .pipe::<PrependPipe>("prepend")
        .pipe::<JoinPipe>("join")
        .pipe::<SplitPipe>("split")
        .pipe::<EmptyToNullPipe>("emptyToNull")
        .pipe::<RemoveCharsPipe>("removeChars")
}

// ============================================================================
// Conditions
// ============================================================================

type StringOp = fn(Option<&str>, Option<&str>) -> bool;

fn texts(value: &Value) -> Vec<Option<String>> {
    match value {
        Value::Array(items) => items.iter().map(to_text).collect(),
        other => vec![to_text(other)],
    }
}

fn first_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.first().and_then(to_text),
        other => to_text(other),
    }
}

/// Compares the first key value with the first operand
#[derive(Clone, Copy)]
pub struct SingleString(pub StringOp);

impl ConditionHandler for SingleString {
    fn test(&self, key_value: &Value, values: &Value) -> bool {
        (self.0)(first_text(key_value).as_deref(), first_text(values).as_deref())
    }
}

/// Passes when any key value matches any operand
#[derive(Clone, Copy)]
pub struct ForAnyString(pub StringOp);

impl ConditionHandler for ForAnyString {
    fn test(&self, key_value: &Value, values: &Value) -> bool {
        let operands = texts(values);
        texts(key_value)
            .iter()
            .any(|k| operands.iter().any(|v| (self.0)(k.as_deref(), v.as_deref())))
    }
}

/// Passes when every key value matches some operand; a null key passes
#[derive(Clone, Copy)]
pub struct ForAllStrings(pub StringOp);

impl ConditionHandler for ForAllStrings {
    fn test(&self, key_value: &Value, values: &Value) -> bool {
        if key_value.is_null() {
            return true;
        }
        let operands = texts(values);
        texts(key_value)
            .iter()
            .all(|k| operands.iter().any(|v| (self.0)(k.as_deref(), v.as_deref())))
    }
}

fn equals(k: Option<&str>, v: Option<&str>) -> bool {
    k == v
}

fn equals_ignore_case(k: Option<&str>, v: Option<&str>) -> bool {
    match (k, v) {
        (Some(k), Some(v)) => k.to_lowercase() == v.to_lowercase(),
        (None, None) => true,
        _ => false,
    }
}

/// Compile a `*`/`?` wildcard into an anchored regex
///
/// Every other character matches literally. `?` matches zero or one
/// character.
pub fn wildcard_regex(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    let escaped = regex::escape(pattern).replace(r"\?", ".?").replace(r"\*", ".*");
    Regex::new(&format!("^{}$", escaped))
}

fn like_cache() -> &'static DashMap<String, Option<Regex>> {
    static CACHE: OnceLock<DashMap<String, Option<Regex>>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

/// Wildcard match of `k` against the pattern `v`
pub fn like(k: Option<&str>, v: Option<&str>) -> bool {
    let (k, v) = match (k, v) {
        (None, None) => return true,
        (Some(k), Some(v)) => (k, v),
        _ => return false,
    };

    let cache = like_cache();
    if let Some(regex) = cache.get(v) {
        return regex.as_ref().map_or(false, |r| r.is_match(k));
    }
    if cache.len() >= LIKE_CACHE_LIMIT {
        cache.clear();
    }
    let regex = wildcard_regex(v).ok();
    let matched = regex.as_ref().map_or(false, |r| r.is_match(k));
    cache.insert(v.to_string(), regex);
    matched
}

fn string_ops() -> [(&'static str, StringOp); 3] {
    [
        ("StringEquals", equals),
        ("StringEqualsIgnoreCase", equals_ignore_case),
        ("StringLike", like),
    ]
}

/// Register the string conditions, including negations and set prefixes
pub fn conditions() -> BasicConditionResolver {
    let mut resolver = BasicConditionResolver::new();
    for (name, op) in string_ops() {
        let negated = name.replacen("String", "StringNot", 1);
        let handlers: [(String, Arc<dyn ConditionHandler>, Arc<dyn ConditionHandler>); 3] = [
            (String::new(), Arc::new(SingleString(op)), Arc::new(Not(SingleString(op)))),
            (
                "ForAnyValue:".to_string(),
                Arc::new(ForAnyString(op)),
                Arc::new(Not(ForAnyString(op))),
            ),
            (
                "ForAllValues:".to_string(),
                Arc::new(ForAllStrings(op)),
                Arc::new(Not(ForAllStrings(op))),
            ),
        ];
        for (prefix, positive, negative) in handlers {
            resolver = resolver
                .condition_arc(format!("{}{}", prefix, name), positive)
                .condition_arc(format!("{}{}", prefix, negated), negative);
        }
    }
    resolver
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionResolver;
    use serde_json::json;

    fn run(pipe: &dyn PipeTransform, value: Value) -> Value {
        pipe.transform(value, &ExprContext::new())
    }

    #[test]
    fn test_string_pipes() {
        assert_eq!(run(&StringPipe(capitalize), json!("sales")), json!("Sales"));
        assert_eq!(run(&StringPipe(|s| s.to_uppercase()), json!(["a", null])), json!(["A", null]));
        assert_eq!(run(&StringPipe(format_phone), json!("5551234567")), json!("(555) 123-4567"));
        assert_eq!(run(&StringPipe(format_phone), json!("123")), json!("123"));
    }

    #[test]
    fn test_url_pipes() {
        let encoded = json!("a+b%26c%3Dd%2F%C3%A9");
        assert_eq!(run(&StringPipe(url_encode), json!("a b&c=d/é")), encoded);
        assert_eq!(run(&TryStringPipe(url_decode), encoded), json!("a b&c=d/é"));
        assert_eq!(run(&TryStringPipe(url_decode), json!(["x%20y", null])), json!(["x y", null]));
        assert_eq!(run(&TryStringPipe(url_decode), json!("%FF")), Value::Null);
        assert_eq!(run(&StringPipe(url_encode), Value::Null), Value::Null);
    }

    #[test]
    fn test_configured_pipes() {
        let mut join = JoinPipe::default();
        assert_eq!(run(&join, json!(["a", "b"])), json!("a, b"));
        join.args(&["/".to_string()]).unwrap();
        assert_eq!(run(&join, json!(["a", "b"])), json!("a/b"));

        let split = SplitPipe::default();
        assert_eq!(run(&split, json!("a,b")), json!(["a", "b"]));
        assert_eq!(run(&split, Value::Null), Value::Null);

        let mut remove = RemoveCharsPipe::default();
        remove.args(&["()- ".to_string()]).unwrap();
        assert_eq!(run(&remove, json!("(555) 123-4567")), json!("5551234567"));

        assert_eq!(run(&EmptyToNullPipe, json!(["", "x"])), json!([null, "x"]));
        assert_eq!(run(&AppendPipe::default(), Value::Null), Value::Null);
    }

    #[test]
    fn test_like() {
        assert!(like(Some("em2m:ident:account:1234"), Some("em2m:ident:*")));
        assert!(like(Some("1234"), Some("?234")));
        assert!(like(Some("a.b"), Some("a.b")));
        assert!(!like(Some("axb"), Some("a.b")));
        assert!(!like(Some("x"), None));
        assert!(like(None, None));
    }

    #[test]
    fn test_condition_variants() {
        let resolver = conditions();
        let test = |op: &str, k: Value, v: Value| resolver.get_condition(op).unwrap().test(&k, &v);

        assert!(test("StringEquals", json!("root"), json!(["root"])));
        assert!(test("StringNotEquals", json!("root"), json!(["em2m"])));
        assert!(test("StringEqualsIgnoreCase", json!("ROOT"), json!(["root"])));
        assert!(test("ForAnyValue:StringEquals", json!(["a", "b"]), json!(["b"])));
        assert!(!test("ForAllValues:StringEquals", json!(["a", "b"]), json!(["b"])));
        assert!(test("ForAllValues:StringLike", json!(["admin1", "admin2"]), json!(["admin*"])));
        assert!(test("ForAllValues:StringEquals", Value::Null, json!(["b"])));
        assert!(test("ForAnyValue:StringNotLike", json!(["x"]), json!(["y*"])));
    }
}
