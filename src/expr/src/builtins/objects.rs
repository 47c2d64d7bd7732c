//! Object pipes and the `object:pair` exec handler

use crate::context::ExprContext;
use crate::error::{ExprError, Result};
use crate::exec::{BasicExecResolver, ExecCall, ExecHandler};
use crate::pipe::{BasicPipeTransformResolver, PipeTransform};
use crate::value::{lookup_path, to_text};
use serde_json::{json, Map, Value};

/// Reads a dotted path from an object, or from every item of an array
#[derive(Default)]
pub struct PathPipe {
    path: Option<String>,
}

fn select(value: &Value, path: &str) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter_map(|item| lookup_path(item, path))
                .filter(|v| !v.is_null())
                .cloned()
                .collect(),
        ),
        other => lookup_path(other, path).cloned().unwrap_or(Value::Null),
    }
}

impl PipeTransform for PathPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        match self.path.as_deref() {
            Some(path) => select(&value, path),
            None => Value::Null,
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        self.path = args
            .first()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        Ok(())
    }
}

/// Like `path`, but the path itself is read from the context
///
/// `${claims:org | pathBy:variables.field}` selects whichever field
/// `variables.field` names at evaluation time.
#[derive(Default)]
pub struct PathByPipe {
    path_ref: Option<String>,
}

impl PipeTransform for PathByPipe {
    fn transform(&self, value: Value, context: &ExprContext) -> Value {
        let path = self
            .path_ref
            .as_deref()
            .and_then(|path_ref| context.get_path(path_ref))
            .and_then(to_text)
            .filter(|path| !path.is_empty());
        match path {
            Some(path) => select(&value, &path),
            None => Value::Null,
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        self.path_ref = args
            .first()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        Ok(())
    }
}

/// Turns an object into `[{key, value}, ...]`
#[derive(Default)]
pub struct EntriesPipe;

impl PipeTransform for EntriesPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        let object = match value {
            Value::Array(items) => items.into_iter().next(),
            other => Some(other),
        };
        let entries = match object {
            Some(Value::Object(map)) => map
                .into_iter()
                .map(|(key, value)| json!({ "key": key, "value": value }))
                .collect(),
            _ => Vec::new(),
        };
        Value::Array(entries)
    }
}

/// Builds a one-entry object from the `key` and `value` parameters
#[derive(Debug, Default)]
pub struct PairHandler;

impl ExecHandler for PairHandler {
    fn call(&self, call: ExecCall<'_>, _context: &ExprContext) -> Result<Value> {
        let key = call
            .params
            .get("key")
            .and_then(to_text)
            .ok_or_else(|| ExprError::ExecFailed {
                op: call.op.to_string(),
                reason: "missing key".to_string(),
            })?;
        let value = call.params.get("value").cloned().unwrap_or(Value::Null);

        let mut pair = Map::new();
        pair.insert(key, value);
        Ok(Value::Object(pair))
    }
}

pub fn pipes() -> BasicPipeTransformResolver {
    BasicPipeTransformResolver::new()
        .pipe::<PathPipe>("path")
        .pipe::<PathByPipe>("pathBy")
        .pipe::<EntriesPipe>("entries")
}

pub fn execs() -> BasicExecResolver {
    BasicExecResolver::new().handler("object:pair", PairHandler)
}
