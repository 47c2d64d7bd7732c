//! Structured expressions compiled from JSON documents
//!
//! Strings are interpolation expressions, other scalars are constants, arrays
//! and objects compile recursively. An object with an `@exec` field becomes an
//! exec node.

use crate::error::{ExprError, Result};
use crate::exec::ExecResolver;
use crate::expr::{ExecExpr, Expr, FieldExpr, ObjectExpr};
use crate::parser::ExprParser;
use crate::value::type_name;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Field naming the exec operator of an object
pub const EXEC_FIELD: &str = "@exec";
/// Field holding exec configuration expressions
pub const CONFIG_FIELD: &str = "@config";

/// Compiles JSON documents into expression trees
#[derive(Clone)]
pub struct TreeParser {
    parser: ExprParser,
    execs: Arc<dyn ExecResolver>,
}

impl TreeParser {
    pub fn new(parser: ExprParser, execs: Arc<dyn ExecResolver>) -> Self {
        Self { parser, execs }
    }

    pub fn parse(&self, document: &Value) -> Result<Expr> {
        match document {
            Value::String(text) => self.parser.parse(text),
            Value::Array(items) => items
                .iter()
                .map(|item| self.parse(item))
                .collect::<Result<Vec<_>>>()
                .map(Expr::Array),
            Value::Object(map) => match map.get(EXEC_FIELD) {
                Some(op) => self.parse_exec(op, map),
                None => self.parse_object(map),
            },
            scalar => Ok(Expr::constant(scalar.clone())),
        }
    }

    fn parse_object(&self, map: &Map<String, Value>) -> Result<Expr> {
        let fields = map
            .iter()
            .map(|(name, value)| Ok(FieldExpr::new(name.clone(), self.parse(value)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Expr::Object(ObjectExpr::new(fields)))
    }

    fn parse_exec(&self, op: &Value, map: &Map<String, Value>) -> Result<Expr> {
        let Value::String(op) = op else {
            return Err(ExprError::TypeError {
                expected: format!("string {}", EXEC_FIELD),
                found: type_name(op).to_string(),
            });
        };
        let handler = self
            .execs
            .find_handler(op)
            .ok_or_else(|| ExprError::ExecNotFound(op.clone()))?;

        let config = match map.get(CONFIG_FIELD) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(config)) => self.parse_named(config.iter())?,
            Some(other) => {
                return Err(ExprError::ExecFailed {
                    op: op.clone(),
                    reason: format!(
                        "{} must be an object, found {}",
                        CONFIG_FIELD,
                        type_name(other)
                    ),
                })
            }
        };
        let params = self.parse_named(
            map.iter()
                .filter(|(name, _)| name.as_str() != EXEC_FIELD && name.as_str() != CONFIG_FIELD),
        )?;

        Ok(Expr::Exec(ExecExpr::new(op.clone(), handler, config, params)))
    }

    fn parse_named<'a>(
        &self,
        entries: impl Iterator<Item = (&'a String, &'a Value)>,
    ) -> Result<Vec<(String, Expr)>> {
        entries
            .map(|(name, value)| Ok((name.clone(), self.parse(value)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExprContext;
    use crate::exec::{BasicExecResolver, ExecCall, ExecHandler};
    use crate::key::{BasicKeyResolver, Key, PathKeyHandler};
    use crate::pipe::BasicPipeTransformResolver;
    use serde_json::json;

    struct Echo;

    impl ExecHandler for Echo {
        fn call(&self, call: ExecCall<'_>, _context: &ExprContext) -> Result<Value> {
            Ok(json!({ "op": call.op, "config": call.config, "params": call.params }))
        }
    }

    fn tree() -> TreeParser {
        let keys = BasicKeyResolver::new()
            .key(Key::new("path", "*"), PathKeyHandler::new())
            .key(Key::new("repeat", "*"), PathKeyHandler::rooted("repeat"));
        let parser = ExprParser::new(Arc::new(keys), Arc::new(BasicPipeTransformResolver::new()));
        TreeParser::new(parser, Arc::new(BasicExecResolver::new().handler("echo", Echo)))
    }

    #[test]
    fn test_scalars_and_strings() {
        let ctx = ExprContext::new().with("user", json!({"name": "ann"}));
        let expr = tree()
            .parse(&json!({"n": 1, "b": true, "z": null, "s": "hi ${path:user.name}"}))
            .unwrap();
        assert_eq!(
            expr.call(&ctx).unwrap(),
            json!({"n": 1, "b": true, "z": null, "s": "hi ann"})
        );
    }

    #[test]
    fn test_repeat() {
        let ctx = ExprContext::new().with("items", json!(["a", "b", "c"]));
        let expr = tree()
            .parse(&json!({
                "@repeat": "${path:items}",
                "name": "${repeat:item}",
                "index": "${repeat:index}",
                "last": "${repeat:last}"
            }))
            .unwrap();
        assert_eq!(
            expr.call(&ctx).unwrap(),
            json!([
                {"name": "a", "index": 0, "last": false},
                {"name": "b", "index": 1, "last": false},
                {"name": "c", "index": 2, "last": true}
            ])
        );
    }

    #[test]
    fn test_when_picks_first_match() {
        let ctx = ExprContext::new().with("level", json!("high"));
        let expr = tree()
            .parse(&json!({
                "id": 7,
                "@when": [
                    { "@if": false, "color": "green" },
                    { "@if": true, "color": "red" },
                    { "color": "grey" }
                ]
            }))
            .unwrap();
        assert_eq!(expr.call(&ctx).unwrap(), json!({"id": 7, "color": "red"}));
    }

    #[test]
    fn test_exec() {
        let ctx = ExprContext::new().with("user", json!({"name": "ann"}));
        let expr = tree()
            .parse(&json!({
                "@exec": "echo",
                "@config": { "level": "info" },
                "who": "${path:user.name}"
            }))
            .unwrap();
        assert_eq!(
            expr.call(&ctx).unwrap(),
            json!({"op": "echo", "config": {"level": "info"}, "params": {"who": "ann"}})
        );
    }

    #[test]
    fn test_exec_errors() {
        let parser = tree();
        assert_eq!(
            parser.parse(&json!({"@exec": "missing"})).unwrap_err(),
            ExprError::ExecNotFound("missing".to_string())
        );
        assert!(matches!(
            parser.parse(&json!({"@exec": 3})),
            Err(ExprError::TypeError { .. })
        ));
        assert!(matches!(
            parser.parse(&json!({"@exec": "echo", "@config": "x"})),
            Err(ExprError::ExecFailed { .. })
        ));
    }
}
