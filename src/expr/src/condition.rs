//! Conditions: named predicates over a key value and operand expressions
//!
//! A condition document maps operator names to `key -> operand(s)`:
//!
//! ```text
//! { "StringEquals": { "claims:org": "root" },
//!   "ForAnyValue:StringLike": { "claims:roles": ["admin*", "ops"] } }
//! ```
//!
//! Every `(op, key, operands)` triple becomes one [`Condition`]; a list of
//! conditions passes only when every condition passes.

use crate::context::ExprContext;
use crate::error::{ExprError, Result};
use crate::expr::Expr;
use crate::key::{Key, KeyHandler};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One operator applied to one key and a list of operand expressions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub op: String,
    pub key: String,
    pub value: Vec<String>,
}

impl Condition {
    pub fn new(op: impl Into<String>, key: impl Into<String>, value: Vec<String>) -> Self {
        Self {
            op: op.into(),
            key: key.into(),
            value,
        }
    }
}

/// Predicate behind a condition operator
///
/// `values` is always an array holding the evaluated operands in order.
pub trait ConditionHandler: Send + Sync {
    fn test(&self, key_value: &Value, values: &Value) -> bool;
}

impl<F> ConditionHandler for F
where
    F: Fn(&Value, &Value) -> bool + Send + Sync,
{
    fn test(&self, key_value: &Value, values: &Value) -> bool {
        self(key_value, values)
    }
}

/// Negates another handler
#[derive(Debug, Clone, Default)]
pub struct Not<H>(pub H);

impl<H: ConditionHandler> ConditionHandler for Not<H> {
    fn test(&self, key_value: &Value, values: &Value) -> bool {
        !self.0.test(key_value, values)
    }
}

/// Finds the handler for a condition operator
pub trait ConditionResolver: Send + Sync {
    fn get_condition(&self, op: &str) -> Option<Arc<dyn ConditionHandler>>;
}

/// Map-backed condition resolver with an ordered delegate chain
#[derive(Clone, Default)]
pub struct BasicConditionResolver {
    handlers: HashMap<String, Arc<dyn ConditionHandler>>,
    delegates: Vec<Arc<dyn ConditionResolver>>,
}

impl BasicConditionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `op`
    pub fn condition(
        mut self,
        op: impl Into<String>,
        handler: impl ConditionHandler + 'static,
    ) -> Self {
        self.handlers.insert(op.into(), Arc::new(handler));
        self
    }

    /// Register a shared handler under `op`
    pub fn condition_arc(
        mut self,
        op: impl Into<String>,
        handler: Arc<dyn ConditionHandler>,
    ) -> Self {
        self.handlers.insert(op.into(), handler);
        self
    }

    /// Append a delegate consulted after this resolver's own handlers
    pub fn delegate(mut self, delegate: Arc<dyn ConditionResolver>) -> Self {
        self.delegates.push(delegate);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl ConditionResolver for BasicConditionResolver {
    fn get_condition(&self, op: &str) -> Option<Arc<dyn ConditionHandler>> {
        if let Some(handler) = self.handlers.get(op) {
            return Some(handler.clone());
        }
        self.delegates.iter().find_map(|delegate| delegate.get_condition(op))
    }
}

/// A condition with its operator handler and operand expressions resolved
pub struct CompiledCondition {
    condition: Condition,
    key: Key,
    key_handler: Option<Arc<dyn KeyHandler>>,
    handler: Arc<dyn ConditionHandler>,
    operands: Vec<Expr>,
}

impl CompiledCondition {
    pub(crate) fn new(
        condition: Condition,
        key: Key,
        key_handler: Option<Arc<dyn KeyHandler>>,
        handler: Arc<dyn ConditionHandler>,
        operands: Vec<Expr>,
    ) -> Self {
        Self {
            condition,
            key,
            key_handler,
            handler,
            operands,
        }
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Evaluate the condition
    ///
    /// The key is looked up in the context-local resolver first, then in the
    /// resolver the condition was compiled against.
    pub fn test(&self, context: &ExprContext) -> Result<bool> {
        let handler = context
            .keys()
            .and_then(|keys| keys.find(&self.key))
            .or_else(|| self.key_handler.clone())
            .ok_or_else(|| ExprError::KeyNotFound(self.key.to_string()))?;
        let key_value = handler.call(&self.key, context);

        let values = self
            .operands
            .iter()
            .map(|operand| operand.call(context))
            .collect::<Result<Vec<_>>>()?;

        let passed = self.handler.test(&key_value, &Value::Array(values));
        debug!(op = %self.condition.op, key = %self.key, passed, "condition evaluated");
        Ok(passed)
    }
}

impl fmt::Debug for CompiledCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledCondition")
            .field("condition", &self.condition)
            .finish()
    }
}

/// Boolean expression backed by a list of conditions
#[derive(Debug)]
pub enum ConditionExpr {
    /// Always the given value
    Const(bool),
    /// Conjunction over compiled conditions
    All(Vec<CompiledCondition>),
}

impl ConditionExpr {
    /// The always-true condition
    pub fn always() -> Self {
        ConditionExpr::Const(true)
    }

    /// Evaluate against a context
    ///
    /// Every condition is evaluated so configuration errors surface even when
    /// an earlier condition already failed.
    pub fn call(&self, context: &ExprContext) -> Result<bool> {
        match self {
            ConditionExpr::Const(value) => Ok(*value),
            ConditionExpr::All(conditions) => {
                let mut result = true;
                for condition in conditions {
                    if !condition.test(context)? {
                        result = false;
                    }
                }
                Ok(result)
            }
        }
    }

    /// Source conditions, in document order
    pub fn conditions(&self) -> Vec<&Condition> {
        match self {
            ConditionExpr::Const(_) => Vec::new(),
            ConditionExpr::All(conditions) => conditions.iter().map(|c| c.condition()).collect(),
        }
    }
}

impl Default for ConditionExpr {
    fn default() -> Self {
        Self::always()
    }
}

/// Parse a condition document into a flat condition list
///
/// Accepts `null` (no conditions), an object, or an array of objects.
pub fn parse_conditions(document: &Value) -> Result<Vec<Condition>> {
    match document {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => parse_condition_object(map),
        Value::Array(items) => {
            let mut conditions = Vec::new();
            for item in items {
                match item {
                    Value::Object(map) => conditions.extend(parse_condition_object(map)?),
                    other => {
                        return Err(ExprError::InvalidCondition(format!(
                            "expected an object, found {}",
                            crate::value::type_name(other)
                        )))
                    }
                }
            }
            Ok(conditions)
        }
        other => Err(ExprError::InvalidCondition(format!(
            "expected an object or array, found {}",
            crate::value::type_name(other)
        ))),
    }
}

fn parse_condition_object(map: &Map<String, Value>) -> Result<Vec<Condition>> {
    let mut conditions = Vec::new();
    for (op, body) in map {
        let Value::Object(keys) = body else {
            return Err(ExprError::InvalidCondition(format!(
                "operator '{}' must map keys to operands",
                op
            )));
        };
        for (key, operands) in keys {
            conditions.push(Condition::new(op.clone(), key.clone(), parse_operands(op, operands)?));
        }
    }
    Ok(conditions)
}

fn parse_operands(op: &str, operands: &Value) -> Result<Vec<String>> {
    match operands {
        Value::Array(items) => items.iter().map(|item| parse_operand(op, item)).collect(),
        other => Ok(vec![parse_operand(op, other)?]),
    }
}

fn parse_operand(op: &str, operand: &Value) -> Result<String> {
    match operand {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ExprError::InvalidCondition(format!(
            "unexpected {} operand for '{}'",
            crate::value::type_name(other),
            op
        ))),
    }
}
