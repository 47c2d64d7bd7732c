//! Compiled expressions
//!
//! An interpolation string compiles to a sequence of [`Part`]s. Structured
//! documents compile to array, object and exec nodes whose leaves are
//! interpolation expressions. Compiled expressions are immutable and may be
//! evaluated concurrently against different contexts.

use crate::condition::ConditionExpr;
use crate::context::ExprContext;
use crate::error::Result;
use crate::exec::{ExecCall, ExecHandler};
use crate::key::{Key, KeyHandler};
use crate::pipe::PipeTransform;
use crate::value::{as_list, push_text, truthy};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

/// Annotation: skip the object when the value is falsy
pub const IF_FIELD: &str = "@if";
/// Annotation: the object evaluates to this field alone
pub const VALUE_FIELD: &str = "@value";
/// Annotation: evaluate the object once per item of this list
pub const REPEAT_FIELD: &str = "@repeat";
/// Annotation prefix: merge the child object(s) into the parent
pub const CONTAINER_PREFIX: &str = "@container";
/// Annotation prefix: merge the first non-null child object into the parent
pub const WHEN_PREFIX: &str = "@when";

/// One segment of an interpolation expression
#[derive(Debug)]
pub enum Part {
    /// Literal value
    Const(Value),
    /// Key lookup followed by transforms
    Pipe(PipePart),
}

impl Part {
    pub fn call(&self, context: &ExprContext) -> Value {
        match self {
            Part::Const(value) => value.clone(),
            Part::Pipe(pipe) => pipe.call(context),
        }
    }
}

/// Key lookup with zero or more chained transforms
pub struct PipePart {
    key: Key,
    handler: Arc<dyn KeyHandler>,
    transforms: Vec<Box<dyn PipeTransform>>,
}

impl PipePart {
    pub fn new(
        key: Key,
        handler: Arc<dyn KeyHandler>,
        transforms: Vec<Box<dyn PipeTransform>>,
    ) -> Self {
        Self {
            key,
            handler,
            transforms,
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Look up the key, preferring the context-local resolver, then apply
    /// each transform to the previous result
    pub fn call(&self, context: &ExprContext) -> Value {
        let initial = match context.keys().and_then(|keys| keys.find(&self.key)) {
            Some(local) => local.call(&self.key, context),
            None => self.handler.call(&self.key, context),
        };
        self.transforms
            .iter()
            .fold(initial, |current, pipe| pipe.transform(current, context))
    }

    fn fields(&self) -> Vec<String> {
        self.handler.fields(&self.key)
    }
}

impl fmt::Debug for PipePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipePart")
            .field("key", &self.key)
            .field("transforms", &self.transforms.len())
            .finish()
    }
}

/// Named child of an object expression
#[derive(Debug)]
pub struct FieldExpr {
    pub name: String,
    pub value: Expr,
}

impl FieldExpr {
    pub fn new(name: impl Into<String>, value: Expr) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Object node with optional `@`-annotations
#[derive(Debug, Default)]
pub struct ObjectExpr {
    fields: Vec<FieldExpr>,
}

impl ObjectExpr {
    pub fn new(fields: Vec<FieldExpr>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldExpr] {
        &self.fields
    }

    fn field(&self, name: &str) -> Option<&Expr> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Whether the `@if` guard excludes this object
    pub fn skip(&self, context: &ExprContext) -> Result<bool> {
        match self.field(IF_FIELD) {
            Some(guard) => Ok(!truthy(&guard.call(context)?)),
            None => Ok(false),
        }
    }

    pub fn call(&self, context: &ExprContext) -> Result<Value> {
        if self.skip(context)? {
            return Ok(Value::Null);
        }
        if let Some(repeat) = self.field(REPEAT_FIELD) {
            return self.repeat(repeat, context);
        }
        if let Some(value) = self.field(VALUE_FIELD) {
            return value.call(context);
        }
        self.render_fields(context).map(Value::Object)
    }

    fn repeat(&self, repeat: &Expr, context: &ExprContext) -> Result<Value> {
        let items = repeat.call(context)?;
        let items = as_list(&items);
        let size = items.len();
        let value_expr = self.field(VALUE_FIELD);

        let mut results = Vec::with_capacity(size);
        for (index, item) in items.into_iter().enumerate() {
            let state = json!({
                "item": item,
                "index": index,
                "size": size,
                "first": index == 0,
                "last": index + 1 == size,
                "even": index % 2 == 0,
                "odd": index % 2 == 1,
            });
            let scoped = context.clone().with("repeat", state);
            let value = match value_expr {
                Some(expr) => expr.call(&scoped)?,
                None => Value::Object(self.render_fields(&scoped)?),
            };
            results.push(value);
        }
        Ok(Value::Array(results))
    }

    fn render_fields(&self, context: &ExprContext) -> Result<Map<String, Value>> {
        let mut out = Map::new();
        for field in &self.fields {
            let name = field.name.as_str();
            let container = name.starts_with(CONTAINER_PREFIX);
            let when = name.starts_with(WHEN_PREFIX);
            if name.starts_with('@') && !container && !when {
                continue;
            }

            if when {
                if let Expr::Array(branches) = &field.value {
                    if let Some(Value::Object(child)) = first_branch(branches, context)? {
                        out.extend(child);
                    }
                    continue;
                }
            }

            let value = field.value.call(context)?;
            match (&field.value, value) {
                (Expr::Object(_), Value::Null) => {}
                (_, Value::Object(child)) if container => out.extend(child),
                (Expr::Array(_), Value::Array(items)) if container => {
                    for item in items {
                        if let Value::Object(child) = item {
                            out.extend(child);
                        }
                    }
                }
                (_, value) => {
                    out.insert(name.to_string(), value);
                }
            }
        }
        Ok(out)
    }
}

/// First `@when` branch that is not guarded out and evaluates to non-null
///
/// Later branches are not evaluated.
fn first_branch(branches: &[Expr], context: &ExprContext) -> Result<Option<Value>> {
    for branch in branches {
        if let Expr::Object(object) = branch {
            if object.skip(context)? {
                continue;
            }
        }
        let value = branch.call(context)?;
        if !value.is_null() {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Exec node: a named operator applied to evaluated parameters
pub struct ExecExpr {
    op: String,
    handler: Arc<dyn ExecHandler>,
    config: Vec<(String, Expr)>,
    params: Vec<(String, Expr)>,
}

impl ExecExpr {
    pub fn new(
        op: impl Into<String>,
        handler: Arc<dyn ExecHandler>,
        config: Vec<(String, Expr)>,
        params: Vec<(String, Expr)>,
    ) -> Self {
        Self {
            op: op.into(),
            handler,
            config,
            params,
        }
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn call(&self, context: &ExprContext) -> Result<Value> {
        let config = evaluate_named(&self.config, context)?;
        let params = evaluate_named(&self.params, context)?;
        self.handler.call(
            ExecCall {
                op: &self.op,
                config: &config,
                params: &params,
            },
            context,
        )
    }
}

impl fmt::Debug for ExecExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecExpr")
            .field("op", &self.op)
            .field("config", &self.config)
            .field("params", &self.params)
            .finish()
    }
}

fn evaluate_named(exprs: &[(String, Expr)], context: &ExprContext) -> Result<Map<String, Value>> {
    exprs
        .iter()
        .map(|(name, expr)| Ok((name.clone(), expr.call(context)?)))
        .collect()
}

/// A compiled, evaluable expression
#[derive(Debug)]
pub enum Expr {
    /// Exactly one part; evaluates to that part's raw value
    Single(Part),
    /// Several parts; evaluates to their concatenated text
    Parts(Vec<Part>),
    /// List of expressions
    Array(Vec<Expr>),
    /// Object with named children
    Object(ObjectExpr),
    /// Pluggable operator
    Exec(ExecExpr),
    /// Boolean condition list
    Condition(ConditionExpr),
}

impl Expr {
    /// Expression that always evaluates to `value`
    pub fn constant(value: Value) -> Self {
        Expr::Single(Part::Const(value))
    }

    /// Build from parsed parts
    ///
    /// One part keeps its raw value; any other count concatenates.
    pub fn from_parts(mut parts: Vec<Part>) -> Self {
        if parts.len() == 1 {
            if let Some(part) = parts.pop() {
                return Expr::Single(part);
            }
        }
        Expr::Parts(parts)
    }

    pub fn call(&self, context: &ExprContext) -> Result<Value> {
        match self {
            Expr::Single(part) => Ok(part.call(context)),
            Expr::Parts(parts) => {
                let mut text = String::new();
                for part in parts {
                    push_text(&mut text, &part.call(context));
                }
                Ok(Value::String(text))
            }
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    if let Expr::Object(object) = item {
                        if object.skip(context)? {
                            continue;
                        }
                    }
                    values.push(item.call(context)?);
                }
                Ok(Value::Array(values))
            }
            Expr::Object(object) => object.call(context),
            Expr::Exec(exec) => exec.call(context),
            Expr::Condition(condition) => condition.call(context).map(Value::Bool),
        }
    }

    /// Field names referenced through key handlers, in order of appearance
    pub fn fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields(&self, out: &mut Vec<String>) {
        let mut push_part = |part: &Part, out: &mut Vec<String>| {
            if let Part::Pipe(pipe) = part {
                for field in pipe.fields() {
                    if !out.contains(&field) {
                        out.push(field);
                    }
                }
            }
        };
        match self {
            Expr::Single(part) => push_part(part, out),
            Expr::Parts(parts) => parts.iter().for_each(|p| push_part(p, out)),
            Expr::Array(items) => items.iter().for_each(|e| e.collect_fields(out)),
            Expr::Object(object) => object.fields.iter().for_each(|f| f.value.collect_fields(out)),
            Expr::Exec(exec) => exec
                .config
                .iter()
                .chain(exec.params.iter())
                .for_each(|(_, e)| e.collect_fields(out)),
            Expr::Condition(_) => {}
        }
    }
}
