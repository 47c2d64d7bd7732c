//! Compiled policy model
//!
//! These types are built once by [`DocumentCompiler`](crate::DocumentCompiler)
//! (or directly in code) and are immutable afterwards.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use warrant_expr::{ConditionExpr, Expr, ExprContext, ExprEngine};

/// Statement effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => write!(f, "Allow"),
            Effect::Deny => write!(f, "Deny"),
        }
    }
}

/// Resource pattern compiled from its expression text
///
/// Evaluates to the wildcard pattern a resource is matched against.
#[derive(Debug, Clone)]
pub struct ResourcePattern {
    source: String,
    expr: Arc<Expr>,
}

impl ResourcePattern {
    /// Compile `text` against the key and pipe resolvers of `engine`
    pub fn compile(engine: &ExprEngine, text: &str) -> warrant_expr::Result<Self> {
        Ok(Self {
            source: text.to_string(),
            expr: engine.compile(text)?,
        })
    }

    /// Pattern used as written, without interpolation
    pub fn literal(text: impl Into<String>) -> Self {
        let source = text.into();
        Self {
            expr: Arc::new(Expr::constant(Value::String(source.clone()))),
            source,
        }
    }

    /// Expression text as written in the document
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The bare `*` pattern
    pub fn is_wildcard(&self) -> bool {
        self.source == "*"
    }

    pub fn call(&self, context: &ExprContext) -> warrant_expr::Result<Value> {
        self.expr.call(context)
    }
}

/// One allow or deny rule
#[derive(Debug)]
pub struct Statement {
    pub id: Option<String>,
    pub effect: Effect,
    /// Action globs (`ident:*`)
    pub actions: Vec<String>,
    /// Resource patterns, evaluated against the context before matching
    pub resource: Vec<ResourcePattern>,
    pub condition: ConditionExpr,
    /// Extension data carried through from the document
    pub allow: Map<String, Value>,
    pub deny: Map<String, Value>,
}

impl Statement {
    pub fn new<I, S>(effect: Effect, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: None,
            effect,
            actions: actions.into_iter().map(Into::into).collect(),
            resource: Vec::new(),
            condition: ConditionExpr::always(),
            allow: Map::new(),
            deny: Map::new(),
        }
    }

    pub fn allow<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Effect::Allow, actions)
    }

    pub fn deny<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Effect::Deny, actions)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_resource<I>(mut self, resource: I) -> Self
    where
        I: IntoIterator<Item = ResourcePattern>,
    {
        self.resource = resource.into_iter().collect();
        self
    }

    pub fn with_condition(mut self, condition: ConditionExpr) -> Self {
        self.condition = condition;
        self
    }
}

/// Named group of statements
#[derive(Debug)]
pub struct Policy {
    pub id: String,
    pub label: String,
    pub statements: Vec<Statement>,
}

impl Policy {
    pub fn new(id: impl Into<String>, statements: Vec<Statement>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            statements,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Role with referenced policies, inline statements and inherited roles
#[derive(Debug)]
pub struct Role {
    pub id: String,
    pub label: String,
    /// Policy ids
    pub policies: Vec<String>,
    /// Inherited role ids
    pub inherits: Vec<String>,
    pub statements: Vec<Statement>,
    /// Applicability gate for the role's own grants
    pub condition: ConditionExpr,
    /// Higher priorities are considered first
    pub priority: i32,
    pub custom_data: Map<String, Value>,
}

impl Role {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            policies: Vec::new(),
            inherits: Vec::new(),
            statements: Vec::new(),
            condition: ConditionExpr::always(),
            priority: 0,
            custom_data: Map::new(),
        }
    }

    pub fn with_policies<I, S>(mut self, policies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policies = policies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_inherits<I, S>(mut self, inherits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inherits = inherits.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_statements(mut self, statements: Vec<Statement>) -> Self {
        self.statements = statements;
        self
    }

    pub fn with_condition(mut self, condition: ConditionExpr) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Diagnostic result of a deny-overrides decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionCheck {
    pub allowed: bool,
    /// Statements whose action and resource matched
    pub total_statements: usize,
    pub allow_count: usize,
    pub deny_count: usize,
}
