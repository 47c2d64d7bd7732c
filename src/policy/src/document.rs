//! Policy and role documents and their compilation
//!
//! Documents are the serde-facing shape of policies and roles:
//!
//! ```json
//! { "id": "sales", "label": "Sales", "statements": [
//!     { "effect": "Allow", "actions": ["ident:UpdateMyAccount"],
//!       "resource": "em2m:ident:account:*",
//!       "condition": { "StringEquals": { "claims:org": "root" } } } ] }
//! ```
//!
//! [`DocumentCompiler`] compiles every condition and resource expression up
//! front, so a broken document fails at load time and decisions never parse.

use crate::error::{PolicyError, Result};
use crate::types::{Effect, Policy, ResourcePattern, Role, Statement};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;
use warrant_expr::ExprEngine;

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Accept a single string as a one-element list
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub effect: Effect,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub resource: Vec<String>,
    /// Condition document (`{op: {key: operands}}`)
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub condition: Value,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub allow: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub deny: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub statements: Vec<StatementDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub inherits: Vec<String>,
    #[serde(default)]
    pub statements: Vec<StatementDocument>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub condition: Value,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub custom_data: Map<String, Value>,
}

/// Compiles documents into the immutable policy model
#[derive(Clone)]
pub struct DocumentCompiler {
    engine: Arc<ExprEngine>,
}

impl DocumentCompiler {
    pub fn new(engine: Arc<ExprEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<ExprEngine> {
        &self.engine
    }

    pub fn compile_statement(&self, doc: &StatementDocument) -> Result<Statement> {
        let resource = doc
            .resource
            .iter()
            .map(|text| ResourcePattern::compile(&self.engine, text))
            .collect::<warrant_expr::Result<Vec<_>>>()?;
        let condition = self.engine.compile_condition_document(&doc.condition)?;

        Ok(Statement {
            id: doc.id.clone(),
            effect: doc.effect,
            actions: doc.actions.clone(),
            resource,
            condition,
            allow: doc.allow.clone(),
            deny: doc.deny.clone(),
        })
    }

    fn compile_statements(&self, docs: &[StatementDocument]) -> Result<Vec<Statement>> {
        docs.iter().map(|doc| self.compile_statement(doc)).collect()
    }

    pub fn compile_policy(&self, doc: &PolicyDocument) -> Result<Policy> {
        if doc.id.trim().is_empty() {
            return Err(PolicyError::InvalidDocument("policy id must not be empty".to_string()));
        }
        let statements = self.compile_statements(&doc.statements)?;
        debug!(policy = %doc.id, statements = statements.len(), "compiled policy");
        Ok(Policy {
            id: doc.id.clone(),
            label: doc.label.clone().unwrap_or_else(|| doc.id.clone()),
            statements,
        })
    }

    pub fn compile_role(&self, doc: &RoleDocument) -> Result<Role> {
        if doc.id.trim().is_empty() {
            return Err(PolicyError::InvalidDocument("role id must not be empty".to_string()));
        }
        let statements = self.compile_statements(&doc.statements)?;
        let condition = self.engine.compile_condition_document(&doc.condition)?;
        debug!(role = %doc.id, statements = statements.len(), "compiled role");
        Ok(Role {
            id: doc.id.clone(),
            label: doc.label.clone().unwrap_or_else(|| doc.id.clone()),
            policies: doc.policies.clone(),
            inherits: doc.inherits.clone(),
            statements,
            condition,
            priority: doc.priority,
            custom_data: doc.custom_data.clone(),
        })
    }

    /// Deserialize and compile a policy
    pub fn policy_from_json(&self, value: Value) -> Result<Policy> {
        let doc: PolicyDocument = serde_json::from_value(value)?;
        self.compile_policy(&doc)
    }

    /// Deserialize and compile a role
    pub fn role_from_json(&self, value: Value) -> Result<Role> {
        let doc: RoleDocument = serde_json::from_value(value)?;
        self.compile_role(&doc)
    }
}
