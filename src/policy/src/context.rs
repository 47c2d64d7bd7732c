//! Per-request decision context: claims, environment and resource

use crate::error::{PolicyError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use warrant_expr::{ExprContext, KeyResolver};

/// Context variable holding the claims
pub const CLAIMS_VAR: &str = "claims";
/// Context variable holding the environment
pub const ENVIRONMENT_VAR: &str = "environment";
/// Context variable holding the resource
pub const RESOURCE_VAR: &str = "resource";

/// Token claims of the caller
///
/// Well-known claims are typed fields; anything else lands in `extra`.
/// Timestamps are seconds since the epoch on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub exp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub nbf: Option<DateTime<Utc>>,

    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Tenant id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,

    /// Device id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,

    /// Brand id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,

    #[serde(default, rename = "orgPath", skip_serializing_if = "Option::is_none")]
    pub org_path: Option<Vec<String>>,

    /// Role ids; a missing, null or non-list claim means no roles
    #[serde(default, deserialize_with = "lenient_roles")]
    pub roles: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn lenient_roles<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(role) => Some(role),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

impl Claims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sub(mut self, sub: impl Into<String>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Add a claim outside the well-known set
    pub fn with_extra(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    /// Look up a claim outside the well-known set
    pub fn extra(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}

/// Request environment (transport metadata)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Raw bearer token
    #[serde(rename = "Token", default)]
    pub token: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    pub fn extra(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}

/// Input bundle for a single decision
///
/// Built per request and discarded after the decision. `keys`, when set,
/// takes precedence over the engine's key resolver for this decision only.
#[derive(Clone, Default)]
pub struct PolicyContext {
    pub claims: Claims,
    pub environment: Environment,
    pub resource: Option<String>,
    pub keys: Option<Arc<dyn KeyResolver>>,
    /// Additional context variables
    pub extra: Map<String, Value>,
}

impl PolicyContext {
    pub fn new(claims: Claims, environment: Environment) -> Self {
        Self {
            claims,
            environment,
            ..Self::default()
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_keys(mut self, keys: Arc<dyn KeyResolver>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    /// Resource, or `None` when absent or blank
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref().filter(|r| !r.trim().is_empty())
    }

    /// Build from a JSON map with `claims`, `environment` and `resource`
    /// entries; other entries become extra variables
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(PolicyError::InvalidDocument(
                "decision context must be a JSON object".to_string(),
            ));
        };

        let claims = match map.remove(CLAIMS_VAR) {
            Some(claims) => serde_json::from_value(claims)?,
            None => Claims::default(),
        };
        let environment = match map.remove(ENVIRONMENT_VAR) {
            Some(environment) => serde_json::from_value(environment)?,
            None => Environment::default(),
        };
        let resource = match map.remove(RESOURCE_VAR) {
            None | Some(Value::Null) => None,
            Some(Value::String(resource)) => Some(resource),
            Some(_) => {
                return Err(PolicyError::InvalidDocument("resource must be a string".to_string()))
            }
        };

        Ok(Self {
            claims,
            environment,
            resource,
            keys: None,
            extra: map,
        })
    }

    /// Expression context exposing `claims`, `environment` and `resource`
    pub fn to_expr_context(&self) -> Result<ExprContext> {
        let mut context = ExprContext::new();
        for (name, value) in &self.extra {
            context.insert(name.clone(), value.clone());
        }
        context.insert(CLAIMS_VAR, serde_json::to_value(&self.claims)?);
        context.insert(ENVIRONMENT_VAR, serde_json::to_value(&self.environment)?);
        context.insert(
            RESOURCE_VAR,
            self.resource.clone().map(Value::String).unwrap_or(Value::Null),
        );
        if let Some(keys) = &self.keys {
            context = context.with_keys(keys.clone());
        }
        Ok(context)
    }
}

impl fmt::Debug for PolicyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyContext")
            .field("claims", &self.claims)
            .field("environment", &self.environment)
            .field("resource", &self.resource)
            .field("keys", &self.keys.is_some())
            .field("extra", &self.extra)
            .finish()
    }
}
