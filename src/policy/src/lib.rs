//! # Warrant Policy Engine
//!
//! Role-based authorization decisions over statement policies.
//!
//! ## Features
//!
//! - **Policy documents** compiled once against an expression engine
//! - **Deny-overrides engine** with allow/deny match counts
//! - **Role-graph engine** with inheritance, role conditions and priorities
//! - **Resource patterns** that are themselves expressions (`${ident:organization}:*`)
//! - **Thread-safe**: engines are immutable after construction
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use warrant_policy::{
//!     expression_engine, BasicPolicyEngine, Claims, DocumentCompiler, EngineConfig, Environment,
//!     ListPolicySource, PolicyContext, PolicyEngine,
//! };
//!
//! let config = EngineConfig::default();
//! let exprs = Arc::new(expression_engine(&config, Vec::new()));
//! let compiler = DocumentCompiler::new(exprs.clone());
//!
//! let source = ListPolicySource::from_json(
//!     &compiler,
//!     json!([{ "id": "accounts", "statements": [
//!         {
//!             "effect": "Allow",
//!             "actions": ["ident:UpdateMyAccount"],
//!             "resource": "em2m:ident:account:*"
//!         }
//!     ]}]),
//!     json!([{ "id": "sales", "policies": ["accounts"] }]),
//! )
//! .unwrap();
//!
//! let engine = BasicPolicyEngine::new(Arc::new(source), exprs, config).unwrap();
//! let claims = Claims::new().with_sub("1234").with_roles(["sales"]);
//! let ctx = PolicyContext::new(claims, Environment::new())
//!     .with_resource("em2m:ident:account:1234");
//!
//! assert!(engine.is_action_allowed("ident:UpdateMyAccount", &ctx).unwrap());
//! assert!(!engine.is_action_allowed("foo:bar", &ctx).unwrap());
//! ```

pub mod config;
pub mod context;
pub mod document;
pub mod engine;
pub mod error;
pub mod keys;
pub mod pattern;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use config::{EngineConfig, DEFAULT_IMPLICIT_ROLE};
pub use context::{Claims, Environment, PolicyContext};
pub use document::{DocumentCompiler, PolicyDocument, RoleDocument, StatementDocument};
pub use engine::{
    expression_engine, role_set, BasicPolicyEngine, PolicyEngine, RoleGraph, RoleGraphPolicyEngine,
};
pub use error::{PolicyError, Result};
pub use keys::{policy_keys, ContextKeyHandler};
pub use pattern::PatternCache;
pub use source::{ListPolicySource, PolicySource};
pub use types::{ActionCheck, Effect, Policy, ResourcePattern, Role, Statement};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
