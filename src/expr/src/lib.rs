//! # Warrant Expression Engine
//!
//! A small interpolation and predicate language used by the policy engine.
//!
//! ## Features
//!
//! - **Namespaced keys** (`claims:org`) resolved through ordered resolver chains
//! - **Pipes** chained after a key lookup (`${claims:name | upperCase}`)
//! - **Conditions** over key values and operand expressions
//! - **Tree expressions** compiled from JSON documents, with `@exec` operators
//! - **Compiled expression cache** shared across threads
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use warrant_expr::{BasicKeyResolver, ConstKeyHandler, ExprContext, ExprEngine, Key};
//!
//! let keys = BasicKeyResolver::new()
//!     .key(Key::new("claims", "org"), ConstKeyHandler::new(json!("root")));
//! let engine = ExprEngine::builder()
//!     .keys(Arc::new(keys))
//!     .with_standard_library()
//!     .build();
//!
//! let value = engine.eval("org: ${claims:org | upperCase}", &ExprContext::new()).unwrap();
//! assert_eq!(value, json!("org: ROOT"));
//! ```

pub mod builtins;
pub mod condition;
pub mod context;
pub mod engine;
pub mod error;
pub mod exec;
pub mod expr;
pub mod key;
pub mod parser;
pub mod pipe;
pub mod tree;
pub mod value;

// Re-export commonly used types
pub use condition::{
    parse_conditions, BasicConditionResolver, CompiledCondition, Condition, ConditionExpr,
    ConditionHandler, ConditionResolver, Not,
};
pub use context::ExprContext;
pub use engine::{CacheStats, ExprEngine, ExprEngineBuilder};
pub use error::{ExprError, Result};
pub use exec::{BasicExecResolver, ExecCall, ExecHandler, ExecResolver};
pub use expr::{ExecExpr, Expr, FieldExpr, ObjectExpr, Part, PipePart};
pub use key::{BasicKeyResolver, ConstKeyHandler, Key, KeyHandler, KeyResolver, PathKeyHandler};
pub use parser::ExprParser;
pub use pipe::{BasicPipeTransformResolver, PipeTransform, PipeTransformResolver};
pub use tree::TreeParser;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
