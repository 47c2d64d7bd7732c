//! Exec handlers: named operators embedded in tree expressions
//!
//! An object carrying `"@exec": "<op>"` in a tree document becomes an exec
//! node. Its remaining fields are parameter expressions and `"@config"` holds
//! configuration expressions; both are evaluated before the handler runs.

use crate::context::ExprContext;
use crate::error::Result;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Evaluated arguments for one exec invocation
#[derive(Debug, Clone, Copy)]
pub struct ExecCall<'a> {
    pub op: &'a str,
    pub config: &'a Map<String, Value>,
    pub params: &'a Map<String, Value>,
}

/// Implementation of an exec operator
pub trait ExecHandler: Send + Sync {
    fn call(&self, call: ExecCall<'_>, context: &ExprContext) -> Result<Value>;
}

/// Finds the handler for an exec operator
pub trait ExecResolver: Send + Sync {
    fn find_handler(&self, op: &str) -> Option<Arc<dyn ExecHandler>>;
}

/// Map-backed exec resolver with an ordered delegate chain
#[derive(Clone, Default)]
pub struct BasicExecResolver {
    handlers: HashMap<String, Arc<dyn ExecHandler>>,
    delegates: Vec<Arc<dyn ExecResolver>>,
}

impl BasicExecResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(mut self, op: impl Into<String>, handler: impl ExecHandler + 'static) -> Self {
        self.handlers.insert(op.into(), Arc::new(handler));
        self
    }

    pub fn delegate(mut self, delegate: Arc<dyn ExecResolver>) -> Self {
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

impl ExecResolver for BasicExecResolver {
    fn find_handler(&self, op: &str) -> Option<Arc<dyn ExecHandler>> {
        if let Some(handler) = self.handlers.get(op) {
            return Some(handler.clone());
        }
        self.delegates.iter().find_map(|delegate| delegate.find_handler(op))
    }
}
