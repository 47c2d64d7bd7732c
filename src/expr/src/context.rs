//! Evaluation context for expressions

use crate::key::KeyResolver;
use crate::value::lookup_path;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Variables available to key handlers during evaluation
///
/// A context may carry its own key resolver. When present it is consulted
/// before the resolver an expression was parsed against, which lets a caller
/// override or add keys for a single evaluation.
#[derive(Clone, Default)]
pub struct ExprContext {
    values: HashMap<String, Value>,
    keys: Option<Arc<dyn KeyResolver>>,
}

impl ExprContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context from existing variables
    pub fn from_map(values: HashMap<String, Value>) -> Self {
        Self { values, keys: None }
    }

    /// Add a variable
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Attach a context-local key resolver
    pub fn with_keys(mut self, keys: Arc<dyn KeyResolver>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Insert or replace a variable
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Get a top-level variable
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Resolve a dotted path whose first segment names a variable
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let root = self.values.get(head)?;
        match rest {
            Some(rest) => lookup_path(root, rest),
            None => Some(root),
        }
    }

    /// Context-local key resolver, if any
    pub fn keys(&self) -> Option<&Arc<dyn KeyResolver>> {
        self.keys.as_ref()
    }

    /// All variables
    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }
}

impl fmt::Debug for ExprContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExprContext")
            .field("values", &self.values)
            .field("keys", &self.keys.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_builder() {
        let ctx = ExprContext::new()
            .with("claims", json!({"sub": "1234", "org": {"id": "root"}}))
            .with("resource", json!("em2m:ident:account:1234"));

        assert_eq!(ctx.get("resource"), Some(&json!("em2m:ident:account:1234")));
        assert_eq!(ctx.get_path("claims.sub"), Some(&json!("1234")));
        assert_eq!(ctx.get_path("claims.org.id"), Some(&json!("root")));
        assert_eq!(ctx.get_path("claims.missing"), None);
        assert!(ctx.keys().is_none());
    }
}
