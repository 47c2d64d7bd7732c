//! Namespaced keys and key resolution
//!
//! A [`Key`] names a value as `namespace:name`. Key handlers produce the value
//! for a key given an [`ExprContext`]; key resolvers find the handler for a
//! key. A handler registered under the name `*` answers for every name in its
//! namespace.

use crate::context::ExprContext;
use crate::error::{ExprError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Namespace used when a key is written without one
pub const DEFAULT_NAMESPACE: &str = "field";

/// Name that registers a namespace-wide fallback handler
pub const WILDCARD: &str = "*";

/// Namespaced lookup key (e.g. `claims:org`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    namespace: String,
    name: String,
}

impl Key {
    /// Create a key from its parts
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `namespace:name`; a bare `name` lands in the `field` namespace
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::InvalidKey`] for empty segments or more than one `:`.
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.trim().split(':').map(str::trim).collect();
        let key = match parts.as_slice() {
            [name] => Key::new(DEFAULT_NAMESPACE, *name),
            [namespace, name] => Key::new(*namespace, *name),
            _ => return Err(ExprError::InvalidKey(text.to_string())),
        };
        if key.namespace.is_empty() || key.name.is_empty() {
            return Err(ExprError::InvalidKey(text.to_string()));
        }
        Ok(key)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The namespace-wide fallback key for this key's namespace
    pub fn wildcard(&self) -> Self {
        Key::new(self.namespace.clone(), WILDCARD)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// Produces the value of a key for a context
pub trait KeyHandler: Send + Sync {
    /// Look up the value; `Value::Null` when absent
    fn call(&self, key: &Key, context: &ExprContext) -> Value;

    /// Field names the key refers to, for consumers that rewrite queries
    fn fields(&self, _key: &Key) -> Vec<String> {
        Vec::new()
    }
}

impl<F> KeyHandler for F
where
    F: Fn(&Key, &ExprContext) -> Value + Send + Sync,
{
    fn call(&self, key: &Key, context: &ExprContext) -> Value {
        self(key, context)
    }
}

/// Finds the handler responsible for a key
pub trait KeyResolver: Send + Sync {
    fn find(&self, key: &Key) -> Option<Arc<dyn KeyHandler>>;
}

/// Handler that always returns the same value
#[derive(Debug, Clone)]
pub struct ConstKeyHandler {
    value: Value,
}

impl ConstKeyHandler {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl KeyHandler for ConstKeyHandler {
    fn call(&self, _key: &Key, _context: &ExprContext) -> Value {
        self.value.clone()
    }
}

/// Reads a dotted path from the context using the key name as the path
///
/// With a root, `repeat:item` reads `repeat.item`; without one, `path:a.b`
/// reads `a.b`.
#[derive(Debug, Clone, Default)]
pub struct PathKeyHandler {
    root: Option<String>,
}

impl PathKeyHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rooted(root: impl Into<String>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }
}

impl KeyHandler for PathKeyHandler {
    fn call(&self, key: &Key, context: &ExprContext) -> Value {
        let found = match &self.root {
            Some(root) => context.get_path(&format!("{}.{}", root, key.name())),
            None => context.get_path(key.name()),
        };
        found.cloned().unwrap_or(Value::Null)
    }

    fn fields(&self, key: &Key) -> Vec<String> {
        vec![key.name().to_string()]
    }
}

/// Map-backed key resolver with an ordered delegate chain
///
/// Lookup order: exact key, then the namespace wildcard, then each delegate in
/// the order it was added. The resolver is assembled with consuming builder
/// calls and is immutable once shared.
#[derive(Clone, Default)]
pub struct BasicKeyResolver {
    handlers: HashMap<Key, Arc<dyn KeyHandler>>,
    delegates: Vec<Arc<dyn KeyResolver>>,
}

impl BasicKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from handlers and delegates in precedence order
    pub fn with_delegates(
        handlers: HashMap<Key, Arc<dyn KeyHandler>>,
        delegates: Vec<Arc<dyn KeyResolver>>,
    ) -> Self {
        Self {
            handlers,
            delegates,
        }
    }

    /// Register a handler
    pub fn key(mut self, key: Key, handler: impl KeyHandler + 'static) -> Self {
        self.handlers.insert(key, Arc::new(handler));
        self
    }

    /// Register a shared handler
    pub fn key_arc(mut self, key: Key, handler: Arc<dyn KeyHandler>) -> Self {
        self.handlers.insert(key, handler);
        self
    }

    /// Append a delegate consulted after this resolver's own handlers
    pub fn delegate(mut self, delegate: Arc<dyn KeyResolver>) -> Self {
        self.delegates.push(delegate);
        self
    }

    /// Number of directly registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl KeyResolver for BasicKeyResolver {
    fn find(&self, key: &Key) -> Option<Arc<dyn KeyHandler>> {
        if let Some(handler) = self.handlers.get(key) {
            return Some(handler.clone());
        }
        if let Some(handler) = self.handlers.get(&key.wildcard()) {
            return Some(handler.clone());
        }
        self.delegates.iter().find_map(|delegate| delegate.find(key))
    }
}
