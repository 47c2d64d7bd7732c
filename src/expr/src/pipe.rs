//! Pipe transforms applied after a key lookup
//!
//! `${claims:name | upperCase | append:!}` resolves `claims:name` and feeds the
//! result through `upperCase`, then `append` configured with `["!"]`.

use crate::context::ExprContext;
use crate::error::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Named, argument-configurable value transform
///
/// Each occurrence of a pipe in a parsed expression owns its own instance.
/// `args` runs once at parse time; `transform` must not mutate the instance
/// and must accept `Value::Null`.
pub trait PipeTransform: Send + Sync {
    fn transform(&self, value: Value, context: &ExprContext) -> Value;

    /// Configure the instance from the colon-separated pipe arguments
    fn args(&mut self, _args: &[String]) -> Result<()> {
        Ok(())
    }
}

/// Finds a fresh transform instance by pipe name
pub trait PipeTransformResolver: Send + Sync {
    fn find(&self, name: &str) -> Option<Box<dyn PipeTransform>>;
}

/// Creates a new transform instance
pub type PipeFactory = Arc<dyn Fn() -> Box<dyn PipeTransform> + Send + Sync>;

/// Map-backed pipe resolver with an ordered delegate chain
#[derive(Clone, Default)]
pub struct BasicPipeTransformResolver {
    factories: HashMap<String, PipeFactory>,
    delegates: Vec<Arc<dyn PipeTransformResolver>>,
}

impl BasicPipeTransformResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`
    pub fn transform<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn PipeTransform> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Register a transform type constructed with `Default`
    pub fn pipe<P>(self, name: impl Into<String>) -> Self
    where
        P: PipeTransform + Default + 'static,
    {
        self.transform(name, || Box::new(P::default()))
    }

    /// Append a delegate consulted after this resolver's own registrations
    pub fn delegate(mut self, delegate: Arc<dyn PipeTransformResolver>) -> Self {
        self.delegates.push(delegate);
        self
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl PipeTransformResolver for BasicPipeTransformResolver {
    fn find(&self, name: &str) -> Option<Box<dyn PipeTransform>> {
        if let Some(factory) = self.factories.get(name) {
            return Some(factory());
        }
        self.delegates.iter().find_map(|delegate| delegate.find(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExprError;
    use serde_json::json;

    #[derive(Default)]
    struct Suffix {
        text: String,
    }

    impl PipeTransform for Suffix {
        fn transform(&self, value: Value, _context: &ExprContext) -> Value {
            match value {
                Value::String(s) => Value::String(format!("{}{}", s, self.text)),
                other => other,
            }
        }

        fn args(&mut self, args: &[String]) -> Result<()> {
            match args.first() {
                Some(text) => {
                    self.text = text.clone();
                    Ok(())
                }
                None => Err(ExprError::InvalidPipeArgs {
                    pipe: "suffix".to_string(),
                    reason: "missing text".to_string(),
                }),
            }
        }
    }

    #[test]
    fn test_instances_are_independent() {
        let resolver = BasicPipeTransformResolver::new().pipe::<Suffix>("suffix");
        let ctx = ExprContext::new();

        let mut first = resolver.find("suffix").unwrap();
        first.args(&["!".to_string()]).unwrap();
        let mut second = resolver.find("suffix").unwrap();
        second.args(&["?".to_string()]).unwrap();

        assert_eq!(first.transform(json!("a"), &ctx), json!("a!"));
        assert_eq!(second.transform(json!("a"), &ctx), json!("a?"));
        assert_eq!(first.transform(Value::Null, &ctx), Value::Null);
    }

    #[test]
    fn test_delegate_fallback() {
        let inner: Arc<dyn PipeTransformResolver> =
            Arc::new(BasicPipeTransformResolver::new().pipe::<Suffix>("suffix"));
        let resolver = BasicPipeTransformResolver::new().delegate(inner);

        assert!(resolver.find("suffix").is_some());
        assert!(resolver.find("missing").is_none());
        assert!(resolver.is_empty());
    }
}
