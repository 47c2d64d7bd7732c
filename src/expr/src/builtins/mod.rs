//! Standard keys, pipes, conditions and exec handlers
//!
//! [`ExprEngine::standard`](crate::ExprEngine::standard) installs everything
//! here as the last delegate of each resolver chain, so caller registrations
//! always take precedence.

pub mod arrays;
pub mod bools;
pub mod dates;
pub mod debug;
pub mod numbers;
pub mod objects;
pub mod strings;

use crate::condition::{BasicConditionResolver, ConditionHandler, ConditionResolver};
use crate::exec::BasicExecResolver;
use crate::key::{BasicKeyResolver, Key, PathKeyHandler};
use crate::pipe::BasicPipeTransformResolver;
use std::sync::Arc;

/// Accepts `StringEquals` and `stringEquals` alike
struct LenientConditions(BasicConditionResolver);

impl ConditionResolver for LenientConditions {
    fn get_condition(&self, op: &str) -> Option<Arc<dyn ConditionHandler>> {
        self.0.get_condition(op).or_else(|| {
            let mut chars = op.chars();
            let first = chars.next()?;
            if !first.is_lowercase() {
                return None;
            }
            let upper: String = first.to_uppercase().chain(chars).collect();
            self.0.get_condition(&upper)
        })
    }
}

pub fn keys() -> BasicKeyResolver {
    BasicKeyResolver::new()
        .key(Key::new("path", "*"), PathKeyHandler::new())
        .key(Key::new("var", "*"), PathKeyHandler::rooted("variables"))
        .key(Key::new("repeat", "*"), PathKeyHandler::rooted("repeat"))
        .delegate(Arc::new(numbers::keys()))
        .delegate(Arc::new(dates::keys()))
}

pub fn pipes() -> BasicPipeTransformResolver {
    BasicPipeTransformResolver::new()
        .delegate(Arc::new(strings::pipes()))
        .delegate(Arc::new(numbers::pipes()))
        .delegate(Arc::new(arrays::pipes()))
        .delegate(Arc::new(objects::pipes()))
        .delegate(Arc::new(dates::pipes()))
        .delegate(Arc::new(debug::pipes()))
}

/// All standard conditions; operator names may start lower-case
pub fn conditions() -> Arc<dyn ConditionResolver> {
    let resolver = BasicConditionResolver::new()
        .delegate(Arc::new(strings::conditions()))
        .delegate(Arc::new(numbers::conditions()))
        .delegate(Arc::new(dates::conditions()))
        .delegate(Arc::new(bools::conditions()));
    Arc::new(LenientConditions(resolver))
}

pub fn execs() -> BasicExecResolver {
    BasicExecResolver::new()
        .delegate(Arc::new(debug::execs()))
        .delegate(Arc::new(objects::execs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExprContext;
    use crate::exec::ExecResolver;
    use crate::key::KeyResolver;
    use crate::pipe::PipeTransformResolver;
    use serde_json::json;

    #[test]
    fn test_lower_case_operators() {
        let resolver = conditions();
        assert!(resolver.get_condition("StringEquals").is_some());
        assert!(resolver.get_condition("stringEquals").is_some());
        assert!(resolver.get_condition("forAnyValue:StringLike").is_some());
        assert!(resolver.get_condition("numberGreaterThan").is_some());
        assert!(resolver.get_condition("bool").is_some());
        assert!(resolver.get_condition("dateLessThan").is_some());
        assert!(resolver.get_condition("stringSomething").is_none());
    }

    #[test]
    fn test_standard_keys() {
        let ctx = ExprContext::new()
            .with("variables", json!({"region": "us"}))
            .with("claims", json!({"org": "root"}));
        let keys = keys();

        let value = |text: &str| {
            let key = Key::parse(text).unwrap();
            keys.find(&key).unwrap().call(&key, &ctx)
        };
        assert_eq!(value("var:region"), json!("us"));
        assert_eq!(value("path:claims.org"), json!("root"));
        assert!(value("Math:PI").as_f64().unwrap() > 3.14);
        assert!(value("Date:now").as_str().unwrap().ends_with('Z'));
        let random = value("Math:random").as_f64().unwrap();
        assert!((0.0..1.0).contains(&random));
    }

    #[test]
    fn test_standard_pipes_and_execs() {
        let pipes = pipes();
        for name in [
            "upperCase",
            "urlEncode",
            "number",
            "first",
            "take",
            "associateBy",
            "path",
            "pathBy",
            "formatDate",
            "dateMath",
            "log",
            "multiply",
        ] {
            assert!(pipes.find(name).is_some(), "missing pipe {}", name);
        }
        let execs = execs();
        assert!(execs.find_handler("log").is_some());
        assert!(execs.find_handler("object:pair").is_some());
    }
}
