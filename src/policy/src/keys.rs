//! Key handlers exposing the decision context to expressions

use crate::context::{CLAIMS_VAR, ENVIRONMENT_VAR};
use serde_json::Value;
use warrant_expr::{BasicKeyResolver, ExprContext, Key, KeyHandler};

/// Reads `<variable>.<key name>` from the expression context
#[derive(Debug, Clone)]
pub struct ContextKeyHandler {
    variable: &'static str,
}

impl ContextKeyHandler {
    /// `claims:<name>`
    pub fn claims() -> Self {
        Self { variable: CLAIMS_VAR }
    }

    /// `env:<name>` and `environment:<name>`
    pub fn environment() -> Self {
        Self {
            variable: ENVIRONMENT_VAR,
        }
    }
}

impl KeyHandler for ContextKeyHandler {
    fn call(&self, key: &Key, context: &ExprContext) -> Value {
        context
            .get(self.variable)
            .and_then(|scope| scope.get(key.name()))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// Resolver for the `claims`, `env` and `environment` namespaces
pub fn policy_keys() -> BasicKeyResolver {
    BasicKeyResolver::new()
        .key(Key::new("claims", "*"), ContextKeyHandler::claims())
        .key(Key::new("env", "*"), ContextKeyHandler::environment())
        .key(Key::new("environment", "*"), ContextKeyHandler::environment())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Claims, Environment, PolicyContext};
    use serde_json::json;
    use warrant_expr::KeyResolver;

    #[test]
    fn test_context_keys() {
        let ctx = PolicyContext::new(
            Claims::new()
                .with_sub("1234")
                .with_roles(["sales"])
                .with_extra("features", json!(["maintenance"])),
            Environment::new().with_token("abc"),
        )
        .to_expr_context()
        .unwrap();

        let keys = policy_keys();
        let value = |text: &str| {
            let key = Key::parse(text).unwrap();
            keys.find(&key).unwrap().call(&key, &ctx)
        };

        assert_eq!(value("claims:sub"), json!("1234"));
        assert_eq!(value("claims:roles"), json!(["sales"]));
        assert_eq!(value("claims:features"), json!(["maintenance"]));
        assert_eq!(value("claims:org"), Value::Null);
        assert_eq!(value("env:Token"), json!("abc"));
        assert_eq!(value("environment:Token"), json!("abc"));
    }
}
