//! Policy decision engines
//!
//! Two strategies share the statement matching rules in this module:
//!
//! - [`BasicPolicyEngine`]: deny-overrides over the policies of the caller's
//!   roles, with [`ActionCheck`](crate::ActionCheck) diagnostics
//! - [`RoleGraphPolicyEngine`]: allow-only over an expanded role inheritance
//!   graph, including role-level statements and role conditions
//!
//! ```text
//! claims.roles + implicit role
//!        │
//!        ▼
//!  statements ──► action glob ──► resource pattern ──► condition ──► decision
//! ```

pub mod basic;
pub mod graph;
pub mod roles;

pub use basic::BasicPolicyEngine;
pub use graph::RoleGraphPolicyEngine;
pub use roles::RoleGraph;

use crate::config::EngineConfig;
use crate::context::{Claims, PolicyContext};
use crate::error::{PolicyError, Result};
use crate::keys::policy_keys;
use crate::pattern::PatternCache;
use crate::types::{Policy, ResourcePattern, Statement};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use warrant_expr::value::type_name;
use warrant_expr::{ExprContext, ExprEngine, KeyResolver};

/// Authorization decision interface shared by both engines
pub trait PolicyEngine: Send + Sync {
    /// Whether the caller may perform `action`
    fn is_action_allowed(&self, action: &str, context: &PolicyContext) -> Result<bool>;

    /// Distinct actions granted to the caller, in statement order
    fn find_allowed_actions(&self, context: &PolicyContext) -> Result<Vec<String>>;
}

/// Build an expression engine for policy documents
///
/// Resolution order: `keys` in the order given, then `claims:*` and
/// `env:*`, then the standard library.
pub fn expression_engine(config: &EngineConfig, keys: Vec<Arc<dyn KeyResolver>>) -> ExprEngine {
    let mut builder = ExprEngine::builder().cache_capacity(config.expression_cache_capacity);
    for resolver in keys {
        builder = builder.keys(resolver);
    }
    builder
        .keys(Arc::new(policy_keys()))
        .with_standard_library()
        .build()
}

/// Claimed roles plus the implicit role, without duplicates
pub fn role_set(claims: &Claims, implicit_role: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    claims
        .roles
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(implicit_role))
        .filter(|role| seen.insert(*role))
        .map(str::to_string)
        .collect()
}

/// Append policies not already collected, by id
pub(crate) fn collect_policies(
    into: &mut Vec<Arc<Policy>>,
    seen: &mut HashSet<String>,
    policies: Vec<Arc<Policy>>,
) {
    for policy in policies {
        if seen.insert(policy.id.clone()) {
            into.push(policy);
        }
    }
}

/// Statement matching rules shared by the engines
pub(crate) struct StatementMatcher {
    exprs: Arc<ExprEngine>,
    patterns: PatternCache,
}

impl StatementMatcher {
    pub(crate) fn new(exprs: Arc<ExprEngine>) -> Self {
        Self {
            exprs,
            patterns: PatternCache::new(),
        }
    }

    pub(crate) fn exprs(&self) -> &Arc<ExprEngine> {
        &self.exprs
    }

    /// Any action glob of the statement fully matches `action`
    pub(crate) fn matches_action(&self, statement: &Statement, action: &str) -> bool {
        statement
            .actions
            .iter()
            .any(|glob| self.patterns.matches_action(glob, action))
    }

    /// Resource test
    ///
    /// Without a resource the statement matches only when its resource list
    /// is empty or holds `*`. Otherwise each compiled pattern is evaluated
    /// and the first one matching the resource wins.
    pub(crate) fn matches_resource(
        &self,
        statement: &Statement,
        resource: Option<&str>,
        context: &ExprContext,
    ) -> Result<bool> {
        let Some(resource) = resource else {
            return Ok(statement.resource.is_empty()
                || statement.resource.iter().any(ResourcePattern::is_wildcard));
        };

        for entry in &statement.resource {
            let pattern = match entry.call(context)? {
                Value::String(pattern) => pattern,
                other => {
                    return Err(PolicyError::ExpressionType {
                        expression: entry.source().to_string(),
                        found: type_name(&other).to_string(),
                    })
                }
            };
            if self.patterns.matches_resource(&pattern, resource) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(crate) fn matches_condition(
        &self,
        statement: &Statement,
        context: &ExprContext,
    ) -> Result<bool> {
        Ok(statement.condition.call(context)?)
    }

    /// Resource and condition both pass
    pub(crate) fn applies(
        &self,
        statement: &Statement,
        resource: Option<&str>,
        context: &ExprContext,
    ) -> Result<bool> {
        Ok(self.matches_resource(statement, resource, context)?
            && self.matches_condition(statement, context)?)
    }
}

/// Flatten the actions of allow statements, keeping first occurrences
pub(crate) fn distinct_actions<'a>(
    statements: impl IntoIterator<Item = &'a Statement>,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut actions = Vec::new();
    for statement in statements {
        for action in &statement.actions {
            if seen.insert(action.as_str()) {
                actions.push(action.clone());
            }
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warrant_expr::{BasicKeyResolver, ConstKeyHandler, ExprError, Key};

    fn matcher() -> StatementMatcher {
        let ident = BasicKeyResolver::new()
            .key(Key::new("ident", "organization"), ConstKeyHandler::new(json!("em2m")))
            .key(Key::new("ident", "orgPath"), ConstKeyHandler::new(json!(["root", "em2m"])));
        StatementMatcher::new(Arc::new(expression_engine(
            &EngineConfig::default(),
            vec![Arc::new(ident)],
        )))
    }

    #[test]
    fn test_role_set_appends_implicit_role_once() {
        let claims = Claims::new().with_roles(["sales", "admin", "sales"]);
        assert_eq!(role_set(&claims, "anonymous"), vec!["sales", "admin", "anonymous"]);

        let claims = Claims::new().with_roles(["anonymous", "sales"]);
        assert_eq!(role_set(&claims, "anonymous"), vec!["anonymous", "sales"]);

        assert_eq!(role_set(&Claims::new(), "guest"), vec!["guest"]);
    }

    fn compiled(m: &StatementMatcher, patterns: &[&str]) -> Statement {
        Statement::allow(["a"]).with_resource(
            patterns
                .iter()
                .map(|text| ResourcePattern::compile(m.exprs(), text).unwrap()),
        )
    }

    #[test]
    fn test_resource_without_context_resource() {
        let m = matcher();
        let ctx = ExprContext::new();
        assert!(m.matches_resource(&Statement::allow(["a"]), None, &ctx).unwrap());
        assert!(m.matches_resource(&compiled(&m, &["x", "*"]), None, &ctx).unwrap());
        assert!(!m.matches_resource(&compiled(&m, &["em2m:*"]), None, &ctx).unwrap());
    }

    #[test]
    fn test_resource_patterns_are_expressions() {
        let m = matcher();
        let ctx = ExprContext::new();
        let statement = compiled(&m, &["${ident:organization}:ident:account:*"]);
        assert!(m
            .matches_resource(&statement, Some("em2m:ident:account:1234"), &ctx)
            .unwrap());
        assert!(!m
            .matches_resource(&statement, Some("acme:ident:account:1234"), &ctx)
            .unwrap());

        // An empty resource list never matches a concrete resource
        assert!(!m
            .matches_resource(&Statement::allow(["a"]), Some("em2m:ident:account:1234"), &ctx)
            .unwrap());
    }

    #[test]
    fn test_literal_patterns_skip_interpolation() {
        let m = matcher();
        let ctx = ExprContext::new();
        let statement = Statement::allow(["a"])
            .with_resource([ResourcePattern::literal("${ident:organization}:*")]);
        assert!(m
            .matches_resource(&statement, Some("${ident:organization}:x"), &ctx)
            .unwrap());
        assert!(!m.matches_resource(&statement, Some("em2m:x"), &ctx).unwrap());
    }

    #[test]
    fn test_compiled_patterns_do_not_need_the_matcher_cache() {
        let m = matcher();
        let statement = compiled(&m, &["${ident:organization}:*"]);

        let uncached = StatementMatcher::new(Arc::new(expression_engine(
            &EngineConfig {
                expression_cache_capacity: 0,
                ..EngineConfig::default()
            },
            vec![],
        )));
        assert!(uncached
            .matches_resource(&statement, Some("em2m:x"), &ExprContext::new())
            .unwrap());
        assert_eq!(uncached.exprs().cache_stats().size, 0);
    }

    #[test]
    fn test_non_string_resource_is_a_type_error() {
        let m = matcher();
        let statement = compiled(&m, &["${ident:orgPath}"]);
        let err = m
            .matches_resource(&statement, Some("root"), &ExprContext::new())
            .unwrap_err();
        assert!(matches!(
            err,
            PolicyError::ExpressionType { ref expression, ref found }
                if found == "array" && expression == "${ident:orgPath}"
        ));
    }

    #[test]
    fn test_unknown_resource_key_fails_at_compile_time() {
        let m = matcher();
        assert!(matches!(
            ResourcePattern::compile(m.exprs(), "${ident:missing}"),
            Err(ExprError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_distinct_actions() {
        let statements = vec![
            Statement::allow(["a", "b"]),
            Statement::allow(["b", "c"]),
        ];
        assert_eq!(distinct_actions(&statements), vec!["a", "b", "c"]);
    }
}
