//! Deny-overrides policy engine

use super::{collect_policies, distinct_actions, role_set, PolicyEngine, StatementMatcher};
use crate::config::EngineConfig;
use crate::context::PolicyContext;
use crate::error::Result;
use crate::source::PolicySource;
use crate::types::{ActionCheck, Effect, Policy};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use warrant_expr::ExprEngine;

/// Deny-overrides engine over the policies of the caller's roles
///
/// Any matching Deny statement blocks the action regardless of how many
/// Allow statements match. Role-level statements and inheritance are not
/// consulted; see [`RoleGraphPolicyEngine`](super::RoleGraphPolicyEngine).
pub struct BasicPolicyEngine {
    source: Arc<dyn PolicySource>,
    matcher: StatementMatcher,
    config: EngineConfig,
}

impl BasicPolicyEngine {
    pub fn new(
        source: Arc<dyn PolicySource>,
        exprs: Arc<ExprEngine>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            policies = source.policies().len(),
            roles = source.roles().len(),
            "basic policy engine initialized"
        );
        Ok(Self {
            source,
            matcher: StatementMatcher::new(exprs),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn exprs(&self) -> &Arc<ExprEngine> {
        self.matcher.exprs()
    }

    /// Policies of every role, each once, in role order
    fn policies_for_roles(&self, roles: &[String]) -> Vec<Arc<Policy>> {
        let mut seen = HashSet::new();
        let mut policies = Vec::new();
        for role in roles {
            collect_policies(&mut policies, &mut seen, self.source.policies_for_role(role));
        }
        policies
    }

    /// Deny-overrides decision with match counts
    ///
    /// `total_statements` counts statements whose action and resource
    /// matched, before conditions are applied.
    pub fn check_action(&self, action: &str, context: &PolicyContext) -> Result<ActionCheck> {
        let expr_context = context.to_expr_context()?;
        let roles = role_set(&context.claims, &self.config.implicit_role);
        let policies = self.policies_for_roles(&roles);
        let resource = context.resource();

        let mut total_statements = 0;
        let mut allow_count = 0;
        let mut deny_count = 0;

        for statement in policies.iter().flat_map(|policy| policy.statements.iter()) {
            if !self.matcher.matches_action(statement, action) {
                continue;
            }
            if !self.matcher.matches_resource(statement, resource, &expr_context)? {
                continue;
            }
            total_statements += 1;
            if !self.matcher.matches_condition(statement, &expr_context)? {
                continue;
            }
            debug!(
                action = %action,
                statement = ?statement.id,
                effect = %statement.effect,
                "statement matched"
            );
            match statement.effect {
                Effect::Allow => allow_count += 1,
                Effect::Deny => deny_count += 1,
            }
        }

        if deny_count > 0 && self.config.log_denials {
            warn!(
                "User attempted to execute an explicitly denied action: \
                 Account ID = {}, Action = {}",
                context.claims.sub.as_deref().unwrap_or("<none>"),
                action
            );
        }

        Ok(ActionCheck {
            allowed: deny_count == 0 && allow_count > 0,
            total_statements,
            allow_count,
            deny_count,
        })
    }
}

impl PolicyEngine for BasicPolicyEngine {
    fn is_action_allowed(&self, action: &str, context: &PolicyContext) -> Result<bool> {
        Ok(self.check_action(action, context)?.allowed)
    }

    /// Actions of matching Allow statements; Deny statements are not subtracted
    fn find_allowed_actions(&self, context: &PolicyContext) -> Result<Vec<String>> {
        let expr_context = context.to_expr_context()?;
        let roles = role_set(&context.claims, &self.config.implicit_role);
        let policies = self.policies_for_roles(&roles);
        let resource = context.resource();

        let mut allowed = Vec::new();
        for statement in policies.iter().flat_map(|policy| policy.statements.iter()) {
            if self.matcher.applies(statement, resource, &expr_context)?
                && statement.effect == Effect::Allow
            {
                allowed.push(statement);
            }
        }
        Ok(distinct_actions(allowed))
    }
}
