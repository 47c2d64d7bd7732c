//! Role-graph policy engine

use super::{
    collect_policies, distinct_actions, role_set, PolicyEngine, RoleGraph, StatementMatcher,
};
use crate::config::EngineConfig;
use crate::context::PolicyContext;
use crate::error::Result;
use crate::source::PolicySource;
use crate::types::{Effect, Policy, Role, Statement};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use warrant_expr::{ExprContext, ExprEngine};

/// Allow-only engine over the expanded role inheritance graph
///
/// Statements come from the policies of every expanded role plus the roles'
/// own statements. A role whose condition fails contributes nothing, but the
/// roles it inherits are still considered. Deny statements are ignored.
pub struct RoleGraphPolicyEngine {
    source: Arc<dyn PolicySource>,
    graph: RoleGraph,
    matcher: StatementMatcher,
    config: EngineConfig,
}

/// Statements gathered for one decision
struct Grants {
    policies: Vec<Arc<Policy>>,
    roles: Vec<Arc<Role>>,
}

impl Grants {
    fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.policies
            .iter()
            .flat_map(|policy| policy.statements.iter())
            .chain(self.roles.iter().flat_map(|role| role.statements.iter()))
    }
}

impl RoleGraphPolicyEngine {
    /// # Errors
    ///
    /// Fails on invalid configuration or cyclic role inheritance.
    pub fn new(
        source: Arc<dyn PolicySource>,
        exprs: Arc<ExprEngine>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let graph = RoleGraph::new(source.roles(), config.max_role_depth)?;
        info!(
            policies = source.policies().len(),
            roles = graph.len(),
            "role graph policy engine initialized"
        );
        Ok(Self {
            source,
            graph,
            matcher: StatementMatcher::new(exprs),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> &RoleGraph {
        &self.graph
    }

    pub fn exprs(&self) -> &Arc<ExprEngine> {
        self.matcher.exprs()
    }

    /// Expanded role ids, highest priority first, ties in expansion order
    pub fn expand_roles(&self, context: &PolicyContext) -> Result<Vec<String>> {
        let roles = role_set(&context.claims, &self.config.implicit_role);
        let mut expanded = self.graph.expand_all(&roles)?;
        expanded.sort_by_key(|id| std::cmp::Reverse(self.graph.role(id).map_or(0, |r| r.priority)));
        Ok(expanded)
    }

    fn grants(&self, context: &PolicyContext, expr_context: &ExprContext) -> Result<Grants> {
        let mut seen = HashSet::new();
        let mut grants = Grants {
            policies: Vec::new(),
            roles: Vec::new(),
        };

        for id in self.expand_roles(context)? {
            match self.graph.role(&id) {
                Some(role) => {
                    if !role.condition.call(expr_context)? {
                        debug!(role = %id, "role condition not met");
                        continue;
                    }
                    let policies = self.source.policies_for_role(&id);
                    collect_policies(&mut grants.policies, &mut seen, policies);
                    grants.roles.push(role.clone());
                }
                None => {
                    let policies = self.source.policies_for_role(&id);
                    collect_policies(&mut grants.policies, &mut seen, policies);
                }
            }
        }
        Ok(grants)
    }
}

impl PolicyEngine for RoleGraphPolicyEngine {
    /// Exact membership in [`find_allowed_actions`](Self::find_allowed_actions)
    fn is_action_allowed(&self, action: &str, context: &PolicyContext) -> Result<bool> {
        let allowed = self.find_allowed_actions(context)?.iter().any(|a| a == action);
        debug!(action = %action, allowed, "role graph decision");
        Ok(allowed)
    }

    fn find_allowed_actions(&self, context: &PolicyContext) -> Result<Vec<String>> {
        let expr_context = context.to_expr_context()?;
        let grants = self.grants(context, &expr_context)?;
        let resource = context.resource();

        let mut allowed = Vec::new();
        for statement in grants.statements() {
            if statement.effect == Effect::Allow
                && self.matcher.applies(statement, resource, &expr_context)?
            {
                allowed.push(statement);
            }
        }
        Ok(distinct_actions(allowed))
    }
}
