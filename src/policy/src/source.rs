//! Policy sources

use crate::document::{DocumentCompiler, PolicyDocument, RoleDocument};
use crate::error::{PolicyError, Result};
use crate::types::{Policy, Role};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Supplies loaded policies and roles to the engines
pub trait PolicySource: Send + Sync {
    fn policies(&self) -> &[Arc<Policy>];

    fn roles(&self) -> &[Arc<Role>];

    /// Policies referenced by a role; unknown ids are skipped
    fn policies_for_role(&self, role: &str) -> Vec<Arc<Policy>>;
}

/// Immutable in-memory policy source
#[derive(Debug, Default)]
pub struct ListPolicySource {
    policies: Vec<Arc<Policy>>,
    roles: Vec<Arc<Role>>,
    policy_index: HashMap<String, usize>,
    role_index: HashMap<String, usize>,
}

impl ListPolicySource {
    /// Build from compiled policies and roles; later duplicates replace earlier ones
    pub fn new(policies: Vec<Policy>, roles: Vec<Role>) -> Self {
        let mut source = Self::default();
        for policy in policies {
            match source.policy_index.get(&policy.id) {
                Some(&i) => source.policies[i] = Arc::new(policy),
                None => {
                    source.policy_index.insert(policy.id.clone(), source.policies.len());
                    source.policies.push(Arc::new(policy));
                }
            }
        }
        for role in roles {
            match source.role_index.get(&role.id) {
                Some(&i) => source.roles[i] = Arc::new(role),
                None => {
                    source.role_index.insert(role.id.clone(), source.roles.len());
                    source.roles.push(Arc::new(role));
                }
            }
        }
        source
    }

    /// Compile documents into a source
    pub fn from_documents(
        compiler: &DocumentCompiler,
        policies: &[PolicyDocument],
        roles: &[RoleDocument],
    ) -> Result<Self> {
        let policies = policies
            .iter()
            .map(|doc| compiler.compile_policy(doc))
            .collect::<Result<Vec<_>>>()?;
        let roles = roles
            .iter()
            .map(|doc| compiler.compile_role(doc))
            .collect::<Result<Vec<_>>>()?;
        info!(policies = policies.len(), roles = roles.len(), "policy source loaded");
        Ok(Self::new(policies, roles))
    }

    /// Compile JSON arrays of policy and role documents
    pub fn from_json(compiler: &DocumentCompiler, policies: Value, roles: Value) -> Result<Self> {
        let policies: Vec<PolicyDocument> = match policies {
            Value::Null => Vec::new(),
            Value::Array(_) => serde_json::from_value(policies)?,
            _ => {
                return Err(PolicyError::InvalidDocument(
                    "policies must be a JSON array".to_string(),
                ))
            }
        };
        let roles: Vec<RoleDocument> = match roles {
            Value::Null => Vec::new(),
            Value::Array(_) => serde_json::from_value(roles)?,
            _ => return Err(PolicyError::InvalidDocument("roles must be a JSON array".to_string())),
        };
        Self::from_documents(compiler, &policies, &roles)
    }

    pub fn policy(&self, id: &str) -> Option<&Arc<Policy>> {
        self.policy_index.get(id).map(|&i| &self.policies[i])
    }

    pub fn role(&self, id: &str) -> Option<&Arc<Role>> {
        self.role_index.get(id).map(|&i| &self.roles[i])
    }
}

impl PolicySource for ListPolicySource {
    fn policies(&self) -> &[Arc<Policy>] {
        &self.policies
    }

    fn roles(&self) -> &[Arc<Role>] {
        &self.roles
    }

    fn policies_for_role(&self, role: &str) -> Vec<Arc<Policy>> {
        match self.role(role) {
            Some(role) => role
                .policies
                .iter()
                .filter_map(|id| self.policy(id).cloned())
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Statement;

    #[test]
    fn test_policies_for_role() {
        let source = ListPolicySource::new(
            vec![
                Policy::new("accounts", vec![Statement::allow(["ident:*"])]),
                Policy::new("reports", vec![]),
            ],
            vec![Role::new("sales").with_policies(["accounts", "missing", "reports"])],
        );

        let ids: Vec<String> = source
            .policies_for_role("sales")
            .iter()
            .map(|p| p.id.clone())
            .collect();
        assert_eq!(ids, vec!["accounts".to_string(), "reports".to_string()]);
        assert!(source.policies_for_role("nobody").is_empty());
    }

    #[test]
    fn test_duplicate_ids_replace() {
        let source = ListPolicySource::new(
            vec![
                Policy::new("p", vec![]),
                Policy::new("p", vec![Statement::allow(["a"])]),
            ],
            vec![],
        );
        assert_eq!(source.policies().len(), 1);
        assert_eq!(source.policy("p").map(|p| p.statements.len()), Some(1));
    }
}
