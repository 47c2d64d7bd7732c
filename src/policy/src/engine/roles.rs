//! Role inheritance graph
//!
//! Built once from the roles of a policy source. Construction rejects
//! inheritance cycles using a depth-first search with white/gray/black
//! marking, so expansion at decision time never loops. Both walks keep an
//! explicit stack, so chain length is bounded by memory only.

use crate::error::{PolicyError, Result};
use crate::types::Role;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// Immutable role lookup with inheritance expansion
#[derive(Debug, Clone)]
pub struct RoleGraph {
    roles: HashMap<String, Arc<Role>>,
    /// Role ids in source order
    order: Vec<String>,
    max_depth: usize,
}

impl RoleGraph {
    /// Build the graph and reject inheritance cycles
    ///
    /// # Errors
    ///
    /// `CircularInheritance` with the offending path (`a -> b -> a`).
    pub fn new(roles: &[Arc<Role>], max_depth: usize) -> Result<Self> {
        let mut graph = Self {
            roles: HashMap::with_capacity(roles.len()),
            order: Vec::with_capacity(roles.len()),
            max_depth,
        };
        for role in roles {
            if graph.roles.insert(role.id.clone(), role.clone()).is_none() {
                graph.order.push(role.id.clone());
            }
        }
        graph.detect_cycles()?;
        Ok(graph)
    }

    pub fn role(&self, id: &str) -> Option<&Arc<Role>> {
        self.roles.get(id)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    fn detect_cycles(&self) -> Result<()> {
        let mut marks: HashMap<&str, Mark> =
            self.order.iter().map(|id| (id.as_str(), Mark::White)).collect();
        // Gray roles on the current path, each with the index of its next parent
        let mut stack: Vec<(&str, usize)> = Vec::new();

        for root in &self.order {
            if marks.get(root.as_str()) != Some(&Mark::White) {
                continue;
            }
            marks.insert(root.as_str(), Mark::Gray);
            stack.push((root.as_str(), 0));

            while let Some(frame) = stack.last_mut() {
                let (id, next) = *frame;
                frame.1 += 1;

                let Some(parent) = self.roles.get(id).and_then(|role| role.inherits.get(next))
                else {
                    marks.insert(id, Mark::Black);
                    stack.pop();
                    continue;
                };

                match marks.get(parent.as_str()) {
                    Some(Mark::Gray) => {
                        let start = stack
                            .iter()
                            .position(|(p, _)| *p == parent.as_str())
                            .unwrap_or(0);
                        let mut cycle: Vec<&str> = stack[start..].iter().map(|(p, _)| *p).collect();
                        cycle.push(parent.as_str());
                        return Err(PolicyError::CircularInheritance(cycle.join(" -> ")));
                    }
                    Some(Mark::White) => {
                        marks.insert(parent.as_str(), Mark::Gray);
                        stack.push((parent.as_str(), 0));
                    }
                    // Finished, or unknown to the graph
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// The role followed by everything it inherits, depth first
    ///
    /// Unknown ids expand to themselves. Each id appears once.
    pub fn expand(&self, id: &str) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut expanded = Vec::new();
        self.expand_into(id, &mut seen, &mut expanded)?;
        Ok(expanded)
    }

    /// Expansion of every id, concatenated without duplicates
    pub fn expand_all<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut expanded = Vec::new();
        for id in ids {
            self.expand_into(id.as_ref(), &mut seen, &mut expanded)?;
        }
        debug!(roles = ids.len(), expanded = expanded.len(), "expanded role set");
        Ok(expanded)
    }

    fn expand_into(
        &self,
        id: &str,
        seen: &mut HashSet<String>,
        expanded: &mut Vec<String>,
    ) -> Result<()> {
        let mut stack = vec![(id, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            if depth > self.max_depth {
                return Err(PolicyError::RoleDepthExceeded {
                    role: id.to_string(),
                    depth: self.max_depth,
                });
            }
            if !seen.insert(id.to_string()) {
                continue;
            }
            expanded.push(id.to_string());

            if let Some(role) = self.roles.get(id) {
                stack.extend(role.inherits.iter().rev().map(|parent| (parent.as_str(), depth + 1)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(defs: &[(&str, &[&str])]) -> Vec<Arc<Role>> {
        defs.iter()
            .map(|(id, inherits)| {
                Arc::new(Role::new(*id).with_inherits(inherits.iter().copied()))
            })
            .collect()
    }

    // ========================================
    // Expansion
    // ========================================

    #[test]
    fn test_transitive_expansion() {
        let graph =
            RoleGraph::new(&roles(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]), 32).unwrap();
        assert_eq!(graph.expand("a").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(graph.expand("c").unwrap(), vec!["c"]);
    }

    #[test]
    fn test_unknown_role_expands_to_itself() {
        let graph = RoleGraph::new(&roles(&[("a", &["ghost"])]), 32).unwrap();
        assert_eq!(graph.expand("nobody").unwrap(), vec!["nobody"]);
        assert_eq!(graph.expand("a").unwrap(), vec!["a", "ghost"]);
    }

    #[test]
    fn test_diamond_expands_once() {
        let graph = RoleGraph::new(
            &roles(&[("a", &["b", "c"]), ("b", &["d"]), ("c", &["d"]), ("d", &[])]),
            32,
        )
        .unwrap();
        assert_eq!(graph.expand("a").unwrap(), vec!["a", "b", "d", "c"]);
        assert_eq!(
            graph.expand_all(&["c", "b"]).unwrap(),
            vec!["c", "d", "b"]
        );
    }

    #[test]
    fn test_depth_limit() {
        let graph =
            RoleGraph::new(&roles(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]), 1).unwrap();
        assert!(matches!(
            graph.expand("a"),
            Err(PolicyError::RoleDepthExceeded { ref role, depth: 1 }) if role == "c"
        ));
        assert_eq!(graph.expand("b").unwrap(), vec!["b", "c"]);
    }

    // ========================================
    // Cycle detection
    // ========================================

    #[test]
    fn test_cycle_is_rejected() {
        let err = RoleGraph::new(&roles(&[("a", &["b"]), ("b", &["a"])]), 32).unwrap_err();
        match err {
            PolicyError::CircularInheritance(path) => assert_eq!(path, "a -> b -> a"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_inheritance_is_a_cycle() {
        assert!(matches!(
            RoleGraph::new(&roles(&[("a", &["a"])]), 32),
            Err(PolicyError::CircularInheritance(ref path)) if path == "a -> a"
        ));
    }

    #[test]
    fn test_long_cycle_path() {
        let err = RoleGraph::new(
            &roles(&[("x", &["a"]), ("a", &["b"]), ("b", &["c"]), ("c", &["a"])]),
            32,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PolicyError::CircularInheritance(ref path) if path == "a -> b -> c -> a"
        ));
    }

    // ========================================
    // Long chains
    // ========================================

    fn chain(len: usize, closed: bool) -> Vec<Arc<Role>> {
        (0..len)
            .map(|i| {
                let role = Role::new(format!("r{i}"));
                if i + 1 < len {
                    Arc::new(role.with_inherits([format!("r{}", i + 1)]))
                } else if closed {
                    Arc::new(role.with_inherits(["r0"]))
                } else {
                    Arc::new(role)
                }
            })
            .collect()
    }

    #[test]
    fn test_long_chain_builds_and_respects_depth_limit() {
        let graph = RoleGraph::new(&chain(100_000, false), 32).unwrap();
        assert_eq!(graph.len(), 100_000);
        assert!(matches!(
            graph.expand("r0"),
            Err(PolicyError::RoleDepthExceeded { ref role, depth: 32 }) if role == "r33"
        ));
        assert_eq!(graph.expand("r99990").unwrap().len(), 10);

        let unbounded = RoleGraph::new(&chain(100_000, false), usize::MAX).unwrap();
        assert_eq!(unbounded.expand("r0").unwrap().len(), 100_000);
    }

    #[test]
    fn test_long_cycle_is_detected() {
        let err = RoleGraph::new(&chain(100_000, true), 32).unwrap_err();
        match err {
            PolicyError::CircularInheritance(path) => {
                assert!(path.starts_with("r0 -> r1 -> r2"));
                assert!(path.ends_with("r99999 -> r0"));
                assert_eq!(path.split(" -> ").count(), 100_001);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
