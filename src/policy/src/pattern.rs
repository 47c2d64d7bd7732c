//! Action glob and resource wildcard matching with compiled-regex caching

use dashmap::DashMap;
use regex::Regex;
use tracing::warn;
use warrant_expr::builtins::strings::wildcard_regex;

/// Default number of cached patterns per kind
pub const DEFAULT_PATTERN_CAPACITY: usize = 4096;

/// Compile an action glob: `*` becomes `(.*)`, the rest is used as-is
pub fn action_regex(glob: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", glob.replace('*', "(.*)")))
}

/// Compile a resource pattern: literal text with `*` (any run) and `?`
/// (at most one character)
pub fn resource_regex(pattern: &str) -> Result<Regex, regex::Error> {
    wildcard_regex(pattern)
}

/// Thread-safe cache of compiled action and resource patterns
///
/// Patterns that fail to compile are cached as non-matching and logged once.
#[derive(Debug)]
pub struct PatternCache {
    actions: DashMap<String, Option<Regex>>,
    resources: DashMap<String, Option<Regex>>,
    capacity: usize,
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PATTERN_CAPACITY)
    }
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            actions: DashMap::new(),
            resources: DashMap::new(),
            capacity,
        }
    }

    /// Whether `action` fully matches the glob
    pub fn matches_action(&self, glob: &str, action: &str) -> bool {
        Self::matches(&self.actions, self.capacity, glob, action, action_regex)
    }

    /// Whether `resource` fully matches the wildcard pattern
    pub fn matches_resource(&self, pattern: &str, resource: &str) -> bool {
        Self::matches(&self.resources, self.capacity, pattern, resource, resource_regex)
    }

    fn matches(
        cache: &DashMap<String, Option<Regex>>,
        capacity: usize,
        pattern: &str,
        value: &str,
        compile: fn(&str) -> Result<Regex, regex::Error>,
    ) -> bool {
        if let Some(regex) = cache.get(pattern) {
            return regex.as_ref().map_or(false, |r| r.is_match(value));
        }

        let regex = match compile(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "ignoring pattern that does not compile");
                None
            }
        };
        let matched = regex.as_ref().map_or(false, |r| r.is_match(value));

        if cache.len() >= capacity {
            cache.clear();
        }
        cache.insert(pattern.to_string(), regex);
        matched
    }

    /// Number of cached patterns (actions, resources)
    pub fn len(&self) -> (usize, usize) {
        (self.actions.len(), self.resources.len())
    }

    pub fn clear(&self) {
        self.actions.clear();
        self.resources.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_globs() {
        let cache = PatternCache::new();
        assert!(cache.matches_action("ident:*", "ident:UpdateMyAccount"));
        assert!(!cache.matches_action("ident:*", "billing:UpdateMyAccount"));
        assert!(cache.matches_action("*", "anything"));
        assert!(cache.matches_action("ident:UpdateMyAccount", "ident:UpdateMyAccount"));
        assert!(!cache.matches_action("ident:Update", "ident:UpdateMyAccount"));
        assert!(!cache.matches_action("report:List", "xreport:List"));
    }

    #[test]
    fn test_invalid_action_glob_never_matches() {
        let cache = PatternCache::new();
        assert!(!cache.matches_action("ident:(", "ident:("));
        assert!(!cache.matches_action("ident:(", "ident:("));
        assert_eq!(cache.len().0, 1);
    }

    #[test]
    fn test_resource_wildcards() {
        let cache = PatternCache::new();
        assert!(cache.matches_resource("em2m:ident:account:?234", "em2m:ident:account:1234"));
        assert!(cache.matches_resource("em2m:ident:account:?234", "em2m:ident:account:234"));
        assert!(!cache.matches_resource("em2m:ident:account:?234", "em2m:ident:account:11234"));
        assert!(cache.matches_resource("em2m:*", "em2m:ident:account:1234"));
        assert!(cache.matches_resource("a.b(c)", "a.b(c)"));
        assert!(!cache.matches_resource("a.b", "axb"));
    }

    #[test]
    fn test_capacity_bound() {
        let cache = PatternCache::with_capacity(2);
        cache.matches_resource("a", "a");
        cache.matches_resource("b", "b");
        cache.matches_resource("c", "c");
        assert_eq!(cache.len().1, 1);
    }
}
