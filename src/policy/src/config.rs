//! Engine configuration loading

use crate::error::{PolicyError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Role every caller holds in addition to its claimed roles
pub const DEFAULT_IMPLICIT_ROLE: &str = "anonymous";

/// Policy engine configuration
///
/// ```toml
/// implicit_role = "anonymous"
/// max_role_depth = 32
/// expression_cache_capacity = 1000
/// log_denials = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Role appended to every role set
    #[serde(default = "default_implicit_role")]
    pub implicit_role: String,

    /// Maximum role inheritance depth
    #[serde(default = "default_max_role_depth")]
    pub max_role_depth: usize,

    /// Number of compiled expressions kept in the evaluation cache
    #[serde(default = "default_cache_capacity")]
    pub expression_cache_capacity: usize,

    /// Log a warning when a deny statement blocks an action
    #[serde(default = "default_true")]
    pub log_denials: bool,
}

fn default_implicit_role() -> String {
    DEFAULT_IMPLICIT_ROLE.to_string()
}

fn default_max_role_depth() -> usize {
    32
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            implicit_role: default_implicit_role(),
            max_role_depth: default_max_role_depth(),
            expression_cache_capacity: default_cache_capacity(),
            log_denials: true,
        }
    }
}

impl EngineConfig {
    /// Parse TOML text; missing fields take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| PolicyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.implicit_role.trim().is_empty() {
            return Err(PolicyError::Config("implicit_role must not be empty".to_string()));
        }
        if self.max_role_depth == 0 {
            return Err(PolicyError::Config("max_role_depth must be at least 1".to_string()));
        }
        Ok(())
    }
}
