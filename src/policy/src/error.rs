//! Error types for the policy engines

use thiserror::Error;
use warrant_expr::ExprError;

/// Policy engine errors
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Expression parsing or evaluation failed
    #[error("Expression error: {0}")]
    Expr(#[from] ExprError),

    /// A resource pattern expression did not evaluate to a string
    #[error("Resource expression '{expression}' evaluated to {found}, expected a string")]
    ExpressionType { expression: String, found: String },

    /// Role inheritance forms a cycle
    #[error("Circular role inheritance: {0}")]
    CircularInheritance(String),

    /// Role inheritance is deeper than the configured limit
    #[error("Role '{role}' exceeds the maximum inheritance depth of {depth}")]
    RoleDepthExceeded { role: String, depth: usize },

    /// Policy or role document is malformed
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for policy operations
pub type Result<T> = std::result::Result<T, PolicyError>;
