//! Error types for expression parsing and evaluation

use thiserror::Error;

/// Expression engine errors
///
/// Most variants signal a broken expression or policy definition rather than
/// bad request input; callers are expected to surface them, not swallow them.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExprError {
    /// No key handler is registered for the key
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Key text could not be parsed
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// No pipe transform is registered under the name
    #[error("Unknown pipe: {0}")]
    PipeNotFound(String),

    /// Pipe segment is malformed (e.g. empty pipe name)
    #[error("Invalid pipe expression: '{0}'")]
    InvalidPipe(String),

    /// Pipe arguments were rejected by the transform
    #[error("Invalid arguments for pipe '{pipe}': {reason}")]
    InvalidPipeArgs { pipe: String, reason: String },

    /// No condition handler is registered for the operator
    #[error("Unknown condition operator: {0}")]
    ConditionNotFound(String),

    /// Condition document is malformed
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    /// No exec handler is registered for the operator
    #[error("Unknown exec operator: {0}")]
    ExecNotFound(String),

    /// Exec handler failed
    #[error("Exec '{op}' failed: {reason}")]
    ExecFailed { op: String, reason: String },

    /// Expression produced a value of an unexpected type
    #[error("Expression type error: expected {expected}, found {found}")]
    TypeError { expected: String, found: String },

    /// Internal invariant violated
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for expression operations
pub type Result<T> = std::result::Result<T, ExprError>;
