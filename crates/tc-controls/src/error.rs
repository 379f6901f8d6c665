//! Error types for controller construction and tuning.

use thiserror::Error;

/// Result type for controller operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur while building or tuning a controller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Invalid constructor argument. The controller was not created.
    #[error("Invalid controller configuration: {what}")]
    Configuration { what: String },

    /// A parameter update would break an invariant. Nothing was applied.
    #[error("Invalid value for '{key}': {constraint}")]
    Validation {
        key: String,
        constraint: &'static str,
    },

    /// A parameter update named a key the controller does not have.
    #[error("Unknown parameter '{key}' (valid parameters: {})", valid.join(", "))]
    UnknownParameter { key: String, valid: Vec<String> },
}

impl ControlError {
    pub(crate) fn validation(key: impl Into<String>, constraint: &'static str) -> Self {
        Self::Validation {
            key: key.into(),
            constraint,
        }
    }
}
