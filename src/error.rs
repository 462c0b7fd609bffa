//! Error types for draw actions and business-record conversion.

use thiserror::Error;

/// Why an action did not produce a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The input that drove the action was not acceptable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The gesture ended without producing a shape
    #[error("Draw failed: {0}")]
    DrawFailed(String),

    /// The action was disposed before it settled
    #[error("Cancelled: {reason}")]
    Cancelled {
        /// Caller-supplied or default reason
        reason: String,
    },

    /// Internal failure, such as a result requested twice
    #[error("Action failed: {0}")]
    Failed(String),
}

impl ActionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ActionError::Cancelled { .. })
    }
}

/// Errors raised while converting between shapes and business records.
#[derive(Error, Debug)]
pub enum ConversionError {
    /// No type list was registered, so colors cannot be resolved
    #[error("No type table registered; call register_type_list first")]
    MissingTypeTable,

    /// A record could not be interpreted
    #[error("Invalid record at index {index}: {message}")]
    InvalidRecord {
        /// Position of the record in the input
        index: usize,
        /// Description of the problem
        message: String,
    },

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConversionError {
    /// Create an invalid record error.
    pub fn invalid_record(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            index,
            message: message.into(),
        }
    }
}

/// Result type for conversion operations.
pub type ConversionResult<T> = Result<T, ConversionError>;
