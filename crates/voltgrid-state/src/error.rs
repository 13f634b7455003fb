//! Error types for the VoltGrid deployment store.

use thiserror::Error;

/// Result type alias for deployment store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during deployment store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("store file error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("deployment already exists: {0}")]
    Duplicate(String),

    #[error("deployment not found: {0}")]
    NotFound(String),
}
