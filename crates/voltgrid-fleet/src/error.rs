//! Error types for fleet access and OTA publishing.

use thiserror::Error;

/// Result type alias for fleet operations.
pub type FleetResult<T> = Result<T, FleetError>;

/// Errors surfaced by edge repositories and OTA publishers.
///
/// `Unreachable` and `PublishFailed` are the transport-side vocabulary:
/// concrete publishers construct them, the rollout driver only ever logs
/// them per edge.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("inventory file error: {0}")]
    Io(String),

    #[error("inventory parse error: {0}")]
    Parse(String),

    #[error("unknown edge: {0}")]
    UnknownEdge(String),

    #[error("edge unreachable: {0}")]
    Unreachable(String),

    #[error("publish failed: {0}")]
    PublishFailed(String),
}
