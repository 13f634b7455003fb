//! Canary orchestrator error types.

use thiserror::Error;

/// Errors that can occur while starting or driving a rollout.
#[derive(Debug, Error)]
pub enum CanaryError {
    #[error("invalid rollout plan: {0}")]
    InvalidPlan(String),

    #[error("invalid update version: {0}")]
    InvalidVersion(String),

    #[error("no eligible edges to deploy to")]
    EmptyFleet,

    #[error("unknown deployment: {0}")]
    UnknownDeployment(String),

    #[error("state store error: {0}")]
    State(#[from] voltgrid_state::StateError),

    #[error("fleet error: {0}")]
    Fleet(#[from] voltgrid_fleet::FleetError),
}

pub type CanaryResult<T> = Result<T, CanaryError>;
