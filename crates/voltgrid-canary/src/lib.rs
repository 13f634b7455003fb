//! voltgrid-canary — staged rollout orchestration.
//!
//! This crate owns the deployment lifecycle: it turns an [`UpdateVersion`]
//! plus a [`RolloutPlan`] into a persisted, stage-by-stage rollout across
//! the eligible fleet, gated on live health metrics and rolled back as a
//! unit when a gate trips.
//!
//! # Components
//!
//! - **`plan`** — Stage ladder, thresholds, and timing configuration
//! - **`orchestrator`** — `start_deployment` and the per-deployment stage driver
//! - **`rollback`** — One-shot concurrent rollback of the cumulative cohort
//! - **`events`** — Broadcast bus for lifecycle events
//!
//! [`UpdateVersion`]: voltgrid_state::UpdateVersion

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod plan;
pub mod rollback;

pub use error::{CanaryError, CanaryResult};
pub use events::{DEFAULT_EVENT_CAPACITY, DeploymentEvent, EventBus};
pub use orchestrator::CanaryOrchestrator;
pub use plan::{DEFAULT_ELIGIBILITY_WINDOW_MS, RolloutPlan};
pub use rollback::{RollbackExecutor, RollbackOutcome};
