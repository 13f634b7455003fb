//! voltgrid-health — health gating for canary rollouts.
//!
//! ```text
//!                 ┌──────────────────┐
//!   stage targets │  HealthMonitor   │  poll every interval
//!   ─────────────▶│  observe_stage   │─────────────────────┐
//!                 └────────┬─────────┘                     │
//!                          │ window + baseline             ▼
//!                 ┌────────▼─────────┐          ┌────────────────────┐
//!                 │ EdgeRepository   │          │ gate::evaluate_*   │
//!                 │ (fleet crate)    │          │ MetricsThresholds  │
//!                 └──────────────────┘          └────────────────────┘
//! ```
//!
//! The gate is pure (sample in, violation out); the monitor owns timing.
//! Silence is failure: an edge that stops reporting during its observation
//! window fails the stage exactly like a tripped threshold.

pub mod gate;
pub mod monitor;

pub use gate::{GateCheck, HealthViolation, MetricsThresholds, evaluate_sample, evaluate_window};
pub use monitor::{DEFAULT_POLL_INTERVAL_MS, HealthMonitor, METRIC_WINDOW_MS};
