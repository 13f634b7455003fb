//! voltgrid-state — deployment audit store for VoltGrid.
//!
//! Persists canary deployment records as one JSON object keyed by
//! deployment id at a configurable path. Records are permanent audit
//! history: created once, merge-updated by the rollout driver, never
//! deleted. A missing file is empty state, and every mutation replaces the
//! file atomically so external readers never see partial writes.
//!
//! The `DeploymentStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Mutex<…>>`) and can be shared across async tasks; an in-memory
//! backing exists for tests.

pub mod error;
pub mod store;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::DeploymentStore;
pub use types::*;
