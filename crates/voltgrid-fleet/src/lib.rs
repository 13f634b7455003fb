//! voltgrid-fleet — fleet access seams and rollout cohort building.
//!
//! # Components
//!
//! - **`repository`** — `EdgeRepository` trait (inventory + metrics source)
//!   and the file-backed `FileInventory` reference implementation
//! - **`publisher`** — `OtaPublisher` trait (notify/rollback transport) and
//!   the logging `DryRunPublisher`
//! - **`selection`** — eligibility filtering, stable criticality ordering,
//!   and cumulative-prefix stage building
//!
//! The traits are object-safe and `Send + Sync`; the orchestrator holds
//! them as `Arc<dyn …>` so tests can swap in programmable fakes.

pub mod error;
pub mod publisher;
pub mod repository;
pub mod selection;

pub use error::{FleetError, FleetResult};
pub use publisher::{DryRunPublisher, OtaPublisher, PREVIOUS_VERSION};
pub use repository::{EdgeRepository, FileInventory, InventoryFile};
pub use selection::{build_stages, eligible_edges, sort_by_criticality, stage_target_count};
