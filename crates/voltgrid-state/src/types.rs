//! Domain types for the VoltGrid deployment store.
//!
//! These types represent the fleet inventory view, released update versions,
//! per-edge metric samples, canary stages, and the persisted deployment
//! audit record. All types are serializable to/from JSON for storage in the
//! deployment store file.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for an edge controller.
pub type EdgeId = String;

/// Unique identifier for a canary deployment.
pub type DeploymentId = String;

/// Current unix timestamp in milliseconds.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── Fleet ─────────────────────────────────────────────────────────

/// Inventory record for a grid-connected battery-storage edge controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub edge_id: EdgeId,
    pub site_id: String,
    pub organization_id: String,
    /// Firmware/software version currently running on the controller.
    pub current_version: String,
    /// Operator-assigned risk tier; rollouts expose lower tiers first.
    pub criticality: Criticality,
    /// Unix timestamp (milliseconds) of the last heartbeat.
    pub last_seen_at: u64,
}

impl Edge {
    /// Rollout eligibility is a pure liveness proxy: the controller must
    /// have reported within the freshness window.
    pub fn is_eligible(&self, now_ms: u64, window_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_seen_at) < window_ms
    }
}

/// Risk tier of an edge controller within the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    Low,
    Medium,
    High,
    Critical,
}

impl Criticality {
    /// Sort rank, ascending: `Low` = 0 through `Critical` = 3.
    pub fn rank(&self) -> u8 {
        match self {
            Criticality::Low => 0,
            Criticality::Medium => 1,
            Criticality::High => 2,
            Criticality::Critical => 3,
        }
    }
}

// ── Update version ────────────────────────────────────────────────

/// A released firmware/software version offered to the fleet.
///
/// Immutable once a deployment references it; the deployment record embeds
/// a full copy so audit history survives catalog changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateVersion {
    /// Semantic version string, e.g. `"1.4.2"`.
    pub version: String,
    /// Content digest in `sha256:<hex>` form; verified on the edge side.
    pub checksum: String,
    /// Optional detached signature over the update artifact.
    pub signature: Option<String>,
    pub release_notes: Option<String>,
    /// Unix timestamp (milliseconds) when the version was released.
    pub released_at: u64,
}

// ── Metrics ───────────────────────────────────────────────────────

/// Per-edge, per-poll health snapshot reported by a controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    /// Modbus register errors per minute across attached inverters/BMS.
    pub modbus_error_rate: f64,
    /// Control loop cycle latency in milliseconds.
    pub control_loop_latency_ms: f64,
    /// Safety interlock trips since the previous sample.
    pub safety_violation_count: u32,
    /// Controller uptime percentage over the reporting window.
    pub uptime_percent: f64,
    /// MQTT broker disconnects since the previous sample.
    pub mqtt_disconnects: u32,
    /// Unix timestamp (milliseconds) when the sample was recorded.
    pub recorded_at: u64,
}

// ── Canary stages ─────────────────────────────────────────────────

/// Configured percentage/monitoring pair from which a concrete [`Stage`]
/// is built at deployment start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub percentage: u8,
    pub monitoring_duration_ms: u64,
}

/// One cohort-plus-monitoring-window step of a staged rollout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    pub stage_index: u32,
    /// Cumulative share of the eligible fleet covered by this stage.
    /// Strictly increasing across stages; the final stage is 100.
    pub percentage: u8,
    /// Health-gate observation window; 0 skips monitoring entirely.
    pub monitoring_duration_ms: u64,
    /// Fixed when the stage list is built: a prefix of the
    /// criticality-sorted eligible fleet, so later cohorts re-include
    /// earlier ones.
    pub target_edge_ids: Vec<EdgeId>,
    pub status: StageStatus,
}

/// Lifecycle status of a single canary stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    InProgress,
    Passed,
    Failed,
}

// ── Deployment record ─────────────────────────────────────────────

/// Lifecycle status of a canary deployment.
///
/// The stage driver only ever moves `InProgress → Completed` or
/// `InProgress → RolledBack`. `Paused` and `Failed` exist in the record
/// format for external writers and are never set by the driver itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Created,
    InProgress,
    Completed,
    Paused,
    RolledBack,
    Failed,
}

/// Persisted audit record for one canary deployment.
///
/// Created once by the orchestrator, mutated only by the stage driver and
/// rollback executor, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentState {
    pub deployment_id: DeploymentId,
    /// Full copy of the version under rollout.
    pub version: UpdateVersion,
    pub status: DeploymentStatus,
    /// Fixed length at creation; one entry per configured stage.
    pub stages: Vec<Stage>,
    /// Every edge that has been sent an update notification, in first-notify
    /// order, duplicate-free.
    pub updated_edge_ids: Vec<EdgeId>,
    /// Edges confirmed reverted by a rollback; always a subset of
    /// `updated_edge_ids`.
    pub rolled_back_edge_ids: Vec<EdgeId>,
    /// Unix timestamp (milliseconds) when the deployment started.
    pub started_at: u64,
    pub completed_at: Option<u64>,
    pub failure_reason: Option<String>,
}

impl DeploymentState {
    /// Union-append edge ids, preserving first-notify order. Stage cohorts
    /// are cumulative prefixes, so re-notified edges must not duplicate.
    pub fn record_updated(&mut self, ids: &[EdgeId]) {
        for id in ids {
            if !self.updated_edge_ids.contains(id) {
                self.updated_edge_ids.push(id.clone());
            }
        }
    }
}

/// Partial form of the mutable `DeploymentState` fields.
///
/// `None` fields are left untouched by a merge, so callers can persist a
/// single changed field without re-sending the whole record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentPatch {
    pub status: Option<DeploymentStatus>,
    pub stages: Option<Vec<Stage>>,
    pub updated_edge_ids: Option<Vec<EdgeId>>,
    pub rolled_back_edge_ids: Option<Vec<EdgeId>>,
    pub completed_at: Option<u64>,
    pub failure_reason: Option<String>,
}

impl DeploymentPatch {
    /// Merge this patch into an existing record.
    pub fn apply(self, state: &mut DeploymentState) {
        if let Some(status) = self.status {
            state.status = status;
        }
        if let Some(stages) = self.stages {
            state.stages = stages;
        }
        if let Some(updated) = self.updated_edge_ids {
            state.updated_edge_ids = updated;
        }
        if let Some(rolled_back) = self.rolled_back_edge_ids {
            state.rolled_back_edge_ids = rolled_back;
        }
        if let Some(completed_at) = self.completed_at {
            state.completed_at = Some(completed_at);
        }
        if let Some(reason) = self.failure_reason {
            state.failure_reason = Some(reason);
        }
    }
}
