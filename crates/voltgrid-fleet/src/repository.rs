//! Fleet inventory and metrics access.
//!
//! `EdgeRepository` is the seam to whatever system tracks the physical
//! fleet (asset database, telemetry pipeline). `FileInventory` is the
//! file-backed reference implementation: one JSON document holding edges,
//! per-edge baselines, and rolling metric windows, re-read on every call so
//! an external telemetry writer can append live samples between polls.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use voltgrid_state::{Edge, EdgeId, MetricSample};

use crate::error::{FleetError, FleetResult};

/// Fleet inventory and per-edge metrics source.
#[async_trait]
pub trait EdgeRepository: Send + Sync {
    /// Every edge known to the fleet, regardless of liveness.
    async fn get_all_edges(&self) -> FleetResult<Vec<Edge>>;

    /// Metric samples for one edge recorded at or after `since_ms`,
    /// oldest first. An edge that reported nothing yields an empty vec.
    async fn get_edge_metrics(
        &self,
        edge_id: &str,
        since_ms: u64,
    ) -> FleetResult<Vec<MetricSample>>;

    /// The pre-rollout baseline snapshot for one edge, if one was captured.
    async fn get_baseline_metrics(&self, edge_id: &str) -> FleetResult<Option<MetricSample>>;
}

/// On-disk document backing [`FileInventory`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryFile {
    pub edges: Vec<Edge>,
    /// Pre-rollout baseline per edge id.
    #[serde(default)]
    pub baselines: HashMap<EdgeId, MetricSample>,
    /// Rolling metric window per edge id.
    #[serde(default)]
    pub metrics: HashMap<EdgeId, Vec<MetricSample>>,
}

/// File-backed reference repository.
///
/// Re-reads the inventory file on every call: the health gate always sees
/// the newest samples an external process wrote. A missing file is an
/// error here, unlike the deployment store, because a rollout against a
/// fleet nobody described is an operator mistake worth surfacing.
#[derive(Debug, Clone)]
pub struct FileInventory {
    path: PathBuf,
}

impl FileInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> FleetResult<InventoryFile> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| FleetError::Io(format!("{}: {e}", self.path.display())))?;
        serde_json::from_str(&raw).map_err(|e| FleetError::Parse(e.to_string()))
    }
}

#[async_trait]
impl EdgeRepository for FileInventory {
    async fn get_all_edges(&self) -> FleetResult<Vec<Edge>> {
        Ok(self.load().await?.edges)
    }

    async fn get_edge_metrics(
        &self,
        edge_id: &str,
        since_ms: u64,
    ) -> FleetResult<Vec<MetricSample>> {
        let mut inventory = self.load().await?;
        let mut samples = inventory.metrics.remove(edge_id).unwrap_or_default();
        samples.retain(|s| s.recorded_at >= since_ms);
        samples.sort_by_key(|s| s.recorded_at);
        Ok(samples)
    }

    async fn get_baseline_metrics(&self, edge_id: &str) -> FleetResult<Option<MetricSample>> {
        let mut inventory = self.load().await?;
        Ok(inventory.baselines.remove(edge_id))
    }
}
