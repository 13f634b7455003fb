//! OTA command publishing.
//!
//! `OtaPublisher` is the transport seam for update notifications and
//! rollback commands; the concrete transport (MQTT broker, message queue)
//! lives behind it. `DryRunPublisher` logs every command and succeeds,
//! for rehearsals and local runs against a file inventory.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use voltgrid_state::UpdateVersion;

use crate::error::FleetResult;

/// Rollback target understood by every controller: the image kept in the
/// spare partition before the update was applied.
pub const PREVIOUS_VERSION: &str = "previous";

/// Delivers rollout commands to individual edges.
#[async_trait]
pub trait OtaPublisher: Send + Sync {
    /// Offer `version` to one edge. The controller downloads, verifies and
    /// applies it on its own schedule; success here only means the command
    /// was accepted for transport. Must be idempotent edge-side: staged
    /// cohorts are cumulative, so edges get re-notified.
    async fn send_update_notification(
        &self,
        edge_id: &str,
        version: &UpdateVersion,
    ) -> FleetResult<()>;

    /// Command one edge to revert to `target_version`, usually
    /// [`PREVIOUS_VERSION`].
    async fn send_rollback_command(&self, edge_id: &str, target_version: &str)
    -> FleetResult<()>;
}

/// Publisher that logs commands without touching any transport.
#[derive(Debug, Default)]
pub struct DryRunPublisher {
    notifications: AtomicU64,
    rollbacks: AtomicU64,
}

impl DryRunPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications_sent(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    pub fn rollbacks_sent(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OtaPublisher for DryRunPublisher {
    async fn send_update_notification(
        &self,
        edge_id: &str,
        version: &UpdateVersion,
    ) -> FleetResult<()> {
        self.notifications.fetch_add(1, Ordering::Relaxed);
        info!(%edge_id, version = %version.version, "dry-run: update notification");
        Ok(())
    }

    async fn send_rollback_command(
        &self,
        edge_id: &str,
        target_version: &str,
    ) -> FleetResult<()> {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        info!(%edge_id, %target_version, "dry-run: rollback command");
        Ok(())
    }
}
