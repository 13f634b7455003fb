//! Rollback execution for a failed deployment.
//!
//! Every edge that has ever been notified during the deployment is
//! commanded back to its previous firmware in one concurrent batch. The
//! batch runs exactly once: an edge whose rollback command fails stays on
//! the new version and is surfaced for operator follow-up instead of being
//! retried.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, warn};

use voltgrid_fleet::{OtaPublisher, PREVIOUS_VERSION};
use voltgrid_state::{
    DeploymentPatch, DeploymentState, DeploymentStatus, DeploymentStore, EdgeId,
};

use crate::error::CanaryResult;
use crate::events::{DeploymentEvent, EventBus};

/// Result of one rollback batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackOutcome {
    /// Edges whose rollback command was accepted for transport.
    pub restored: Vec<EdgeId>,
    /// Edges left stranded on the new version.
    pub stranded: Vec<EdgeId>,
}

impl RollbackOutcome {
    pub fn total(&self) -> usize {
        self.restored.len() + self.stranded.len()
    }

    pub fn is_complete(&self) -> bool {
        self.stranded.is_empty()
    }
}

/// Reverts a failed deployment's cumulative cohort.
pub struct RollbackExecutor {
    store: DeploymentStore,
    publisher: Arc<dyn OtaPublisher>,
    events: EventBus,
}

impl RollbackExecutor {
    pub fn new(store: DeploymentStore, publisher: Arc<dyn OtaPublisher>, events: EventBus) -> Self {
        Self {
            store,
            publisher,
            events,
        }
    }

    /// Roll back every updated edge of `state`.
    ///
    /// The record is marked `RolledBack` and persisted before the first
    /// command goes out, so a crash mid-batch still leaves the terminal
    /// status on disk. Per-edge command failures are absorbed; the final
    /// `failure_reason` carries the restored/total count either way.
    pub async fn execute(
        &self,
        state: &mut DeploymentState,
        gate_reason: &str,
    ) -> CanaryResult<RollbackOutcome> {
        let targets = state.updated_edge_ids.clone();
        info!(
            deployment_id = %state.deployment_id,
            edges = targets.len(),
            reason = %gate_reason,
            "rolling back deployment"
        );

        state.status = DeploymentStatus::RolledBack;
        state.failure_reason = Some(gate_reason.to_string());
        self.store.update_deployment(
            &state.deployment_id,
            DeploymentPatch {
                status: Some(DeploymentStatus::RolledBack),
                failure_reason: Some(gate_reason.to_string()),
                ..Default::default()
            },
        )?;

        let dispatches = targets.iter().map(|edge_id| {
            let publisher = Arc::clone(&self.publisher);
            async move {
                let sent = publisher
                    .send_rollback_command(edge_id, PREVIOUS_VERSION)
                    .await;
                (edge_id.clone(), sent)
            }
        });

        let mut outcome = RollbackOutcome {
            restored: Vec::new(),
            stranded: Vec::new(),
        };
        for (edge_id, sent) in join_all(dispatches).await {
            match sent {
                Ok(()) => outcome.restored.push(edge_id),
                Err(err) => {
                    warn!(deployment_id = %state.deployment_id, %edge_id, error = %err,
                          "rollback command failed, edge stranded on new version");
                    outcome.stranded.push(edge_id);
                }
            }
        }

        let reason = format!(
            "{gate_reason}; rollback restored {}/{} edges",
            outcome.restored.len(),
            outcome.total()
        );
        if !outcome.is_complete() {
            error!(
                deployment_id = %state.deployment_id,
                restored = outcome.restored.len(),
                total = outcome.total(),
                stranded = ?outcome.stranded,
                "partial rollback, stranded edges need manual intervention"
            );
        }

        state.rolled_back_edge_ids = outcome.restored.clone();
        state.failure_reason = Some(reason.clone());
        self.store.update_deployment(
            &state.deployment_id,
            DeploymentPatch {
                rolled_back_edge_ids: Some(outcome.restored.clone()),
                failure_reason: Some(reason),
                ..Default::default()
            },
        )?;

        self.events.publish(DeploymentEvent::DeploymentRolledBack {
            deployment_id: state.deployment_id.clone(),
            restored_edges: outcome.restored.len(),
            total_edges: outcome.total(),
        });

        Ok(outcome)
    }
}
