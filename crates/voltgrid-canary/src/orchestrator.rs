//! Canary deployment orchestration.
//!
//! `start_deployment` snapshots the eligible fleet, builds the stage
//! ladder, persists the initial record, and spawns a stage driver task.
//! The driver walks stages strictly sequentially: notify the cohort, fold
//! it into the cumulative set, hold the monitoring window, and either
//! advance or hand the whole deployment to the rollback executor. Each
//! deployment runs in its own task; concurrent rollouts of conflicting
//! versions are the operator's call, not a lock here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use voltgrid_fleet::{EdgeRepository, OtaPublisher, build_stages, eligible_edges, sort_by_criticality};
use voltgrid_health::HealthMonitor;
use voltgrid_state::{
    DeploymentPatch, DeploymentState, DeploymentStatus, DeploymentStore, EdgeId, StageStatus,
    UpdateVersion, epoch_ms,
};

use crate::error::{CanaryError, CanaryResult};
use crate::events::{DeploymentEvent, EventBus};
use crate::plan::RolloutPlan;
use crate::rollback::RollbackExecutor;

/// Orchestrates staged canary deployments over an edge fleet.
pub struct CanaryOrchestrator {
    store: DeploymentStore,
    repository: Arc<dyn EdgeRepository>,
    publisher: Arc<dyn OtaPublisher>,
    plan: RolloutPlan,
    events: EventBus,
    /// Active stage drivers: deployment_id → task handle.
    drivers: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
}

impl CanaryOrchestrator {
    /// Create an orchestrator. The plan is validated once here so a bad
    /// ladder fails loudly at startup instead of mid-rollout.
    pub fn new(
        store: DeploymentStore,
        repository: Arc<dyn EdgeRepository>,
        publisher: Arc<dyn OtaPublisher>,
        plan: RolloutPlan,
    ) -> CanaryResult<Self> {
        plan.validate()?;
        Ok(Self {
            store,
            repository,
            publisher,
            plan,
            events: EventBus::default(),
            drivers: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeploymentEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &DeploymentStore {
        &self.store
    }

    /// Start a staged rollout of `version`.
    ///
    /// Returns the freshly persisted record as soon as the stage driver is
    /// spawned; the rollout itself runs in the background. Use
    /// [`CanaryOrchestrator::wait_for`] to follow it to a terminal status.
    pub async fn start_deployment(&self, version: UpdateVersion) -> CanaryResult<DeploymentState> {
        validate_version(&version)?;

        let now = epoch_ms();
        let fleet = self.repository.get_all_edges().await?;
        let fleet_size = fleet.len();
        let mut eligible = eligible_edges(fleet, now, self.plan.eligibility_window_ms);
        if eligible.is_empty() {
            return Err(CanaryError::EmptyFleet);
        }
        sort_by_criticality(&mut eligible);
        let stages = build_stages(&self.plan.stages, &eligible);

        let deployment_id = format!("dep-{}", Uuid::new_v4());
        let state = DeploymentState {
            deployment_id: deployment_id.clone(),
            version: version.clone(),
            status: DeploymentStatus::InProgress,
            stages,
            updated_edge_ids: Vec::new(),
            rolled_back_edge_ids: Vec::new(),
            started_at: now,
            completed_at: None,
            failure_reason: None,
        };
        self.store.save_deployment(&state)?;

        info!(
            %deployment_id,
            version = %version.version,
            eligible = eligible.len(),
            fleet = fleet_size,
            stages = state.stages.len(),
            "deployment started"
        );
        self.events.publish(DeploymentEvent::DeploymentStarted {
            deployment_id: deployment_id.clone(),
            version: version.version.clone(),
            eligible_edges: eligible.len(),
            stages: state.stages.len(),
        });

        let driver = StageDriver {
            store: self.store.clone(),
            publisher: Arc::clone(&self.publisher),
            monitor: HealthMonitor::new(
                Arc::clone(&self.repository),
                self.plan.thresholds.clone(),
                Duration::from_millis(self.plan.poll_interval_ms),
            ),
            rollback: RollbackExecutor::new(
                self.store.clone(),
                Arc::clone(&self.publisher),
                self.events.clone(),
            ),
            events: self.events.clone(),
        };
        let snapshot = state.clone();
        let task_id = deployment_id.clone();
        let handle = tokio::spawn(async move {
            // Driver errors stop the rollout but never mark the record
            // FAILED; it stays at its last persisted state for the
            // operator to inspect.
            if let Err(err) = driver.run(state).await {
                error!(deployment_id = %task_id, error = %err, "stage driver aborted");
            }
        });
        self.drivers.write().await.insert(deployment_id, handle);

        Ok(snapshot)
    }

    /// Await the background driver of a deployment. A join, not a cancel.
    pub async fn wait_for(&self, deployment_id: &str) -> CanaryResult<()> {
        let handle = self
            .drivers
            .write()
            .await
            .remove(deployment_id)
            .ok_or_else(|| CanaryError::UnknownDeployment(deployment_id.to_string()))?;
        if handle.await.is_err() {
            error!(%deployment_id, "stage driver panicked");
        }
        Ok(())
    }

    /// Deployment ids with a driver still registered.
    pub async fn active_deployments(&self) -> Vec<String> {
        self.drivers.read().await.keys().cloned().collect()
    }
}

/// Check the version string and checksum shape before anything persists.
fn validate_version(version: &UpdateVersion) -> CanaryResult<()> {
    semver::Version::parse(&version.version)
        .map_err(|e| CanaryError::InvalidVersion(format!("{}: {e}", version.version)))?;

    let digest = version.checksum.strip_prefix("sha256:").ok_or_else(|| {
        CanaryError::InvalidVersion(format!(
            "checksum must be sha256:<hex digest>, got {:?}",
            version.checksum
        ))
    })?;
    let bytes = hex::decode(digest)
        .map_err(|e| CanaryError::InvalidVersion(format!("checksum digest: {e}")))?;
    if bytes.len() != 32 {
        return Err(CanaryError::InvalidVersion(format!(
            "checksum digest must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(())
}

/// Per-deployment background task that walks the stage ladder.
struct StageDriver {
    store: DeploymentStore,
    publisher: Arc<dyn OtaPublisher>,
    monitor: HealthMonitor,
    rollback: RollbackExecutor,
    events: EventBus,
}

impl StageDriver {
    async fn run(self, mut state: DeploymentState) -> CanaryResult<()> {
        for index in 0..state.stages.len() {
            state.stages[index].status = StageStatus::InProgress;
            self.persist_stages(&state)?;

            let targets = state.stages[index].target_edge_ids.clone();
            self.notify_targets(&state.deployment_id, &state.version, &targets)
                .await;

            // Cohorts are cumulative prefixes; union-append keeps the
            // rollback set duplicate-free across stages.
            state.record_updated(&targets);
            self.store.update_deployment(
                &state.deployment_id,
                DeploymentPatch {
                    updated_edge_ids: Some(state.updated_edge_ids.clone()),
                    ..Default::default()
                },
            )?;

            if let Err(violations) = self
                .monitor
                .observe_stage(&state.deployment_id, &state.stages[index])
                .await
            {
                let reason = format!(
                    "stage {index} health gate failed: {}",
                    violations
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; ")
                );
                state.stages[index].status = StageStatus::Failed;
                self.persist_stages(&state)?;
                self.events.publish(DeploymentEvent::StageFailed {
                    deployment_id: state.deployment_id.clone(),
                    stage_index: state.stages[index].stage_index,
                    reason: reason.clone(),
                });
                self.rollback.execute(&mut state, &reason).await?;
                return Ok(());
            }

            state.stages[index].status = StageStatus::Passed;
            self.persist_stages(&state)?;
            info!(
                deployment_id = %state.deployment_id,
                stage = index,
                targets = targets.len(),
                "stage passed"
            );
            self.events.publish(DeploymentEvent::StageCompleted {
                deployment_id: state.deployment_id.clone(),
                stage_index: state.stages[index].stage_index,
                target_edges: targets.len(),
            });
        }

        let completed_at = epoch_ms();
        self.store.update_deployment(
            &state.deployment_id,
            DeploymentPatch {
                status: Some(DeploymentStatus::Completed),
                completed_at: Some(completed_at),
                ..Default::default()
            },
        )?;
        info!(
            deployment_id = %state.deployment_id,
            edges = state.updated_edge_ids.len(),
            "deployment completed"
        );
        self.events.publish(DeploymentEvent::DeploymentCompleted {
            deployment_id: state.deployment_id.clone(),
            updated_edges: state.updated_edge_ids.len(),
        });
        Ok(())
    }

    /// Fan the update notification out to one cohort and let every send
    /// settle. Unreachable edges are logged and skipped; the spare
    /// partition makes a missed notification recoverable, an aborted
    /// rollout is not.
    async fn notify_targets(
        &self,
        deployment_id: &str,
        version: &UpdateVersion,
        targets: &[EdgeId],
    ) {
        let dispatches = targets.iter().map(|edge_id| {
            let publisher = Arc::clone(&self.publisher);
            async move {
                let sent = publisher.send_update_notification(edge_id, version).await;
                (edge_id, sent)
            }
        });

        let mut failures = 0usize;
        for (edge_id, sent) in join_all(dispatches).await {
            if let Err(err) = sent {
                warn!(%deployment_id, %edge_id, error = %err, "update notification failed");
                failures += 1;
            }
        }
        debug!(
            %deployment_id,
            targets = targets.len(),
            failures,
            "cohort notified"
        );
    }

    fn persist_stages(&self, state: &DeploymentState) -> CanaryResult<()> {
        self.store.update_deployment(
            &state.deployment_id,
            DeploymentPatch {
                stages: Some(state.stages.clone()),
                ..Default::default()
            },
        )?;
        Ok(())
    }
}
