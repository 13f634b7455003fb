//! Stage monitoring loop.
//!
//! Polls every target edge over a stage's observation window, pulling the
//! last-five-minutes metric window and the pre-rollout baseline from the
//! repository and running both through the gate. Returns on the first
//! failing poll; a stage passes only when the full window elapses with
//! zero violations.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use voltgrid_fleet::EdgeRepository;
use voltgrid_state::{EdgeId, Stage, epoch_ms};

use crate::gate::{GateCheck, HealthViolation, MetricsThresholds, evaluate_window};

/// Width of the metric window inspected at each poll.
pub const METRIC_WINDOW_MS: u64 = 5 * 60 * 1000;

/// Default cadence between polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5 * 60 * 1000;

/// Polls stage targets against the health gate.
pub struct HealthMonitor {
    repository: Arc<dyn EdgeRepository>,
    thresholds: MetricsThresholds,
    poll_interval: Duration,
}

impl HealthMonitor {
    pub fn new(
        repository: Arc<dyn EdgeRepository>,
        thresholds: MetricsThresholds,
        poll_interval: Duration,
    ) -> Self {
        Self {
            repository,
            thresholds,
            poll_interval,
        }
    }

    /// Observe one stage for its full monitoring window.
    ///
    /// Sleeps are clamped to the remaining window, so a window shorter than
    /// the poll interval is still evaluated exactly once. A zero window
    /// returns immediately without polling (the final 100% stage).
    pub async fn observe_stage(
        &self,
        deployment_id: &str,
        stage: &Stage,
    ) -> Result<(), Vec<HealthViolation>> {
        let duration = Duration::from_millis(stage.monitoring_duration_ms);
        if duration.is_zero() {
            debug!(
                %deployment_id,
                stage_index = stage.stage_index,
                "zero monitoring window, skipping observation"
            );
            return Ok(());
        }

        debug!(
            %deployment_id,
            stage_index = stage.stage_index,
            targets = stage.target_edge_ids.len(),
            window_ms = stage.monitoring_duration_ms,
            "stage observation started"
        );

        let started = tokio::time::Instant::now();
        loop {
            let elapsed = started.elapsed();
            if elapsed >= duration {
                debug!(
                    %deployment_id,
                    stage_index = stage.stage_index,
                    "stage observation window elapsed clean"
                );
                return Ok(());
            }

            tokio::time::sleep(self.poll_interval.min(duration - elapsed)).await;

            let violations = self.poll_targets(&stage.target_edge_ids).await;
            if !violations.is_empty() {
                warn!(
                    %deployment_id,
                    stage_index = stage.stage_index,
                    violations = violations.len(),
                    first = %violations[0],
                    "health gate failed"
                );
                return Err(violations);
            }
        }
    }

    /// Check every target once. Collects at most one violation per edge; a
    /// repository error counts against the edge, because a gate that cannot
    /// see the fleet cannot vouch for it.
    pub async fn poll_targets(&self, targets: &[EdgeId]) -> Vec<HealthViolation> {
        let since_ms = epoch_ms().saturating_sub(METRIC_WINDOW_MS);
        let mut violations = Vec::new();

        for edge_id in targets {
            match self.check_edge(edge_id, since_ms).await {
                Ok(None) => {}
                Ok(Some(violation)) => violations.push(violation),
                Err(error) => {
                    warn!(%edge_id, %error, "metrics fetch failed during stage observation");
                    violations.push(HealthViolation::new(
                        edge_id,
                        GateCheck::MetricsUnavailable {
                            error: error.to_string(),
                        },
                    ));
                }
            }
        }
        violations
    }

    async fn check_edge(
        &self,
        edge_id: &str,
        since_ms: u64,
    ) -> Result<Option<HealthViolation>, voltgrid_fleet::FleetError> {
        let window = self.repository.get_edge_metrics(edge_id, since_ms).await?;
        let baseline = self.repository.get_baseline_metrics(edge_id).await?;
        Ok(evaluate_window(
            edge_id,
            &window,
            baseline.as_ref(),
            &self.thresholds,
        ))
    }
}
