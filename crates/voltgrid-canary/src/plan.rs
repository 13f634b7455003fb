//! Rollout plan: the stage ladder, gate thresholds, and timing knobs
//! shared by every deployment an orchestrator starts.

use serde::{Deserialize, Serialize};

use voltgrid_health::{MetricsThresholds, DEFAULT_POLL_INTERVAL_MS};
use voltgrid_state::StageSpec;

use crate::error::{CanaryError, CanaryResult};

/// Edges silent for longer than this are left out of a rollout.
pub const DEFAULT_ELIGIBILITY_WINDOW_MS: u64 = 10 * 60 * 1000;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Configuration for a staged rollout.
///
/// The default ladder holds each expansion under observation for a full
/// day before widening, and pushes the remainder of the fleet without a
/// monitoring window once 50% has held for 24 hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutPlan {
    /// Cumulative stage ladder, validated by [`RolloutPlan::validate`].
    pub stages: Vec<StageSpec>,
    /// Health gate thresholds applied during every monitoring window.
    pub thresholds: MetricsThresholds,
    /// Cadence of metric polls within a monitoring window.
    pub poll_interval_ms: u64,
    /// Freshness window for edge eligibility at deployment start.
    pub eligibility_window_ms: u64,
}

impl Default for RolloutPlan {
    fn default() -> Self {
        Self {
            stages: vec![
                StageSpec {
                    percentage: 5,
                    monitoring_duration_ms: DAY_MS,
                },
                StageSpec {
                    percentage: 25,
                    monitoring_duration_ms: DAY_MS,
                },
                StageSpec {
                    percentage: 50,
                    monitoring_duration_ms: DAY_MS,
                },
                StageSpec {
                    percentage: 100,
                    monitoring_duration_ms: 0,
                },
            ],
            thresholds: MetricsThresholds::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            eligibility_window_ms: DEFAULT_ELIGIBILITY_WINDOW_MS,
        }
    }
}

impl RolloutPlan {
    /// Validate the stage ladder.
    ///
    /// Percentages must be in `1..=100`, strictly increasing, and the
    /// final stage must cover the whole eligible fleet.
    pub fn validate(&self) -> CanaryResult<()> {
        if self.stages.is_empty() {
            return Err(CanaryError::InvalidPlan("no stages configured".into()));
        }
        let mut prev: u8 = 0;
        for (i, spec) in self.stages.iter().enumerate() {
            if spec.percentage == 0 || spec.percentage > 100 {
                return Err(CanaryError::InvalidPlan(format!(
                    "stage {i}: percentage {} out of range 1..=100",
                    spec.percentage
                )));
            }
            if spec.percentage <= prev {
                return Err(CanaryError::InvalidPlan(format!(
                    "stage {i}: percentage {} does not increase past {prev}",
                    spec.percentage
                )));
            }
            prev = spec.percentage;
        }
        if prev != 100 {
            return Err(CanaryError::InvalidPlan(format!(
                "final stage must cover 100% of the fleet, got {prev}%"
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(CanaryError::InvalidPlan(
                "poll_interval_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
