//! Health-gate evaluation for canary stages.
//!
//! A violation is a typed record naming the edge, the failed check, and the
//! observed-versus-limit values, so operators can read the failure straight
//! out of the deployment record. Absolute checks (safety trips, uptime,
//! broker disconnects) run on every sample; the regression checks compare
//! against the edge's pre-rollout baseline and are skipped when no baseline
//! was captured.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use voltgrid_state::MetricSample;

/// Deployment-wide health limits, overridable per deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsThresholds {
    /// Max allowed modbus error-rate increase over baseline, errors/min.
    pub max_error_rate_increase: f64,
    /// Max allowed control-loop latency increase over baseline, ms.
    pub max_latency_increase_ms: f64,
    /// Ceiling on safety interlock trips. Zero tolerance by default.
    pub max_safety_violations: u32,
    /// Uptime floor, percent.
    pub min_uptime_percent: f64,
    /// Ceiling on MQTT broker disconnects.
    pub max_mqtt_disconnects: u32,
}

impl Default for MetricsThresholds {
    fn default() -> Self {
        Self {
            max_error_rate_increase: 2.0,
            max_latency_increase_ms: 50.0,
            max_safety_violations: 0,
            min_uptime_percent: 99.9,
            max_mqtt_disconnects: 0,
        }
    }
}

/// The individual checks a sample window can fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum GateCheck {
    /// The edge reported nothing inside the poll window. Silence is
    /// failure, not success.
    #[error("no metrics reported in the last poll window")]
    MetricSilence,

    /// The repository itself failed; the gate cannot vouch for the edge.
    #[error("metrics unavailable: {error}")]
    MetricsUnavailable { error: String },

    #[error("{observed} safety violation(s), limit {limit}")]
    SafetyViolations { observed: u32, limit: u32 },

    #[error("uptime {observed:.2}% below floor {floor:.2}%")]
    UptimeBelowFloor { observed: f64, floor: f64 },

    #[error("{observed} mqtt disconnect(s), limit {limit}")]
    MqttDisconnects { observed: u32, limit: u32 },

    #[error(
        "modbus error rate rose {increase:.1}/min over baseline {baseline:.1}/min, limit {limit:.1}/min"
    )]
    ErrorRateRegression {
        baseline: f64,
        observed: f64,
        increase: f64,
        limit: f64,
    },

    #[error(
        "control loop latency rose {increase_ms:.1}ms over baseline {baseline_ms:.1}ms, limit {limit_ms:.1}ms"
    )]
    LatencyRegression {
        baseline_ms: f64,
        observed_ms: f64,
        increase_ms: f64,
        limit_ms: f64,
    },
}

/// One failed health check for one edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("edge {edge_id}: {check}")]
pub struct HealthViolation {
    pub edge_id: String,
    pub check: GateCheck,
}

impl HealthViolation {
    pub fn new(edge_id: &str, check: GateCheck) -> Self {
        Self {
            edge_id: edge_id.to_string(),
            check,
        }
    }
}

/// Evaluate one sample. Check order mirrors severity: safety trips first,
/// then availability, then baseline regressions.
pub fn evaluate_sample(
    edge_id: &str,
    sample: &MetricSample,
    baseline: Option<&MetricSample>,
    thresholds: &MetricsThresholds,
) -> Option<HealthViolation> {
    if sample.safety_violation_count > thresholds.max_safety_violations {
        return Some(HealthViolation::new(
            edge_id,
            GateCheck::SafetyViolations {
                observed: sample.safety_violation_count,
                limit: thresholds.max_safety_violations,
            },
        ));
    }

    if sample.uptime_percent < thresholds.min_uptime_percent {
        return Some(HealthViolation::new(
            edge_id,
            GateCheck::UptimeBelowFloor {
                observed: sample.uptime_percent,
                floor: thresholds.min_uptime_percent,
            },
        ));
    }

    if sample.mqtt_disconnects > thresholds.max_mqtt_disconnects {
        return Some(HealthViolation::new(
            edge_id,
            GateCheck::MqttDisconnects {
                observed: sample.mqtt_disconnects,
                limit: thresholds.max_mqtt_disconnects,
            },
        ));
    }

    if let Some(baseline) = baseline {
        let increase = sample.modbus_error_rate - baseline.modbus_error_rate;
        if increase > thresholds.max_error_rate_increase {
            return Some(HealthViolation::new(
                edge_id,
                GateCheck::ErrorRateRegression {
                    baseline: baseline.modbus_error_rate,
                    observed: sample.modbus_error_rate,
                    increase,
                    limit: thresholds.max_error_rate_increase,
                },
            ));
        }

        let increase_ms = sample.control_loop_latency_ms - baseline.control_loop_latency_ms;
        if increase_ms > thresholds.max_latency_increase_ms {
            return Some(HealthViolation::new(
                edge_id,
                GateCheck::LatencyRegression {
                    baseline_ms: baseline.control_loop_latency_ms,
                    observed_ms: sample.control_loop_latency_ms,
                    increase_ms,
                    limit_ms: thresholds.max_latency_increase_ms,
                },
            ));
        }
    }

    None
}

/// Evaluate an edge's poll window. Every sample is checked, oldest first,
/// so a later calm sample never masks an earlier trip. An empty window is
/// itself a violation.
pub fn evaluate_window(
    edge_id: &str,
    samples: &[MetricSample],
    baseline: Option<&MetricSample>,
    thresholds: &MetricsThresholds,
) -> Option<HealthViolation> {
    if samples.is_empty() {
        return Some(HealthViolation::new(edge_id, GateCheck::MetricSilence));
    }
    samples
        .iter()
        .find_map(|sample| evaluate_sample(edge_id, sample, baseline, thresholds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nominal_sample() -> MetricSample {
        MetricSample {
            modbus_error_rate: 0.5,
            control_loop_latency_ms: 20.0,
            safety_violation_count: 0,
            uptime_percent: 99.99,
            mqtt_disconnects: 0,
            recorded_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn defaults_match_commissioning_limits() {
        let t = MetricsThresholds::default();
        assert_eq!(t.max_error_rate_increase, 2.0);
        assert_eq!(t.max_latency_increase_ms, 50.0);
        assert_eq!(t.max_safety_violations, 0);
        assert_eq!(t.min_uptime_percent, 99.9);
        assert_eq!(t.max_mqtt_disconnects, 0);
    }

    #[test]
    fn partial_config_fills_remaining_defaults() {
        let t: MetricsThresholds =
            serde_json::from_str(r#"{"max_error_rate_increase": 5.0}"#).unwrap();
        assert_eq!(t.max_error_rate_increase, 5.0);
        assert_eq!(t.min_uptime_percent, 99.9);
        assert_eq!(t.max_safety_violations, 0);
    }

    #[test]
    fn nominal_sample_passes_with_and_without_baseline() {
        let thresholds = MetricsThresholds::default();
        let sample = nominal_sample();
        let baseline = nominal_sample();

        assert!(evaluate_sample("edge-a", &sample, None, &thresholds).is_none());
        assert!(evaluate_sample("edge-a", &sample, Some(&baseline), &thresholds).is_none());
    }

    #[test]
    fn one_safety_violation_trips_the_gate_without_baseline() {
        let thresholds = MetricsThresholds::default();
        let sample = MetricSample {
            safety_violation_count: 1,
            ..nominal_sample()
        };

        let violation = evaluate_sample("edge-a", &sample, None, &thresholds).unwrap();
        assert_eq!(
            violation.check,
            GateCheck::SafetyViolations {
                observed: 1,
                limit: 0
            }
        );
    }

    #[test]
    fn uptime_below_floor_fails_and_floor_itself_passes() {
        let thresholds = MetricsThresholds::default();

        let on_floor = MetricSample {
            uptime_percent: 99.9,
            ..nominal_sample()
        };
        assert!(evaluate_sample("edge-a", &on_floor, None, &thresholds).is_none());

        let below = MetricSample {
            uptime_percent: 99.8,
            ..nominal_sample()
        };
        let violation = evaluate_sample("edge-a", &below, None, &thresholds).unwrap();
        assert!(matches!(
            violation.check,
            GateCheck::UptimeBelowFloor { observed, .. } if observed == 99.8
        ));
    }

    #[test]
    fn one_disconnect_trips_the_default_gate() {
        let thresholds = MetricsThresholds::default();
        let sample = MetricSample {
            mqtt_disconnects: 1,
            ..nominal_sample()
        };

        let violation = evaluate_sample("edge-a", &sample, None, &thresholds).unwrap();
        assert_eq!(
            violation.check,
            GateCheck::MqttDisconnects {
                observed: 1,
                limit: 0
            }
        );
    }

    #[test]
    fn error_rate_regression_reports_the_observed_increase() {
        // Baseline 1/min, threshold 2/min, observed 4/min: increase of 3.
        let thresholds = MetricsThresholds::default();
        let baseline = MetricSample {
            modbus_error_rate: 1.0,
            ..nominal_sample()
        };
        let sample = MetricSample {
            modbus_error_rate: 4.0,
            ..nominal_sample()
        };

        let violation =
            evaluate_sample("edge-07", &sample, Some(&baseline), &thresholds).unwrap();
        assert_eq!(violation.edge_id, "edge-07");
        assert_eq!(
            violation.check,
            GateCheck::ErrorRateRegression {
                baseline: 1.0,
                observed: 4.0,
                increase: 3.0,
                limit: 2.0,
            }
        );
        let rendered = violation.to_string();
        assert!(rendered.contains("edge-07"));
        assert!(rendered.contains("3.0/min"));
    }

    #[test]
    fn rate_increase_at_exactly_the_limit_passes() {
        let thresholds = MetricsThresholds::default();
        let baseline = MetricSample {
            modbus_error_rate: 1.0,
            ..nominal_sample()
        };
        let sample = MetricSample {
            modbus_error_rate: 3.0,
            ..nominal_sample()
        };

        assert!(evaluate_sample("edge-a", &sample, Some(&baseline), &thresholds).is_none());
    }

    #[test]
    fn latency_regression_past_the_limit_fails() {
        let thresholds = MetricsThresholds::default();
        let baseline = MetricSample {
            control_loop_latency_ms: 20.0,
            ..nominal_sample()
        };
        let sample = MetricSample {
            control_loop_latency_ms: 75.0,
            ..nominal_sample()
        };

        let violation =
            evaluate_sample("edge-a", &sample, Some(&baseline), &thresholds).unwrap();
        assert!(matches!(
            violation.check,
            GateCheck::LatencyRegression { increase_ms, .. } if increase_ms == 55.0
        ));
    }

    #[test]
    fn missing_baseline_skips_regression_checks() {
        let thresholds = MetricsThresholds::default();
        // Absurd rate and latency, but absolute checks are all nominal.
        let sample = MetricSample {
            modbus_error_rate: 100.0,
            control_loop_latency_ms: 900.0,
            ..nominal_sample()
        };

        assert!(evaluate_sample("edge-a", &sample, None, &thresholds).is_none());
    }

    #[test]
    fn empty_window_is_silence() {
        let thresholds = MetricsThresholds::default();
        let violation = evaluate_window("edge-a", &[], None, &thresholds).unwrap();
        assert_eq!(violation.check, GateCheck::MetricSilence);
    }

    #[test]
    fn any_bad_sample_in_the_window_trips_the_gate() {
        let thresholds = MetricsThresholds::default();
        let tripped = MetricSample {
            safety_violation_count: 1,
            ..nominal_sample()
        };
        // The later calm sample does not mask the trip.
        let window = vec![nominal_sample(), tripped, nominal_sample()];

        let violation = evaluate_window("edge-a", &window, None, &thresholds).unwrap();
        assert!(matches!(
            violation.check,
            GateCheck::SafetyViolations { observed: 1, .. }
        ));
    }
}
