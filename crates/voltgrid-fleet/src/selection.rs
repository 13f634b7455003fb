//! Edge selection and stage building.
//!
//! Turns the fleet inventory plus a stage plan into ordered rollout
//! cohorts: filter to recently-seen edges, stable-sort ascending by
//! criticality, then cut each stage's cohort as a prefix of that order.

use voltgrid_state::{Edge, Stage, StageSpec, StageStatus};

/// Edges seen within the freshness window. Liveness is the only signal
/// that gates selection; an unhealthy-but-talking edge still rolls out.
pub fn eligible_edges(edges: Vec<Edge>, now_ms: u64, window_ms: u64) -> Vec<Edge> {
    edges
        .into_iter()
        .filter(|e| e.is_eligible(now_ms, window_ms))
        .collect()
}

/// Stable ascending sort by criticality rank, lowest blast radius first.
/// Inventory order is preserved within a tier.
pub fn sort_by_criticality(edges: &mut [Edge]) {
    edges.sort_by_key(|e| e.criticality.rank());
}

/// Cohort size for one stage over `eligible` edges. Rounds up, so any
/// non-zero percentage targets at least one edge.
pub fn stage_target_count(percentage: u8, eligible: usize) -> usize {
    (percentage as usize * eligible).div_ceil(100)
}

/// Build the concrete stage list for a deployment.
///
/// Each stage's cohort is a prefix of `sorted_eligible`: cumulative, not a
/// delta relative to the prior stage. Later stages therefore re-include and
/// re-notify earlier cohorts; edge-side update handling is idempotent.
pub fn build_stages(specs: &[StageSpec], sorted_eligible: &[Edge]) -> Vec<Stage> {
    specs
        .iter()
        .enumerate()
        .map(|(index, spec)| {
            let count = stage_target_count(spec.percentage, sorted_eligible.len());
            Stage {
                stage_index: index as u32,
                percentage: spec.percentage,
                monitoring_duration_ms: spec.monitoring_duration_ms,
                target_edge_ids: sorted_eligible[..count]
                    .iter()
                    .map(|e| e.edge_id.clone())
                    .collect(),
                status: StageStatus::Pending,
            }
        })
        .collect()
}
