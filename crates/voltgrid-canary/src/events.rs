//! Deployment lifecycle events.
//!
//! The stage driver publishes onto a broadcast channel; dashboards, the
//! CLI `--follow` mode, and tests subscribe. Publishing is best-effort:
//! zero subscribers is a normal state, and a slow subscriber lags and
//! drops old events rather than blocking the rollout.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Events buffered per subscriber before the oldest is dropped.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Lifecycle notifications emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum DeploymentEvent {
    #[serde(rename = "deployment:started")]
    DeploymentStarted {
        deployment_id: String,
        version: String,
        eligible_edges: usize,
        stages: usize,
    },
    #[serde(rename = "stage:completed")]
    StageCompleted {
        deployment_id: String,
        stage_index: u32,
        target_edges: usize,
    },
    #[serde(rename = "stage:failed")]
    StageFailed {
        deployment_id: String,
        stage_index: u32,
        reason: String,
    },
    #[serde(rename = "deployment:completed")]
    DeploymentCompleted {
        deployment_id: String,
        updated_edges: usize,
    },
    #[serde(rename = "deployment:rolledback")]
    DeploymentRolledBack {
        deployment_id: String,
        restored_edges: usize,
        total_edges: usize,
    },
}

/// Broadcast bus for [`DeploymentEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DeploymentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Open a new receiver. Each subscriber gets its own cursor.
    pub fn subscribe(&self) -> broadcast::Receiver<DeploymentEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. A send with no subscribers is not an error.
    pub fn publish(&self, event: DeploymentEvent) {
        debug!(?event, "deployment event");
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
