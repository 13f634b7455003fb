//! DeploymentStore — file-backed deployment audit records for VoltGrid.
//!
//! All deployments live in a single JSON object keyed by deployment id.
//! Every mutation rewrites the file through a temp-file-plus-rename swap so
//! an external reader never observes a partial write. A missing file is
//! empty state, never an error. An in-memory backing serves tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::types::{DeploymentPatch, DeploymentState};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

#[derive(Debug)]
struct StoreInner {
    /// BTreeMap keeps the on-disk object deterministically ordered.
    records: BTreeMap<String, DeploymentState>,
    /// `None` for the in-memory backing.
    path: Option<PathBuf>,
}

/// Thread-safe deployment store shared across async tasks.
///
/// Writes are serialized through one mutex; each deployment is driven by a
/// single sequential task, so contention only occurs between independent
/// deployments.
#[derive(Clone, Debug)]
pub struct DeploymentStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl DeploymentStore {
    /// Open (or create) a persistent store at the given path.
    ///
    /// A missing file yields an empty store; a present file must parse as
    /// the JSON object written by a previous run.
    pub fn open(path: &Path) -> StateResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(map_err!(Io))?;
        }
        let records = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(map_err!(Deserialize))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StateError::Io(e.to_string())),
        };
        debug!(?path, deployments = records.len(), "deployment store opened");
        Ok(Self {
            inner: Arc::new(Mutex::new(StoreInner {
                records,
                path: Some(path.to_path_buf()),
            })),
        })
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                records: BTreeMap::new(),
                path: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A panic while holding the lock cannot leave a half-applied record:
        // every mutation replaces whole values. Recover the guard.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a new deployment record. Rejects duplicate ids: records are
    /// append-only audit history and are never overwritten wholesale.
    pub fn save_deployment(&self, state: &DeploymentState) -> StateResult<()> {
        let mut inner = self.lock();
        if inner.records.contains_key(&state.deployment_id) {
            return Err(StateError::Duplicate(state.deployment_id.clone()));
        }
        inner
            .records
            .insert(state.deployment_id.clone(), state.clone());
        flush(&inner)?;
        debug!(deployment_id = %state.deployment_id, "deployment stored");
        Ok(())
    }

    /// Merge a partial update into an existing record and persist the
    /// result. Fields absent from the patch keep their stored values.
    pub fn update_deployment(
        &self,
        deployment_id: &str,
        patch: DeploymentPatch,
    ) -> StateResult<DeploymentState> {
        let mut inner = self.lock();
        let record = inner
            .records
            .get_mut(deployment_id)
            .ok_or_else(|| StateError::NotFound(deployment_id.to_string()))?;
        patch.apply(record);
        let updated = record.clone();
        flush(&inner)?;
        debug!(%deployment_id, status = ?updated.status, "deployment updated");
        Ok(updated)
    }

    /// Get a deployment by id.
    pub fn get_deployment(&self, deployment_id: &str) -> Option<DeploymentState> {
        self.lock().records.get(deployment_id).cloned()
    }

    /// The most recently started deployment, if any.
    pub fn get_latest_deployment(&self) -> Option<DeploymentState> {
        self.lock()
            .records
            .values()
            .max_by_key(|s| s.started_at)
            .cloned()
    }

    /// All deployments ordered by start time, oldest first.
    pub fn list_deployments(&self) -> Vec<DeploymentState> {
        let mut all: Vec<DeploymentState> = self.lock().records.values().cloned().collect();
        all.sort_by_key(|s| s.started_at);
        all
    }
}

/// Rewrite the backing file atomically. A no-op for in-memory stores.
fn flush(inner: &StoreInner) -> StateResult<()> {
    let Some(path) = &inner.path else {
        return Ok(());
    };
    let json = serde_json::to_string_pretty(&inner.records).map_err(map_err!(Serialize))?;
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    std::fs::write(&tmp, json).map_err(map_err!(Io))?;
    std::fs::rename(&tmp, path).map_err(map_err!(Io))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        DeploymentStatus, Stage, StageStatus, UpdateVersion,
    };

    fn test_version(version: &str) -> UpdateVersion {
        UpdateVersion {
            version: version.to_string(),
            checksum: format!("sha256:{}", "cd".repeat(32)),
            signature: None,
            release_notes: Some("quarterly firmware refresh".to_string()),
            released_at: 1_700_000_000_000,
        }
    }

    fn test_state(id: &str, started_at: u64) -> DeploymentState {
        DeploymentState {
            deployment_id: id.to_string(),
            version: test_version("2.0.0"),
            status: DeploymentStatus::InProgress,
            stages: vec![
                Stage {
                    stage_index: 0,
                    percentage: 5,
                    monitoring_duration_ms: 1000,
                    target_edge_ids: vec!["edge-a".to_string()],
                    status: StageStatus::Pending,
                },
                Stage {
                    stage_index: 1,
                    percentage: 100,
                    monitoring_duration_ms: 0,
                    target_edge_ids: vec!["edge-a".to_string(), "edge-b".to_string()],
                    status: StageStatus::Pending,
                },
            ],
            updated_edge_ids: vec![],
            rolled_back_edge_ids: vec![],
            started_at,
            completed_at: None,
            failure_reason: None,
        }
    }

    // ── Create / read ──────────────────────────────────────────────

    #[test]
    fn save_and_get() {
        let store = DeploymentStore::open_in_memory();
        let state = test_state("dep-1", 1000);

        store.save_deployment(&state).unwrap();
        let retrieved = store.get_deployment("dep-1");

        assert_eq!(retrieved, Some(state));
    }

    #[test]
    fn get_nonexistent_returns_none() {
        let store = DeploymentStore::open_in_memory();
        assert!(store.get_deployment("dep-nope").is_none());
    }

    #[test]
    fn duplicate_save_is_rejected() {
        let store = DeploymentStore::open_in_memory();
        let state = test_state("dep-1", 1000);

        store.save_deployment(&state).unwrap();
        let err = store.save_deployment(&state).unwrap_err();

        assert!(matches!(err, StateError::Duplicate(id) if id == "dep-1"));
    }

    // ── Merge updates ──────────────────────────────────────────────

    #[test]
    fn update_with_only_status_preserves_everything_else() {
        let store = DeploymentStore::open_in_memory();
        let mut state = test_state("dep-1", 1000);
        state.updated_edge_ids = vec!["edge-a".to_string(), "edge-b".to_string()];
        store.save_deployment(&state).unwrap();

        let updated = store
            .update_deployment(
                "dep-1",
                DeploymentPatch {
                    status: Some(DeploymentStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.status, DeploymentStatus::Completed);
        assert_eq!(updated.stages, state.stages);
        assert_eq!(updated.updated_edge_ids, state.updated_edge_ids);
        assert_eq!(updated.started_at, 1000);
    }

    #[test]
    fn update_unknown_deployment_is_not_found() {
        let store = DeploymentStore::open_in_memory();
        let err = store
            .update_deployment("dep-ghost", DeploymentPatch::default())
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(id) if id == "dep-ghost"));
    }

    #[test]
    fn successive_patches_accumulate() {
        let store = DeploymentStore::open_in_memory();
        store.save_deployment(&test_state("dep-1", 1000)).unwrap();

        store
            .update_deployment(
                "dep-1",
                DeploymentPatch {
                    updated_edge_ids: Some(vec!["edge-a".to_string()]),
                    ..Default::default()
                },
            )
            .unwrap();
        let final_state = store
            .update_deployment(
                "dep-1",
                DeploymentPatch {
                    status: Some(DeploymentStatus::RolledBack),
                    rolled_back_edge_ids: Some(vec!["edge-a".to_string()]),
                    failure_reason: Some("uptime below floor".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(final_state.status, DeploymentStatus::RolledBack);
        assert_eq!(final_state.updated_edge_ids, vec!["edge-a"]);
        assert_eq!(final_state.rolled_back_edge_ids, vec!["edge-a"]);
        assert_eq!(
            final_state.failure_reason.as_deref(),
            Some("uptime below floor")
        );
    }

    // ── Ordering ───────────────────────────────────────────────────

    #[test]
    fn latest_deployment_is_most_recent_by_start_time() {
        let store = DeploymentStore::open_in_memory();
        store.save_deployment(&test_state("dep-old", 1000)).unwrap();
        store.save_deployment(&test_state("dep-new", 3000)).unwrap();
        store.save_deployment(&test_state("dep-mid", 2000)).unwrap();

        let latest = store.get_latest_deployment().unwrap();
        assert_eq!(latest.deployment_id, "dep-new");
    }

    #[test]
    fn latest_on_empty_store_is_none() {
        let store = DeploymentStore::open_in_memory();
        assert!(store.get_latest_deployment().is_none());
    }

    #[test]
    fn list_orders_by_start_time() {
        let store = DeploymentStore::open_in_memory();
        store.save_deployment(&test_state("dep-b", 2000)).unwrap();
        store.save_deployment(&test_state("dep-a", 1000)).unwrap();

        let ids: Vec<String> = store
            .list_deployments()
            .into_iter()
            .map(|s| s.deployment_id)
            .collect();
        assert_eq!(ids, vec!["dep-a", "dep-b"]);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeploymentStore::open(&dir.path().join("deployments.json")).unwrap();
        assert!(store.list_deployments().is_empty());
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployments.json");

        {
            let store = DeploymentStore::open(&path).unwrap();
            store.save_deployment(&test_state("dep-1", 1000)).unwrap();
            store
                .update_deployment(
                    "dep-1",
                    DeploymentPatch {
                        status: Some(DeploymentStatus::Completed),
                        completed_at: Some(5000),
                        ..Default::default()
                    },
                )
                .unwrap();
        }

        // Reopen the same file.
        let store = DeploymentStore::open(&path).unwrap();
        let state = store.get_deployment("dep-1").unwrap();
        assert_eq!(state.status, DeploymentStatus::Completed);
        assert_eq!(state.completed_at, Some(5000));
    }

    #[test]
    fn rewrite_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployments.json");
        let store = DeploymentStore::open(&path).unwrap();
        store.save_deployment(&test_state("dep-1", 1000)).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["deployments.json"]);
    }

    #[test]
    fn file_holds_one_object_keyed_by_deployment_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployments.json");
        let store = DeploymentStore::open(&path).unwrap();
        store.save_deployment(&test_state("dep-1", 1000)).unwrap();
        store.save_deployment(&test_state("dep-2", 2000)).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert!(object.contains_key("dep-1"));
        assert!(object.contains_key("dep-2"));
    }

    #[test]
    fn corrupt_file_is_a_deserialize_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployments.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = DeploymentStore::open(&path).unwrap_err();
        assert!(matches!(err, StateError::Deserialize(_)));
    }

    #[test]
    fn clones_share_the_same_backing() {
        let store = DeploymentStore::open_in_memory();
        let clone = store.clone();

        store.save_deployment(&test_state("dep-1", 1000)).unwrap();
        assert!(clone.get_deployment("dep-1").is_some());
    }
}
