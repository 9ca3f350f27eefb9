//! Sync state surfaced to the UI.

use serde::{Deserialize, Serialize};

/// Lifecycle of the sync engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Error,
}

/// Snapshot of the sync layer, recomputed on demand.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_cloud_enabled: bool,
    pub pending_operations: usize,
    pub last_sync_timestamp: Option<i64>,
}
