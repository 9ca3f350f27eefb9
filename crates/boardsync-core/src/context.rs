//! Per-session context shared by the facade, cloud store and queue.

use std::sync::Arc;

use crate::config::SyncSettings;
use crate::connectivity::{ConnectivityProbe, ManualConnectivity};
use crate::crypto::KeyCache;

/// Everything that would otherwise be a process global: settings, the
/// derived-key cache and the connectivity probe.
#[derive(Clone)]
pub struct SyncContext {
    pub settings: SyncSettings,
    pub keys: KeyCache,
    pub connectivity: Arc<dyn ConnectivityProbe>,
}

impl SyncContext {
    #[must_use]
    pub fn new(settings: SyncSettings, connectivity: Arc<dyn ConnectivityProbe>) -> Self {
        Self {
            settings,
            keys: KeyCache::new(),
            connectivity,
        }
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new(
            SyncSettings::default(),
            Arc::new(ManualConnectivity::default()),
        )
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncContext")
            .field("settings", &self.settings)
            .field("cached_keys", &self.keys.len())
            .field("online", &self.is_online())
            .finish()
    }
}
