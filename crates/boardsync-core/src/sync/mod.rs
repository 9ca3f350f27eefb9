//! Sync engine: workspace bootstrap, initial pull and debounced content pushes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::context::SyncContext;
use crate::error::{Error, Result};
use crate::local::LocalStore;
use crate::models::{BoardId, BoardPatch};
use crate::queue::OfflineQueue;
use crate::remote::CloudStore;
use crate::state::SyncState;
use crate::util::now_millis;

/// Boards moved in each direction by the initial pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullReport {
    pub pulled: usize,
    pub pushed: usize,
    pub skipped: usize,
}

struct ScheduledPush {
    token: u64,
    handle: JoinHandle<()>,
}

struct EngineInner {
    cloud: Arc<CloudStore>,
    local: LocalStore,
    queue: OfflineQueue,
    ctx: SyncContext,
    state: watch::Sender<SyncState>,
    running: AtomicBool,
    workspace_ready: AtomicBool,
    /// Unix ms of the last successful pull or push, 0 when none
    last_sync: AtomicI64,
    next_token: AtomicU64,
    scheduled: Mutex<HashMap<BoardId, ScheduledPush>>,
    /// Boards whose content push could not run yet
    deferred: Mutex<HashSet<BoardId>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Orchestrates one authenticated session against the remote store.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncEngine")
            .field("state", &self.state())
            .field("running", &self.inner.running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    #[must_use]
    pub fn new(
        cloud: Arc<CloudStore>,
        local: LocalStore,
        queue: OfflineQueue,
        ctx: SyncContext,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            inner: Arc::new(EngineInner {
                cloud,
                local,
                queue,
                ctx,
                state,
                running: AtomicBool::new(false),
                workspace_ready: AtomicBool::new(false),
                last_sync: AtomicI64::new(0),
                next_token: AtomicU64::new(0),
                scheduled: Mutex::new(HashMap::new()),
                deferred: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn cloud(&self) -> &Arc<CloudStore> {
        &self.inner.cloud
    }

    pub fn state(&self) -> SyncState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    fn set_state(&self, state: SyncState) {
        self.inner.state.send_replace(state);
    }

    /// Running and holding a workspace, so board calls can reach the remote.
    pub fn is_cloud_ready(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst) && self.inner.workspace_ready.load(Ordering::SeqCst)
    }

    pub fn last_sync_timestamp(&self) -> Option<i64> {
        match self.inner.last_sync.load(Ordering::SeqCst) {
            0 => None,
            timestamp => Some(timestamp),
        }
    }

    fn mark_synced(&self) {
        self.inner.last_sync.store(now_millis(), Ordering::SeqCst);
    }

    /// Bootstrap the workspace, then run the initial pull.
    ///
    /// On failure the engine is left in [`SyncState::Error`] without a
    /// workspace; board calls stay local until `start` runs again.
    pub async fn start(&self) -> Result<PullReport> {
        self.inner.running.store(true, Ordering::SeqCst);
        self.set_state(SyncState::Syncing);

        if let Err(error) = self.bootstrap_workspace().await {
            self.inner.workspace_ready.store(false, Ordering::SeqCst);
            self.set_state(SyncState::Error);
            tracing::warn!(%error, "No workspace; continuing without cloud sync");
            return Err(error);
        }
        self.inner.workspace_ready.store(true, Ordering::SeqCst);

        match self.initial_pull().await {
            Ok(report) => {
                self.mark_synced();
                self.set_state(SyncState::Idle);
                tracing::info!(
                    pulled = report.pulled,
                    pushed = report.pushed,
                    skipped = report.skipped,
                    "Initial pull finished"
                );
                Ok(report)
            }
            Err(error) => {
                self.set_state(SyncState::Error);
                tracing::warn!(%error, "Initial pull failed");
                Err(error)
            }
        }
    }

    /// `ensure_default_workspace` with a linear backoff on `Unauthorized` only.
    async fn bootstrap_workspace(&self) -> Result<String> {
        let settings = &self.inner.ctx.settings;
        let mut attempt = 0;
        loop {
            match self.inner.cloud.ensure_default_workspace().await {
                Ok(workspace_id) => return Ok(workspace_id),
                Err(Error::Unauthorized(message)) if attempt < settings.auth_retry_attempts => {
                    attempt += 1;
                    let delay = settings.auth_backoff(attempt);
                    tracing::warn!(attempt, %message, "Workspace bootstrap unauthorized; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Copy remote-only boards down and local-only boards up.
    ///
    /// Boards present on both sides are left alone, as are remote boards
    /// deleted on this device and local boards the queue still owns.
    pub async fn initial_pull(&self) -> Result<PullReport> {
        let cloud = &self.inner.cloud;
        let local = &self.inner.local;

        let remote_boards = cloud.get_boards().await?;
        let local_boards = local.get_boards().await;
        let tombstones: HashSet<String> = local.deleted_board_ids().await.into_iter().collect();
        let queued = self.inner.queue.pending_entity_ids().await;
        let mut report = PullReport::default();

        for remote in &remote_boards {
            if local_boards.iter().any(|board| board.matches(remote.id.as_str())) {
                continue;
            }
            if tombstones.contains(remote.id.as_str()) {
                report.skipped += 1;
                continue;
            }
            local.upsert_board(remote.clone()).await;
            match cloud.get_board_content(&remote.id).await {
                Ok(Some(content)) if !content.is_empty() => {
                    local.cache_board_content(&remote.id, &content).await;
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(board_id = %remote.id, %error, "Could not pull board content");
                }
            }
            report.pulled += 1;
        }

        for board in &local_boards {
            if board.pending_delete || queued.contains(board.id.as_str()) {
                report.skipped += 1;
                continue;
            }
            if remote_boards.iter().any(|remote| board.matches(remote.id.as_str())) {
                continue;
            }
            if board.cloud_id.is_some() {
                // Known to the remote once and gone now: archived elsewhere.
                tracing::debug!(board_id = %board.id, "Board no longer listed remotely; skipping");
                report.skipped += 1;
                continue;
            }

            let created = match cloud
                .create_board_with_id(&board.id, &board.name, Some(board.id.as_str()))
                .await
            {
                Ok(created) => created,
                Err(error) => {
                    tracing::warn!(board_id = %board.id, %error, "Could not push local board");
                    report.skipped += 1;
                    continue;
                }
            };
            local.rename_board_id(&board.id, &created.id).await;
            if let Some(thumbnail) = &board.thumbnail {
                if let Err(error) = cloud
                    .update_board(&created.id, &BoardPatch::thumbnail(thumbnail.clone()))
                    .await
                {
                    tracing::warn!(board_id = %created.id, %error, "Could not push board thumbnail");
                }
            }
            let content = local.get_board_content(&created.id).await?;
            if !content.is_empty() {
                if let Err(error) = cloud.save_board_content(&created.id, &content).await {
                    tracing::warn!(board_id = %created.id, %error, "Could not push board content");
                    self.defer(&created.id);
                }
            }
            report.pushed += 1;
        }

        Ok(report)
    }

    /// Push this board's content once edits have been quiet for the debounce window.
    ///
    /// Rescheduling restarts the window; the content read when it fires is pushed.
    /// Before [`Self::start`] the board is only marked deferred.
    pub fn schedule_board_content_sync(&self, board_id: &BoardId) {
        if !self.inner.running.load(Ordering::SeqCst) {
            self.defer(board_id);
            return;
        }
        let token = self.inner.next_token.fetch_add(1, Ordering::SeqCst);
        let delay = self.inner.ctx.settings.content_debounce();
        let engine = self.clone();
        let id = board_id.clone();

        let mut scheduled = lock(&self.inner.scheduled);
        if let Some(previous) = scheduled.remove(board_id) {
            previous.handle.abort();
        }
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.finish_scheduled(&id, token);
            if let Err(error) = engine.push_content(&id).await {
                tracing::error!(board_id = %id, %error, "Content push rejected");
            }
        });
        scheduled.insert(board_id.clone(), ScheduledPush { token, handle });
    }

    fn finish_scheduled(&self, board_id: &BoardId, token: u64) {
        let mut scheduled = lock(&self.inner.scheduled);
        if scheduled.get(board_id).is_some_and(|push| push.token == token) {
            scheduled.remove(board_id);
        }
    }

    /// Boards with a debounced push waiting to fire.
    pub fn scheduled_boards(&self) -> Vec<BoardId> {
        lock(&self.inner.scheduled).keys().cloned().collect()
    }

    /// Boards whose push is waiting for connectivity or a remote id.
    pub fn deferred_boards(&self) -> Vec<BoardId> {
        lock(&self.inner.deferred).iter().cloned().collect()
    }

    /// Whether local content of this board is newer than the remote copy.
    pub fn has_unpushed(&self, board_id: &BoardId) -> bool {
        lock(&self.inner.deferred).contains(board_id)
            || lock(&self.inner.scheduled).contains_key(board_id)
    }

    fn defer(&self, board_id: &BoardId) {
        lock(&self.inner.deferred).insert(board_id.clone());
    }

    /// Push the board's current local content now.
    ///
    /// Returns `Ok(false)` when the push was deferred (offline, temporary id,
    /// no workspace, transient failure).
    pub async fn push_content(&self, board_id: &BoardId) -> Result<bool> {
        if !self.inner.running.load(Ordering::SeqCst) {
            return Ok(false);
        }
        if board_id.is_temporary() || !self.inner.ctx.is_online() || !self.is_cloud_ready() {
            tracing::debug!(board_id = %board_id, "Deferring content push");
            self.defer(board_id);
            return Ok(false);
        }

        let content = self.inner.local.get_board_content(board_id).await?;
        match self.inner.cloud.save_board_content(board_id, &content).await {
            Ok(_) => {
                lock(&self.inner.deferred).remove(board_id);
                self.mark_synced();
                Ok(true)
            }
            Err(error) if error.is_retryable() => {
                tracing::warn!(board_id = %board_id, %error, "Content push failed; deferring");
                self.defer(board_id);
                Ok(false)
            }
            Err(error) => {
                lock(&self.inner.deferred).remove(board_id);
                Err(error)
            }
        }
    }

    /// Push every deferred board; returns how many went through.
    pub async fn flush_deferred(&self) -> usize {
        let boards = self.deferred_boards();
        let mut pushed = 0;
        for board_id in boards {
            match self.push_content(&board_id).await {
                Ok(true) => pushed += 1,
                Ok(false) => {}
                Err(error) => {
                    tracing::error!(board_id = %board_id, %error, "Deferred content push rejected");
                }
            }
        }
        if pushed > 0 {
            tracing::info!(pushed, "Flushed deferred content pushes");
        }
        pushed
    }

    /// Retarget pending and deferred pushes after a board got its remote id.
    pub fn remap_board(&self, old: &BoardId, new: &BoardId) {
        {
            let mut deferred = lock(&self.inner.deferred);
            if deferred.remove(old) {
                deferred.insert(new.clone());
            }
        }
        let had_scheduled = lock(&self.inner.scheduled)
            .remove(old)
            .map(|push| push.handle.abort())
            .is_some();
        if had_scheduled {
            self.schedule_board_content_sync(new);
        }
    }

    /// Forget a board entirely (it was deleted).
    pub fn forget_board(&self, board_id: &BoardId) {
        lock(&self.inner.deferred).remove(board_id);
        if let Some(push) = lock(&self.inner.scheduled).remove(board_id) {
            push.handle.abort();
        }
    }

    /// Cancel pending pushes and halt orchestration. The offline queue is kept.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.workspace_ready.store(false, Ordering::SeqCst);
        let cancelled: Vec<ScheduledPush> = lock(&self.inner.scheduled)
            .drain()
            .map(|(_, push)| push)
            .collect();
        for push in &cancelled {
            push.handle.abort();
        }
        self.set_state(SyncState::Idle);
        tracing::debug!(cancelled = cancelled.len(), "Sync engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncSettings;
    use crate::connectivity::ManualConnectivity;
    use crate::models::{Board, BoardContent, QueuedOperation};
    use crate::remote::{MemoryRemoteApi, RemoteApi, RemoteFailure};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    struct Harness {
        api: MemoryRemoteApi,
        local: LocalStore,
        queue: OfflineQueue,
        probe: Arc<ManualConnectivity>,
        engine: SyncEngine,
    }

    async fn harness() -> Harness {
        let api = MemoryRemoteApi::new();
        let probe = Arc::new(ManualConnectivity::new(true));
        let ctx = SyncContext::new(SyncSettings::default(), probe.clone());
        let local = LocalStore::in_memory().await.unwrap();
        let queue = OfflineQueue::open("user-1", local.database().clone(), ctx.clone())
            .await
            .unwrap();
        let cloud =
            Arc::new(CloudStore::new("user-1", Arc::new(api.clone()), ctx.clone()).unwrap());
        let engine = SyncEngine::new(cloud, local.clone(), queue.clone(), ctx);
        Harness {
            api,
            local,
            queue,
            probe,
            engine,
        }
    }

    fn drawing(text: &str) -> BoardContent {
        BoardContent::new(
            vec![json!({"id": "t1", "type": "text", "text": text})],
            serde_json::Map::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_retries_unauthorized_with_linear_backoff() {
        let h = harness().await;
        h.api.fail_next(2, RemoteFailure::Unauthorized);

        let started = Instant::now();
        h.engine.start().await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(h.api.call_count("ensure_default_workspace"), 3);
        assert_eq!(h.engine.state(), SyncState::Idle);
        assert!(h.engine.is_cloud_ready());
        assert!(h.engine.last_sync_timestamp().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_gives_up_after_retries() {
        let h = harness().await;
        h.api.fail_next(10, RemoteFailure::Unauthorized);

        let error = h.engine.start().await.unwrap_err();

        assert!(matches!(error, Error::Unauthorized(_)));
        assert_eq!(h.api.call_count("ensure_default_workspace"), 4);
        assert_eq!(h.engine.state(), SyncState::Error);
        assert!(!h.engine.is_cloud_ready());
    }

    #[tokio::test]
    async fn bootstrap_does_not_retry_other_errors() {
        let h = harness().await;
        h.api.fail_next(1, RemoteFailure::Unreachable);

        assert!(h.engine.start().await.is_err());
        assert_eq!(h.api.call_count("ensure_default_workspace"), 1);
    }

    #[tokio::test]
    async fn initial_pull_copies_missing_boards_both_ways() {
        let h = harness().await;
        let ws = h.api.ensure_default_workspace().await.unwrap();
        let remote = h.api.create_board(&ws.id, "Remote", None).await.unwrap();
        let seeding = CloudStore::new("user-1", Arc::new(h.api.clone()), SyncContext::default())
            .unwrap();
        let encrypted = seeding.encrypt_content(&drawing("from cloud"), 1).unwrap();
        h.api.save_content(&remote.id, &encrypted).await.unwrap();

        let local_id = h.local.create_board("Local").await;
        h.local
            .save_board_content(&local_id, drawing("from device"))
            .await
            .unwrap();

        let report = h.engine.start().await.unwrap();

        assert_eq!(report.pulled, 1);
        assert_eq!(report.pushed, 1);
        let remote_id = BoardId::from(remote.id.clone());
        assert_eq!(
            h.local.get_board_content(&remote_id).await.unwrap().elements,
            drawing("from cloud").elements
        );
        let remote_names: Vec<String> = h.api.boards().into_iter().map(|b| b.name).collect();
        assert_eq!(remote_names, vec!["Remote", "Local"]);
        assert!(h.local.get_board(&local_id).await.is_none());
        let pushed = h
            .local
            .get_boards()
            .await
            .into_iter()
            .find(|board| board.name == "Local")
            .unwrap();
        assert!(!pushed.id.is_temporary());
        assert!(h.api.stored_content(pushed.id.as_str()).is_some());
    }

    #[tokio::test]
    async fn initial_pull_leaves_shared_and_owned_boards_alone() {
        let h = harness().await;
        let ws = h.api.ensure_default_workspace().await.unwrap();
        let shared = h.api.create_board(&ws.id, "Shared", None).await.unwrap();
        let deleted = h.api.create_board(&ws.id, "Deleted here", None).await.unwrap();

        let mut local_shared = Board::new(BoardId::from(shared.id.clone()), "Renamed locally");
        local_shared.cloud_id = Some(shared.id.clone());
        h.local.upsert_board(local_shared).await;
        let tombstone = BoardId::from(deleted.id.clone());
        h.local.upsert_board(Board::new(tombstone.clone(), "x")).await;
        h.local.delete_board(&tombstone).await;
        let queued = h.local.create_board("Queued").await;
        h.queue
            .enqueue(QueuedOperation::create_board(&queued, "Queued"))
            .await
            .unwrap();

        let report = h.engine.start().await.unwrap();

        assert_eq!(report, PullReport { pulled: 0, pushed: 0, skipped: 2 });
        assert_eq!(h.api.boards().len(), 2);
        let names: Vec<String> = h.local.get_boards().await.into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["Renamed locally", "Queued"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_push_once_with_latest_content() {
        let h = harness().await;
        h.engine.start().await.unwrap();
        let board = h.engine.cloud().create_board("Plan").await.unwrap();
        h.local.upsert_board(board.clone()).await;

        for text in ["a", "ab", "abc"] {
            h.local
                .save_board_content(&board.id, drawing(text))
                .await
                .unwrap();
            h.engine.schedule_board_content_sync(&board.id);
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(h.api.call_count("save_content"), 1);
        let pulled = h.engine.cloud().get_board_content(&board.id).await.unwrap().unwrap();
        assert_eq!(pulled.elements, drawing("abc").elements);
        assert!(h.engine.scheduled_boards().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_scheduled_pushes_but_keeps_queue() {
        let h = harness().await;
        h.engine.start().await.unwrap();
        let board = h.engine.cloud().create_board("Plan").await.unwrap();
        h.local.upsert_board(board.clone()).await;
        h.queue
            .enqueue(QueuedOperation::delete_board(&BoardId::from("brd_x")))
            .await
            .unwrap();

        h.engine.schedule_board_content_sync(&board.id);
        h.engine.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(h.api.call_count("save_content"), 0);
        assert_eq!(h.queue.pending_count().await, 1);
        assert!(!h.engine.is_cloud_ready());
    }

    #[tokio::test]
    async fn offline_push_is_deferred_and_follows_remap() {
        let h = harness().await;
        h.engine.start().await.unwrap();
        h.probe.set_online(false);

        let temp = h.local.create_board("Sprint Plan").await;
        h.local
            .save_board_content(&temp, drawing("goals"))
            .await
            .unwrap();
        assert!(!h.engine.push_content(&temp).await.unwrap());
        assert_eq!(h.engine.deferred_boards(), vec![temp.clone()]);

        h.probe.set_online(true);
        let created = h
            .engine
            .cloud()
            .create_board_with_id(&temp, "Sprint Plan", None)
            .await
            .unwrap();
        h.local.rename_board_id(&temp, &created.id).await;
        h.engine.remap_board(&temp, &created.id);

        assert_eq!(h.engine.flush_deferred().await, 1);
        assert!(h.engine.deferred_boards().is_empty());
        assert_eq!(
            h.api.calls().last().map(String::as_str),
            Some(format!("save_content:{}", created.id).as_str())
        );
    }

    #[tokio::test]
    async fn transient_push_failure_is_deferred() {
        let h = harness().await;
        h.engine.start().await.unwrap();
        let board = h.engine.cloud().create_board("Plan").await.unwrap();
        h.local.upsert_board(board.clone()).await;
        h.api.fail_next(1, RemoteFailure::Unreachable);

        assert!(!h.engine.push_content(&board.id).await.unwrap());
        assert_eq!(h.engine.deferred_boards(), vec![board.id.clone()]);
        assert_eq!(h.engine.flush_deferred().await, 1);
    }

    #[tokio::test]
    async fn rejected_push_surfaces() {
        let h = harness().await;
        h.engine.start().await.unwrap();
        let board = h.engine.cloud().create_board("Plan").await.unwrap();
        h.local.upsert_board(board.clone()).await;
        h.api.fail_next(1, RemoteFailure::Rejected);

        let error = h.engine.push_content(&board.id).await.unwrap_err();
        assert!(error.must_surface());
        assert!(h.engine.deferred_boards().is_empty());
    }
}
