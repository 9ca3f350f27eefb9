//! Hybrid storage facade: the single entry point the editor talks to.
//!
//! Anonymous sessions use the local store only. Authenticated sessions wire a
//! cloud store, an offline queue and a sync engine together, and every
//! mutation takes one of three paths:
//!
//! 1. anonymous: local store only
//! 2. authenticated and online: remote first, local cache updated on success
//! 3. authenticated and offline, or the remote call failed: local store
//!    optimistically, plus an operation on the offline queue

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::context::SyncContext;
use crate::db::ANONYMOUS_BACKUP_KEY;
use crate::error::{Error, Result};
use crate::local::LocalStore;
use crate::models::{
    Board, BoardContent, BoardData, BoardFile, BoardId, BoardPatch, EntityType, OperationKind,
    OperationPayload, QueuedOperation,
};
use crate::queue::{DrainReport, OfflineQueue, OperationHandler, QueueEvent, Replay};
use crate::remote::{CloudStore, RemoteApi};
use crate::state::{SyncState, SyncStatus};
use crate::sync::{PullReport, SyncEngine};

/// Who the facade is working for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
    Anonymous,
    Authenticated { user_id: String },
}

/// What `save` stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub board_id: BoardId,
    pub version: u64,
    pub checksum: Option<String>,
    /// Files persisted alongside the content
    pub saved_file_ids: Vec<String>,
}

#[derive(Clone)]
struct CloudSession {
    user_id: String,
    cloud: Arc<CloudStore>,
    queue: OfflineQueue,
    engine: SyncEngine,
}

enum Route {
    Local,
    Remote(CloudSession),
    Queue(CloudSession),
}

struct HybridInner {
    local: LocalStore,
    ctx: SyncContext,
    api: Option<Arc<dyn RemoteApi>>,
    session: RwLock<Option<CloudSession>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    /// Set once an anonymous session has confirmed the cache is not a user's
    cache_released: AtomicBool,
}

impl Drop for HybridInner {
    fn drop(&mut self) {
        if let Some(watcher) = self
            .watcher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            watcher.abort();
        }
    }
}

/// Local-first board storage with optional cloud sync.
#[derive(Clone)]
pub struct HybridStorage {
    inner: Arc<HybridInner>,
}

impl std::fmt::Debug for HybridStorage {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HybridStorage")
            .field("local", &self.inner.local)
            .field("remote_configured", &self.inner.api.is_some())
            .finish_non_exhaustive()
    }
}

impl HybridStorage {
    /// Storage that can only ever run anonymously.
    #[must_use]
    pub fn new(local: LocalStore, ctx: SyncContext) -> Self {
        Self::build(local, ctx, None)
    }

    /// Storage that can switch to cloud sync through `api`.
    #[must_use]
    pub fn with_remote(local: LocalStore, ctx: SyncContext, api: Arc<dyn RemoteApi>) -> Self {
        Self::build(local, ctx, Some(api))
    }

    fn build(local: LocalStore, ctx: SyncContext, api: Option<Arc<dyn RemoteApi>>) -> Self {
        Self {
            inner: Arc::new(HybridInner {
                local,
                ctx,
                api,
                session: RwLock::new(None),
                watcher: Mutex::new(None),
                cache_released: AtomicBool::new(false),
            }),
        }
    }

    pub fn local(&self) -> &LocalStore {
        &self.inner.local
    }

    pub fn context(&self) -> &SyncContext {
        &self.inner.ctx
    }

    async fn session(&self) -> Option<CloudSession> {
        self.inner.session.read().await.clone()
    }

    pub async fn mode(&self) -> StorageMode {
        match self.session().await {
            Some(session) => StorageMode::Authenticated {
                user_id: session.user_id,
            },
            None => StorageMode::Anonymous,
        }
    }

    async fn route(&self) -> Result<Route> {
        Ok(match self.session().await {
            None => {
                self.release_user_cache().await?;
                Route::Local
            }
            Some(session) if self.inner.ctx.is_online() && session.engine.is_cloud_ready() => {
                Route::Remote(session)
            }
            Some(session) => Route::Queue(session),
        })
    }

    /// Clear boards a signed-in user left in the cache when nobody is signed in.
    ///
    /// Returns whether anything was cleared. The anonymous backup and the
    /// user's queue are left in place for the user's next session.
    pub async fn release_user_cache(&self) -> Result<bool> {
        if self.inner.cache_released.load(Ordering::Acquire) {
            return Ok(false);
        }
        let session = self.inner.session.read().await;
        if session.is_some() {
            return Ok(false);
        }

        let local = &self.inner.local;
        let owner = local.cache_owner().await?;
        if let Some(owner) = &owner {
            local.clear_cache().await;
            local.clear_deleted_board_ids().await;
            local.set_cache_owner(None).await?;
            tracing::info!(previous_owner = %owner, "Cleared boards left by a signed-in user");
        }
        self.inner.cache_released.store(true, Ordering::Release);
        drop(session);
        Ok(owner.is_some())
    }

    /// Switch to authenticated mode for `user_id`.
    ///
    /// Anonymous boards are backed up and the cache is cleared before any
    /// cloud data is loaded. The engine is started and the queue drained when
    /// online; a failed start leaves the session cloud-disabled until
    /// [`Self::restart_sync`] or the next reconnect.
    pub async fn enable_cloud_sync(&self, user_id: &str) -> Result<()> {
        let api = self.inner.api.clone().ok_or_else(|| {
            Error::InvalidInput("cloud sync needs a remote store".to_string())
        })?;
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(Error::InvalidInput("user id must not be empty".to_string()));
        }

        if let Some(existing) = self.session().await {
            if existing.user_id == user_id {
                return Ok(());
            }
            self.disable_cloud_sync().await?;
        }

        let local = &self.inner.local;
        self.inner.cache_released.store(false, Ordering::Release);
        let owner = local.cache_owner().await?;
        if owner.as_deref() != Some(user_id) {
            if owner.is_none() {
                local.backup_boards(ANONYMOUS_BACKUP_KEY).await?;
            }
            local.clear_cache().await;
            local.clear_deleted_board_ids().await;
            local.set_cache_owner(Some(user_id)).await?;
        }

        let ctx = self.inner.ctx.clone();
        let cloud = Arc::new(CloudStore::new(user_id, api, ctx.clone())?);
        let queue = OfflineQueue::open(user_id, local.database().clone(), ctx.clone()).await?;
        let engine = SyncEngine::new(Arc::clone(&cloud), local.clone(), queue.clone(), ctx);
        let session = CloudSession {
            user_id: user_id.to_string(),
            cloud,
            queue,
            engine,
        };
        *self.inner.session.write().await = Some(session.clone());
        tracing::info!(user_id, "Cloud sync enabled");

        if self.inner.ctx.is_online() {
            self.start_session(&session).await;
        }
        self.spawn_connectivity_watcher();
        Ok(())
    }

    /// Return to anonymous mode, wiping everything the user left on the device.
    pub async fn disable_cloud_sync(&self) -> Result<()> {
        let Some(session) = self.inner.session.write().await.take() else {
            return Ok(());
        };
        if let Some(watcher) = self
            .inner
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            watcher.abort();
        }

        session.engine.stop();
        session.queue.clear().await?;
        let local = &self.inner.local;
        local.clear_cache().await;
        local.clear_deleted_board_ids().await;
        local.set_cache_owner(None).await?;
        local.flush_save().await?;
        tracing::info!(user_id = %session.user_id, "Cloud sync disabled");
        Ok(())
    }

    /// Start the engine and drain the queue; failures are logged.
    async fn start_session(&self, session: &CloudSession) {
        if let Err(error) = session.engine.start().await {
            tracing::warn!(user_id = %session.user_id, %error, "Sync engine did not start");
            return;
        }
        if let Err(error) = self.drain(session).await {
            tracing::warn!(%error, "Queue drain failed");
        }
    }

    fn spawn_connectivity_watcher(&self) {
        let weak: Weak<HybridInner> = Arc::downgrade(&self.inner);
        let mut online = self.inner.ctx.connectivity.subscribe();
        let handle = tokio::spawn(async move {
            while online.changed().await.is_ok() {
                if !*online.borrow_and_update() {
                    continue;
                }
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let storage = HybridStorage { inner };
                storage.on_reconnect().await;
            }
        });

        let mut watcher = self
            .inner
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = watcher.replace(handle) {
            previous.abort();
        }
    }

    async fn on_reconnect(&self) {
        let Some(session) = self.session().await else {
            return;
        };
        tracing::info!("Back online; resuming sync");
        if session.engine.is_cloud_ready() {
            if let Err(error) = self.drain(&session).await {
                tracing::warn!(%error, "Queue drain failed");
            }
        } else {
            self.start_session(&session).await;
        }
    }

    /// Restart the engine (after a failed bootstrap) and drain the queue.
    pub async fn restart_sync(&self) -> Result<PullReport> {
        let session = self
            .session()
            .await
            .ok_or_else(|| Error::InvalidInput("cloud sync is not enabled".to_string()))?;
        let report = session.engine.start().await?;
        self.drain(&session).await?;
        Ok(report)
    }

    /// Replay the offline queue now, then push deferred content.
    pub async fn process_queue(&self) -> Result<DrainReport> {
        match self.session().await {
            Some(session) => self.drain(&session).await,
            None => Ok(DrainReport::default()),
        }
    }

    async fn drain(&self, session: &CloudSession) -> Result<DrainReport> {
        if !session.engine.is_cloud_ready() {
            tracing::debug!("No workspace yet; leaving queue untouched");
            return Ok(DrainReport {
                remaining: session.queue.pending_count().await,
                ..DrainReport::default()
            });
        }
        let replayer = SessionReplayer {
            local: &self.inner.local,
            session,
        };
        let report = session.queue.process_queue(&replayer).await?;
        session.engine.flush_deferred().await;
        Ok(report)
    }

    /// Drain in the background after an enqueue while online.
    fn kick_queue(&self) {
        if !self.inner.ctx.is_online() {
            return;
        }
        let storage = self.clone();
        tokio::spawn(async move {
            if let Err(error) = storage.process_queue().await {
                tracing::warn!(%error, "Queue drain failed");
            }
        });
    }

    async fn enqueue(&self, session: &CloudSession, op: QueuedOperation) -> Result<()> {
        session.queue.enqueue(op).await?;
        self.kick_queue();
        Ok(())
    }

    /// Boards, newest remote truth when reachable, the local cache otherwise.
    ///
    /// Boards waiting to be deleted are hidden.
    pub async fn get_boards(&self) -> Result<Vec<Board>> {
        if let Route::Remote(session) = self.route().await? {
            match session.cloud.get_boards().await {
                Ok(remote) => {
                    let merged = self.merge_remote_boards(&session, remote).await;
                    self.inner.local.update_board_cache(merged.clone()).await;
                    return Ok(visible(merged));
                }
                Err(error) => {
                    tracing::warn!(%error, "Listing remote boards failed; using local cache");
                }
            }
        }
        Ok(visible(self.inner.local.get_boards().await))
    }

    /// Remote boards, except where a queued operation makes the local copy newer,
    /// followed by local boards the remote has not seen yet.
    async fn merge_remote_boards(&self, session: &CloudSession, remote: Vec<Board>) -> Vec<Board> {
        let local = self.inner.local.get_boards().await;
        let queued = session.queue.pending_entity_ids().await;
        let tombstones: HashSet<String> = self
            .inner
            .local
            .deleted_board_ids()
            .await
            .into_iter()
            .collect();

        let mut merged: Vec<Board> = remote
            .into_iter()
            .filter(|board| !tombstones.contains(board.id.as_str()))
            .map(|board| {
                if queued.contains(board.id.as_str()) {
                    if let Some(cached) = local.iter().find(|cached| cached.id == board.id) {
                        return cached.clone();
                    }
                }
                board
            })
            .collect();
        for board in local {
            let unseen = board.id.is_temporary() || queued.contains(board.id.as_str());
            if unseen && !merged.iter().any(|existing| existing.id == board.id) {
                merged.push(board);
            }
        }
        merged
    }

    /// Board content, remote first unless local edits have not been pushed yet.
    pub async fn get_board_content(&self, board_id: &BoardId) -> Result<BoardContent> {
        if let Route::Remote(session) = self.route().await? {
            if !board_id.is_temporary() && !session.engine.has_unpushed(board_id) {
                match session.cloud.get_board_content(board_id).await {
                    Ok(Some(content)) => {
                        self.inner
                            .local
                            .cache_board_content(board_id, &content)
                            .await;
                        return Ok(content);
                    }
                    Ok(None) => {}
                    Err(error) => {
                        tracing::warn!(board_id = %board_id, %error, "Fetching remote content failed; using local copy");
                    }
                }
            }
        }
        self.inner.local.get_board_content(board_id).await
    }

    pub async fn create_board(&self, name: &str) -> Result<Board> {
        match self.route().await? {
            Route::Local => Ok(self
                .inner
                .local
                .create_board_with_id(&BoardId::new_local(), name)
                .await),
            Route::Remote(session) => {
                let temp = BoardId::new_local();
                let op = QueuedOperation::create_board(&temp, name);
                match session
                    .cloud
                    .create_board_with_id(&temp, name, op.idempotency_key.as_deref())
                    .await
                {
                    Ok(board) => {
                        self.inner.local.upsert_board(board.clone()).await;
                        Ok(board)
                    }
                    Err(error) if error.must_surface() => Err(error),
                    Err(error) => {
                        tracing::warn!(%error, "Remote create failed; queueing");
                        self.queue_create(&session, op, name).await
                    }
                }
            }
            Route::Queue(session) => {
                let op = QueuedOperation::create_board(&BoardId::new_local(), name);
                self.queue_create(&session, op, name).await
            }
        }
    }

    async fn queue_create(
        &self,
        session: &CloudSession,
        op: QueuedOperation,
        name: &str,
    ) -> Result<Board> {
        let board = self
            .inner
            .local
            .create_board_with_id(&BoardId::from(op.entity_id.clone()), name)
            .await;
        self.enqueue(session, op).await?;
        Ok(board)
    }

    /// Apply a patch. Returns the updated board, `None` if it is not cached locally.
    pub async fn update_board(&self, board_id: &BoardId, patch: BoardPatch) -> Result<Option<Board>> {
        if patch.is_empty() {
            return Ok(self.inner.local.get_board(board_id).await);
        }
        let session = match self.route().await? {
            Route::Local => return Ok(self.inner.local.update_board(board_id, &patch).await),
            Route::Remote(session) => {
                if self.can_call_remote(&session, board_id).await {
                    match session.cloud.update_board(board_id, &patch).await {
                        Ok(()) => return Ok(self.inner.local.update_board(board_id, &patch).await),
                        Err(error) if error.must_surface() => return Err(error),
                        Err(error) => {
                            tracing::warn!(board_id = %board_id, %error, "Remote update failed; queueing");
                        }
                    }
                }
                session
            }
            Route::Queue(session) => session,
        };

        let updated = self.inner.local.update_board(board_id, &patch).await;
        self.enqueue(&session, QueuedOperation::update_board(board_id, patch))
            .await?;
        Ok(updated)
    }

    pub async fn update_board_name(&self, board_id: &BoardId, name: &str) -> Result<Option<Board>> {
        self.update_board(board_id, BoardPatch::rename(name)).await
    }

    pub async fn delete_board(&self, board_id: &BoardId) -> Result<()> {
        let local = &self.inner.local;
        let session = match self.route().await? {
            Route::Local => {
                local.delete_board(board_id).await;
                return Ok(());
            }
            Route::Remote(session) | Route::Queue(session) => session,
        };
        session.engine.forget_board(board_id);

        let pending = session
            .queue
            .get_pending_for_entity(EntityType::Board, board_id.as_str())
            .await;
        let remote_never_saw_it = board_id.is_temporary()
            && (pending.is_empty()
                || pending.iter().any(|op| op.kind() == OperationKind::Create));
        if remote_never_saw_it {
            let discarded = session
                .queue
                .discard_entity(EntityType::Board, board_id.as_str())
                .await?;
            tracing::debug!(board_id = %board_id, discarded, "Deleted board that never reached the remote");
            local.delete_board(board_id).await;
            return Ok(());
        }

        if matches!(self.route().await?, Route::Remote(_)) && pending.is_empty() {
            match session.cloud.delete_board(board_id).await {
                Ok(()) | Err(Error::NotFound(_)) => {
                    local.delete_board(board_id).await;
                    return Ok(());
                }
                Err(error) if error.must_surface() => return Err(error),
                Err(error) => {
                    tracing::warn!(board_id = %board_id, %error, "Remote delete failed; queueing");
                }
            }
        }

        local.mark_board_pending_delete(board_id).await;
        self.enqueue(&session, QueuedOperation::delete_board(board_id))
            .await
    }

    /// Whether a direct remote call on this board keeps queue order intact.
    async fn can_call_remote(&self, session: &CloudSession, board_id: &BoardId) -> bool {
        !board_id.is_temporary()
            && session
                .queue
                .get_pending_for_entity(EntityType::Board, board_id.as_str())
                .await
                .is_empty()
    }

    /// Save content locally and schedule a debounced push when authenticated.
    pub async fn save_board_content(
        &self,
        board_id: &BoardId,
        content: BoardContent,
    ) -> Result<BoardContent> {
        let session = self.session().await;
        if session.is_none() {
            self.release_user_cache().await?;
        }
        let saved = self
            .inner
            .local
            .save_board_content(board_id, content)
            .await?;
        if let Some(session) = session {
            session.engine.schedule_board_content_sync(board_id);
        }
        Ok(saved)
    }

    /// Push a board's content now instead of waiting for the debounce window.
    ///
    /// Returns `Ok(false)` when anonymous or when the push was deferred.
    pub async fn push_board_content(&self, board_id: &BoardId) -> Result<bool> {
        match self.session().await {
            Some(session) => session.engine.push_content(board_id).await,
            None => Ok(false),
        }
    }

    /// Editor save: content, view state and any files placed on the canvas.
    pub async fn save(
        &self,
        board_id: &BoardId,
        elements: Vec<Value>,
        app_state: Map<String, Value>,
        files: Vec<BoardFile>,
    ) -> Result<SaveOutcome> {
        let saved = self
            .save_board_content(board_id, BoardContent::new(elements, app_state))
            .await?;
        self.inner.local.save_board_files(board_id, &files).await;
        self.inner.local.set_current_board_id(Some(board_id)).await;
        Ok(SaveOutcome {
            board_id: board_id.clone(),
            version: saved.version,
            checksum: saved.checksum,
            saved_file_ids: files.into_iter().map(|file| file.id).collect(),
        })
    }

    /// Everything the editor needs to open a board; also makes it the current board.
    pub async fn load_board_data(&self, board_id: &BoardId) -> Result<BoardData> {
        self.release_user_cache().await?;
        let board = self
            .inner
            .local
            .get_board(board_id)
            .await
            .filter(|board| !board.pending_delete)
            .ok_or_else(|| Error::NotFound(board_id.to_string()))?;
        let content = self.get_board_content(board_id).await?;
        let files = self.inner.local.get_board_files(board_id).await?;
        self.inner.local.set_current_board_id(Some(board_id)).await;
        Ok(BoardData {
            board,
            content,
            files,
        })
    }

    pub async fn current_board_id(&self) -> Option<BoardId> {
        self.inner.local.current_board_id().await
    }

    pub async fn set_current_board_id(&self, board_id: Option<&BoardId>) {
        self.inner.local.set_current_board_id(board_id).await;
    }

    pub async fn sync_status(&self) -> SyncStatus {
        let session = self.session().await;
        let is_online = self.inner.ctx.is_online();
        match session {
            Some(session) => SyncStatus {
                is_online,
                is_cloud_enabled: session.engine.is_cloud_ready(),
                pending_operations: session.queue.pending_count().await,
                last_sync_timestamp: session.engine.last_sync_timestamp(),
            },
            None => SyncStatus {
                is_online,
                ..SyncStatus::default()
            },
        }
    }

    pub async fn sync_state(&self) -> SyncState {
        self.session()
            .await
            .map_or(SyncState::Idle, |session| session.engine.state())
    }

    /// Operations waiting for the remote, oldest first.
    pub async fn pending_operations(&self) -> Vec<QueuedOperation> {
        match self.session().await {
            Some(session) => session.queue.pending().await,
            None => Vec::new(),
        }
    }

    pub async fn subscribe_queue(&self) -> Option<broadcast::Receiver<QueueEvent>> {
        self.session()
            .await
            .map(|session| session.queue.subscribe())
    }

    /// Force local durability. Call before the process exits.
    pub async fn flush_save(&self) -> Result<()> {
        self.inner.local.flush_save().await
    }
}

fn visible(boards: Vec<Board>) -> Vec<Board> {
    boards
        .into_iter()
        .filter(|board| !board.pending_delete)
        .collect()
}

/// Replays queued operations against the cloud store and keeps the local
/// cache and engine in step with what the remote assigns.
struct SessionReplayer<'a> {
    local: &'a LocalStore,
    session: &'a CloudSession,
}

#[async_trait]
impl OperationHandler for SessionReplayer<'_> {
    async fn replay(&self, op: &QueuedOperation) -> Result<Replay> {
        let board_id = BoardId::from(op.entity_id.clone());
        let cloud = &self.session.cloud;
        match &op.payload {
            OperationPayload::CreateBoard { name } => {
                let created = cloud
                    .create_board_with_id(&board_id, name, op.idempotency_key.as_deref())
                    .await?;
                if created.id != board_id {
                    self.local.rename_board_id(&board_id, &created.id).await;
                    self.session.engine.remap_board(&board_id, &created.id);
                }
                Ok(Replay::Created {
                    remote_id: created.id.to_string(),
                })
            }
            OperationPayload::UpdateBoard(patch) => {
                if board_id.is_temporary() {
                    return Err(Error::NotFound(format!(
                        "board {board_id} was never created remotely"
                    )));
                }
                cloud.update_board(&board_id, patch).await?;
                Ok(Replay::Applied)
            }
            OperationPayload::DeleteBoard => {
                match cloud.delete_board(&board_id).await {
                    Ok(()) | Err(Error::NotFound(_)) => {}
                    Err(error) => return Err(error),
                }
                self.session.engine.forget_board(&board_id);
                self.local.delete_board(&board_id).await;
                Ok(Replay::Applied)
            }
        }
    }

    async fn dropped(&self, op: &QueuedOperation) {
        if matches!(op.payload, OperationPayload::DeleteBoard) {
            let board_id = BoardId::from(op.entity_id.clone());
            tracing::warn!(board_id = %board_id, "Delete never reached the remote; showing the board again");
            self.local.clear_pending_delete(&board_id).await;
        }
    }
}
