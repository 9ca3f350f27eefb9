//! On-device board store.
//!
//! The store keeps the board list in memory and writes every change through
//! to `SQLite`. A write that fails is logged and remembered; the in-memory edit
//! survives and [`LocalStore::flush_save`] retries it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    BoardRepository, Database, SqliteBoardRepository, SqliteStateRepository, StateRepository,
};
use crate::error::Result;
use crate::models::{Board, BoardContent, BoardFile, BoardId, BoardPatch};
use crate::services::DatabaseService;

#[derive(Debug, Default)]
struct LocalCache {
    boards: Vec<Board>,
    deleted_ids: Vec<String>,
    current_board: Option<BoardId>,
    /// Content whose last write did not reach the database
    unsaved_content: HashMap<BoardId, BoardContent>,
    unsaved_files: HashMap<BoardId, Vec<BoardFile>>,
    boards_dirty: bool,
    state_dirty: bool,
    /// Boards removed while the database was failing
    unsaved_deletes: HashSet<BoardId>,
}

impl LocalCache {
    fn position(&self, id: &BoardId) -> Option<usize> {
        self.boards.iter().position(|board| &board.id == id)
    }

    fn has_unsaved_work(&self) -> bool {
        self.boards_dirty
            || self.state_dirty
            || !self.unsaved_content.is_empty()
            || !self.unsaved_files.is_empty()
            || !self.unsaved_deletes.is_empty()
    }
}

/// Always-available persistence of board metadata, content and files.
#[derive(Clone)]
pub struct LocalStore {
    db: DatabaseService,
    cache: Arc<Mutex<LocalCache>>,
}

impl LocalStore {
    /// Load the cached board list and client state from the database.
    pub async fn open(db: DatabaseService) -> Result<Self> {
        let cache = db
            .with_db(|db| {
                let conn = db.connection();
                let boards = SqliteBoardRepository::new(conn).list()?;
                let state = SqliteStateRepository::new(conn);
                Ok(LocalCache {
                    boards,
                    deleted_ids: state.deleted_board_ids()?,
                    current_board: state.current_board_id()?,
                    ..LocalCache::default()
                })
            })
            .await?;

        tracing::debug!(boards = cache.boards.len(), "Opened local store");
        Ok(Self {
            db,
            cache: Arc::new(Mutex::new(cache)),
        })
    }

    /// Open a store over a fresh in-memory database.
    pub async fn in_memory() -> Result<Self> {
        Self::open(DatabaseService::open_in_memory()?).await
    }

    /// The database shared with the offline queue.
    pub const fn database(&self) -> &DatabaseService {
        &self.db
    }

    /// Every cached board, including those waiting to be deleted.
    pub async fn get_boards(&self) -> Vec<Board> {
        self.cache.lock().await.boards.clone()
    }

    pub async fn get_board(&self, id: &BoardId) -> Option<Board> {
        let cache = self.cache.lock().await;
        cache.position(id).map(|index| cache.boards[index].clone())
    }

    /// Create a board under a fresh temporary id.
    pub async fn create_board(&self, name: &str) -> BoardId {
        let board = Board::new(BoardId::new_local(), name);
        let id = board.id.clone();
        self.upsert_board(board).await;
        id
    }

    /// Create a board with a caller-supplied id; returns the existing board untouched if present.
    pub async fn create_board_with_id(&self, id: &BoardId, name: &str) -> Board {
        if let Some(existing) = self.get_board(id).await {
            return existing;
        }
        let board = Board::new(id.clone(), name);
        self.upsert_board(board.clone()).await;
        board
    }

    /// Insert or replace a board row as-is.
    pub async fn upsert_board(&self, board: Board) {
        let mut cache = self.cache.lock().await;
        match cache.position(&board.id) {
            Some(index) => cache.boards[index] = board.clone(),
            None => cache.boards.push(board.clone()),
        }
        cache.unsaved_deletes.remove(&board.id);

        let written = self
            .persist("upsert board", |db| {
                SqliteBoardRepository::new(db.connection()).upsert(&board)
            })
            .await;
        if !written {
            cache.boards_dirty = true;
        }
    }

    /// Apply a patch to a cached board. Absent boards are ignored.
    pub async fn update_board(&self, id: &BoardId, patch: &BoardPatch) -> Option<Board> {
        let mut cache = self.cache.lock().await;
        let index = cache.position(id)?;
        cache.boards[index].apply(patch);
        let board = cache.boards[index].clone();

        let written = self
            .persist("update board", |db| {
                SqliteBoardRepository::new(db.connection()).upsert(&board)
            })
            .await;
        if !written {
            cache.boards_dirty = true;
        }
        Some(board)
    }

    /// Remove a board with its content and files, and remember it was deleted.
    pub async fn delete_board(&self, id: &BoardId) {
        let mut cache = self.cache.lock().await;
        cache.boards.retain(|board| &board.id != id);
        cache.unsaved_content.remove(id);
        cache.unsaved_files.remove(id);
        if !cache.deleted_ids.iter().any(|deleted| deleted == id.as_str()) {
            cache.deleted_ids.push(id.to_string());
        }
        if cache.current_board.as_ref() == Some(id) {
            cache.current_board = None;
        }

        let deleted_ids = cache.deleted_ids.clone();
        let current = cache.current_board.clone();
        let written = self
            .persist("delete board", |db| {
                let conn = db.connection();
                SqliteBoardRepository::new(conn).delete(id)?;
                let state = SqliteStateRepository::new(conn);
                state.set_deleted_board_ids(&deleted_ids)?;
                state.set_current_board_id(current.as_ref())
            })
            .await;
        if !written {
            cache.unsaved_deletes.insert(id.clone());
            cache.state_dirty = true;
        }
    }

    /// Last saved content, or empty content if the board was never saved.
    pub async fn get_board_content(&self, id: &BoardId) -> Result<BoardContent> {
        let cache = self.cache.lock().await;
        if let Some(content) = cache.unsaved_content.get(id) {
            return Ok(content.clone());
        }
        let stored = self
            .db
            .with_db(|db| SqliteBoardRepository::new(db.connection()).get_content(id))
            .await?;
        Ok(stored.unwrap_or_default())
    }

    /// Save a local edit: bumps the version, reseals the checksum and touches the board.
    pub async fn save_board_content(
        &self,
        id: &BoardId,
        content: BoardContent,
    ) -> Result<BoardContent> {
        let previous = self.get_board_content(id).await?;
        let mut content = content;
        content.version = previous.version.max(content.version) + 1;
        content.seal()?;

        let mut cache = self.cache.lock().await;
        let board = cache.position(id).map(|index| {
            cache.boards[index].touch();
            cache.boards[index].clone()
        });
        self.write_content(&mut cache, id, &content, board.as_ref())
            .await;
        Ok(content)
    }

    /// Store content fetched from the remote without bumping its version.
    pub async fn cache_board_content(&self, id: &BoardId, content: &BoardContent) {
        let mut cache = self.cache.lock().await;
        self.write_content(&mut cache, id, content, None).await;
    }

    async fn write_content(
        &self,
        cache: &mut LocalCache,
        id: &BoardId,
        content: &BoardContent,
        board: Option<&Board>,
    ) {
        let written = self
            .persist("save board content", |db| {
                let repo = SqliteBoardRepository::new(db.connection());
                repo.save_content(id, content)?;
                if let Some(board) = board {
                    repo.upsert(board)?;
                }
                Ok(())
            })
            .await;

        if written {
            cache.unsaved_content.remove(id);
        } else {
            cache.unsaved_content.insert(id.clone(), content.clone());
            if board.is_some() {
                cache.boards_dirty = true;
            }
        }
    }

    pub async fn mark_board_pending_delete(&self, id: &BoardId) {
        self.set_pending_delete(id, true).await;
    }

    /// Undo [`Self::mark_board_pending_delete`] once a queued delete is dropped unsent.
    pub async fn clear_pending_delete(&self, id: &BoardId) {
        self.set_pending_delete(id, false).await;
    }

    async fn set_pending_delete(&self, id: &BoardId, pending: bool) {
        let board = {
            let mut cache = self.cache.lock().await;
            let Some(index) = cache.position(id) else {
                return;
            };
            cache.boards[index].pending_delete = pending;
            cache.boards[index].clone()
        };
        self.upsert_board(board).await;
    }

    /// Replace the cached list with `boards` (remote truth).
    ///
    /// Content and files of boards dropped from the list are left in place.
    pub async fn update_board_cache(&self, boards: Vec<Board>) {
        let mut cache = self.cache.lock().await;
        cache.boards = boards;
        let boards = cache.boards.clone();
        let written = self
            .persist("replace board cache", |db| {
                SqliteBoardRepository::new(db.connection()).replace_all(&boards)
            })
            .await;
        cache.boards_dirty = !written;
    }

    /// Forget every board, content blob, file and the current board pointer.
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.lock().await;
        cache.boards.clear();
        cache.unsaved_content.clear();
        cache.unsaved_files.clear();
        cache.unsaved_deletes.clear();
        cache.current_board = None;

        let written = self
            .persist("clear local cache", |db| {
                let conn = db.connection();
                SqliteBoardRepository::new(conn).clear()?;
                SqliteStateRepository::new(conn).set_current_board_id(None)
            })
            .await;
        cache.boards_dirty = !written;
        cache.state_dirty |= !written;
        tracing::debug!("Cleared local board cache");
    }

    pub async fn deleted_board_ids(&self) -> Vec<String> {
        self.cache.lock().await.deleted_ids.clone()
    }

    pub async fn clear_deleted_board_ids(&self) {
        let mut cache = self.cache.lock().await;
        cache.deleted_ids.clear();
        let written = self
            .persist("clear deleted board ids", |db| {
                SqliteStateRepository::new(db.connection()).set_deleted_board_ids(&[])
            })
            .await;
        cache.state_dirty |= !written;
    }

    /// Replace a temporary id with the id the remote assigned.
    ///
    /// Content, files and the current board pointer follow the board. When
    /// `new` is already cached its row is kept and takes over the old content.
    pub async fn rename_board_id(&self, old: &BoardId, new: &BoardId) {
        if old == new {
            return;
        }
        let mut cache = self.cache.lock().await;
        let Some(index) = cache.position(old) else {
            return;
        };
        if cache.position(new).is_some() {
            // The remote board is already cached; the temporary row is redundant.
            cache.boards.remove(index);
        } else {
            let board = &mut cache.boards[index];
            board.id = new.clone();
            board.cloud_id = Some(new.to_string());
        }
        if let Some(content) = cache.unsaved_content.remove(old) {
            cache.unsaved_content.insert(new.clone(), content);
        }
        if let Some(files) = cache.unsaved_files.remove(old) {
            cache.unsaved_files.insert(new.clone(), files);
        }
        if cache.current_board.as_ref() == Some(old) {
            cache.current_board = Some(new.clone());
        }

        let current = cache.current_board.clone();
        let written = self
            .persist("rename board id", |db| {
                let conn = db.connection();
                SqliteBoardRepository::new(conn).rename(old, new)?;
                SqliteStateRepository::new(conn).set_current_board_id(current.as_ref())
            })
            .await;
        if written {
            tracing::debug!(old = %old, new = %new, "Board id replaced");
        } else {
            cache.boards_dirty = true;
            cache.state_dirty = true;
        }
    }

    /// Copy the board list under `key` in local state; returns how many boards were saved.
    pub async fn backup_boards(&self, key: &str) -> Result<usize> {
        let boards = self.get_boards().await;
        if boards.is_empty() {
            return Ok(0);
        }
        self.db
            .with_db(|db| SqliteStateRepository::new(db.connection()).set_json(key, &boards))
            .await?;
        tracing::info!(count = boards.len(), key, "Backed up local boards");
        Ok(boards.len())
    }

    /// Boards previously saved with [`Self::backup_boards`].
    pub async fn read_backup(&self, key: &str) -> Result<Vec<Board>> {
        let boards: Option<Vec<Board>> = self
            .db
            .with_db(|db| SqliteStateRepository::new(db.connection()).get_json(key))
            .await?;
        Ok(boards.unwrap_or_default())
    }

    /// User whose boards are cached, `None` while the cache holds anonymous boards.
    pub async fn cache_owner(&self) -> Result<Option<String>> {
        self.db
            .with_db(|db| SqliteStateRepository::new(db.connection()).cache_owner())
            .await
    }

    pub async fn set_cache_owner(&self, owner: Option<&str>) -> Result<()> {
        self.db
            .with_db(|db| SqliteStateRepository::new(db.connection()).set_cache_owner(owner))
            .await
    }

    pub async fn current_board_id(&self) -> Option<BoardId> {
        self.cache.lock().await.current_board.clone()
    }

    pub async fn set_current_board_id(&self, id: Option<&BoardId>) {
        let mut cache = self.cache.lock().await;
        cache.current_board = id.cloned();
        let written = self
            .persist("set current board", |db| {
                SqliteStateRepository::new(db.connection()).set_current_board_id(id)
            })
            .await;
        cache.state_dirty |= !written;
    }

    pub async fn save_board_files(&self, id: &BoardId, files: &[BoardFile]) {
        if files.is_empty() {
            return;
        }
        let mut cache = self.cache.lock().await;
        let written = self
            .persist("save board files", |db| {
                SqliteBoardRepository::new(db.connection()).save_files(id, files)
            })
            .await;
        if !written {
            let pending = cache.unsaved_files.entry(id.clone()).or_default();
            for file in files {
                pending.retain(|existing| existing.id != file.id);
                pending.push(file.clone());
            }
        }
    }

    pub async fn get_board_files(&self, id: &BoardId) -> Result<Vec<BoardFile>> {
        let cache = self.cache.lock().await;
        let mut files = self
            .db
            .with_db(|db| SqliteBoardRepository::new(db.connection()).get_files(id))
            .await?;
        if let Some(pending) = cache.unsaved_files.get(id) {
            files.retain(|file| !pending.iter().any(|unsaved| unsaved.id == file.id));
            files.extend(pending.iter().cloned());
        }
        Ok(files)
    }

    /// Whether some edit exists only in memory.
    pub async fn has_unsaved_changes(&self) -> bool {
        self.cache.lock().await.has_unsaved_work()
    }

    /// Write everything still held only in memory and checkpoint the database.
    ///
    /// Must run before the process exits.
    pub async fn flush_save(&self) -> Result<()> {
        let mut cache = self.cache.lock().await;
        if cache.has_unsaved_work() {
            let boards = cache.boards.clone();
            let deleted_ids = cache.deleted_ids.clone();
            let current = cache.current_board.clone();
            let unsaved_deletes: Vec<BoardId> = cache.unsaved_deletes.iter().cloned().collect();
            let unsaved_content = cache.unsaved_content.clone();
            let unsaved_files = cache.unsaved_files.clone();

            self.db
                .with_db(|db| {
                    let conn = db.connection();
                    let repo = SqliteBoardRepository::new(conn);
                    for id in &unsaved_deletes {
                        repo.delete(id)?;
                    }
                    repo.replace_all(&boards)?;
                    for (id, content) in &unsaved_content {
                        repo.save_content(id, content)?;
                    }
                    for (id, files) in &unsaved_files {
                        repo.save_files(id, files)?;
                    }
                    let state = SqliteStateRepository::new(conn);
                    state.set_deleted_board_ids(&deleted_ids)?;
                    state.set_current_board_id(current.as_ref())
                })
                .await?;

            let recovered = unsaved_content.len() + unsaved_files.len() + unsaved_deletes.len();
            cache.unsaved_content.clear();
            cache.unsaved_files.clear();
            cache.unsaved_deletes.clear();
            cache.boards_dirty = false;
            cache.state_dirty = false;
            tracing::info!(recovered, "Flushed unsaved local changes");
        }
        self.db.checkpoint().await
    }

    /// Run a write and report whether it reached the database.
    async fn persist(&self, action: &str, write: impl FnOnce(&Database) -> Result<()>) -> bool {
        match self.db.with_db(write).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(action, %error, "Local write failed; keeping change in memory");
                false
            }
        }
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("LocalStore")
            .field("path", &self.db.path())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    fn drawing() -> BoardContent {
        BoardContent::new(
            vec![json!({"id": "el-1", "type": "rectangle"})],
            json!({"viewBackgroundColor": "#ffffff"})
                .as_object()
                .cloned()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn empty_store_has_no_boards() {
        let store = LocalStore::in_memory().await.unwrap();
        assert!(store.get_boards().await.is_empty());
        assert!(store.current_board_id().await.is_none());
    }

    #[tokio::test]
    async fn create_board_uses_temporary_id() {
        let store = LocalStore::in_memory().await.unwrap();
        let id = store.create_board("Sprint Plan").await;

        assert!(id.is_temporary());
        let board = store.get_board(&id).await.unwrap();
        assert_eq!(board.name, "Sprint Plan");
        assert_eq!(board.created_at, board.last_modified);
    }

    #[tokio::test]
    async fn create_with_id_is_idempotent() {
        let store = LocalStore::in_memory().await.unwrap();
        let id = BoardId::from("brd_1");

        store.create_board_with_id(&id, "First").await;
        let second = store.create_board_with_id(&id, "Second").await;

        assert_eq!(second.name, "First");
        assert_eq!(store.get_boards().await.len(), 1);
    }

    #[tokio::test]
    async fn update_missing_board_is_a_no_op() {
        let store = LocalStore::in_memory().await.unwrap();
        let updated = store
            .update_board(&BoardId::from("missing"), &BoardPatch::rename("x"))
            .await;
        assert!(updated.is_none());
        assert!(store.get_boards().await.is_empty());
    }

    #[tokio::test]
    async fn update_board_merges_fields() {
        let store = LocalStore::in_memory().await.unwrap();
        let id = store.create_board("Old").await;

        store.update_board(&id, &BoardPatch::rename("New")).await;
        let board = store
            .update_board(&id, &BoardPatch::thumbnail("data:image/png;base64,AAA"))
            .await
            .unwrap();

        assert_eq!(board.name, "New");
        assert_eq!(board.thumbnail.as_deref(), Some("data:image/png;base64,AAA"));
    }

    #[tokio::test]
    async fn content_defaults_to_empty() {
        let store = LocalStore::in_memory().await.unwrap();
        let content = store
            .get_board_content(&BoardId::from("never-saved"))
            .await
            .unwrap();
        assert!(content.is_empty());
        assert_eq!(content.version, 0);
    }

    #[tokio::test]
    async fn save_content_bumps_version_and_board() {
        let store = LocalStore::in_memory().await.unwrap();
        let id = store.create_board("Board").await;
        let before = store.get_board(&id).await.unwrap().last_modified;

        let first = store.save_board_content(&id, drawing()).await.unwrap();
        let second = store.save_board_content(&id, drawing()).await.unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(second.checksum, drawing().compute_checksum().ok());
        assert!(store.get_board(&id).await.unwrap().last_modified >= before);
        assert_eq!(store.get_board_content(&id).await.unwrap(), second);
    }

    #[tokio::test]
    async fn delete_removes_content_and_files_and_records_tombstone() {
        let store = LocalStore::in_memory().await.unwrap();
        let id = BoardId::from("brd_1");
        store.create_board_with_id(&id, "Board").await;
        store.save_board_content(&id, drawing()).await.unwrap();
        store
            .save_board_files(
                &id,
                &[BoardFile {
                    id: "file-1".into(),
                    mime_type: "image/png".into(),
                    data_url: "data:image/png;base64,AAA".into(),
                    created_at: 1,
                }],
            )
            .await;
        store.set_current_board_id(Some(&id)).await;

        store.delete_board(&id).await;

        assert!(store.get_board(&id).await.is_none());
        assert!(store.get_board_content(&id).await.unwrap().is_empty());
        assert!(store.get_board_files(&id).await.unwrap().is_empty());
        assert!(store.current_board_id().await.is_none());
        assert_eq!(store.deleted_board_ids().await, vec!["brd_1"]);

        store.clear_deleted_board_ids().await;
        assert!(store.deleted_board_ids().await.is_empty());
    }

    #[tokio::test]
    async fn pending_delete_flag_roundtrip() {
        let store = LocalStore::in_memory().await.unwrap();
        let id = store.create_board("Board").await;

        store.mark_board_pending_delete(&id).await;
        assert!(store.get_board(&id).await.unwrap().pending_delete);

        store.clear_pending_delete(&id).await;
        assert!(!store.get_board(&id).await.unwrap().pending_delete);
    }

    #[tokio::test]
    async fn rename_moves_content_and_current_pointer() {
        let store = LocalStore::in_memory().await.unwrap();
        let old = store.create_board("Sprint Plan").await;
        store.save_board_content(&old, drawing()).await.unwrap();
        store.set_current_board_id(Some(&old)).await;

        let new = BoardId::from("brd_123");
        store.rename_board_id(&old, &new).await;

        assert!(store.get_board(&old).await.is_none());
        let board = store.get_board(&new).await.unwrap();
        assert_eq!(board.cloud_id.as_deref(), Some("brd_123"));
        assert_eq!(
            store.get_board_content(&new).await.unwrap().elements,
            drawing().elements
        );
        assert_eq!(store.current_board_id().await, Some(new));
    }

    #[tokio::test]
    async fn rename_onto_cached_board_keeps_the_local_drawing() {
        let store = LocalStore::in_memory().await.unwrap();
        let old = store.create_board("Sprint Plan").await;
        store.save_board_content(&old, drawing()).await.unwrap();
        let new = BoardId::from("brd_2");
        store
            .upsert_board(Board::new(new.clone(), "Sprint Plan"))
            .await;

        store.rename_board_id(&old, &new).await;

        let boards = store.get_boards().await;
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].id, new);
        assert_eq!(
            store.get_board_content(&new).await.unwrap().elements,
            drawing().elements
        );
        assert!(store.get_board_content(&old).await.unwrap().is_empty());
        assert!(!store.has_unsaved_changes().await);
    }

    #[tokio::test]
    async fn clear_cache_forgets_everything_but_tombstones() {
        let store = LocalStore::in_memory().await.unwrap();
        let id = store.create_board("Board").await;
        store.save_board_content(&id, drawing()).await.unwrap();
        store.set_current_board_id(Some(&id)).await;
        store.delete_board(&store.create_board("Gone").await).await;

        store.clear_cache().await;

        assert!(store.get_boards().await.is_empty());
        assert!(store.get_board_content(&id).await.unwrap().is_empty());
        assert!(store.current_board_id().await.is_none());
        assert_eq!(store.deleted_board_ids().await.len(), 1);
    }

    #[tokio::test]
    async fn update_board_cache_replaces_list() {
        let store = LocalStore::in_memory().await.unwrap();
        store.create_board("Local").await;

        let remote = vec![
            Board::new(BoardId::from("brd_1"), "One"),
            Board::new(BoardId::from("brd_2"), "Two"),
        ];
        store.update_board_cache(remote.clone()).await;

        assert_eq!(store.get_boards().await, remote);
    }

    #[tokio::test]
    async fn backup_boards_copies_list() {
        let store = LocalStore::in_memory().await.unwrap();
        store.create_board("Anonymous sketch").await;

        let saved = store
            .backup_boards(crate::db::ANONYMOUS_BACKUP_KEY)
            .await
            .unwrap();
        store.clear_cache().await;

        assert_eq!(saved, 1);
        let backup = store
            .read_backup(crate::db::ANONYMOUS_BACKUP_KEY)
            .await
            .unwrap();
        assert_eq!(backup[0].name, "Anonymous sketch");
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("boards.db");

        let id = {
            let store = LocalStore::open(DatabaseService::open_path(&path).unwrap())
                .await
                .unwrap();
            let id = store.create_board("Durable").await;
            store.save_board_content(&id, drawing()).await.unwrap();
            store.set_current_board_id(Some(&id)).await;
            store.flush_save().await.unwrap();
            id
        };

        let store = LocalStore::open(DatabaseService::open_path(&path).unwrap())
            .await
            .unwrap();
        assert_eq!(store.get_board(&id).await.unwrap().name, "Durable");
        assert_eq!(store.get_board_content(&id).await.unwrap().version, 1);
        assert_eq!(store.current_board_id().await, Some(id));
        assert!(!store.has_unsaved_changes().await);
    }
}
