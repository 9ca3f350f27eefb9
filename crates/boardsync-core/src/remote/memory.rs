//! In-process remote service for tests, demos and offline development.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{RemoteApi, RemoteBoard};
use crate::error::{Error, Result};
use crate::models::{BoardPatch, EncryptedContent, Workspace};
use crate::util::now_millis;

/// Failure the in-memory service can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFailure {
    /// Connection refused
    Unreachable,
    /// Token not accepted yet
    Unauthorized,
    /// Payload too large
    Rejected,
}

impl RemoteFailure {
    fn into_error(self, operation: &str) -> Error {
        match self {
            Self::Unreachable => Error::Network(format!("{operation}: connection refused")),
            Self::Unauthorized => Error::Unauthorized(format!("{operation}: token not valid")),
            Self::Rejected => Error::Rejected(format!("{operation}: payload too large")),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    workspaces: Vec<Workspace>,
    boards: Vec<RemoteBoard>,
    contents: HashMap<String, EncryptedContent>,
    idempotency: HashMap<String, String>,
    next_id: u64,
    reachable: bool,
    failures: VecDeque<RemoteFailure>,
    calls: Vec<String>,
}

impl MemoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{}", self.next_id)
    }

    fn board_mut(&mut self, board_id: &str) -> Result<&mut RemoteBoard> {
        self.boards
            .iter_mut()
            .find(|board| board.id == board_id && !board.archived)
            .ok_or_else(|| Error::NotFound(board_id.to_string()))
    }
}

/// A remote service held in memory. Clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryRemoteApi {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryRemoteApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteApi {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                reachable: true,
                ..MemoryState::default()
            })),
        }
    }

    /// Simulate the network going away (every call fails as unreachable).
    pub fn set_reachable(&self, reachable: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.reachable = reachable;
        }
    }

    /// Make the next `count` calls fail with `failure`.
    pub fn fail_next(&self, count: usize, failure: RemoteFailure) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.extend(std::iter::repeat(failure).take(count));
        }
    }

    /// Names of the calls that reached the service, failed ones included.
    pub fn calls(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    /// Count of calls whose name starts with `operation`.
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(operation))
            .count()
    }

    /// Every board, archived ones included.
    pub fn boards(&self) -> Vec<RemoteBoard> {
        self.state
            .lock()
            .map(|state| state.boards.clone())
            .unwrap_or_default()
    }

    /// Raw stored content, as the service sees it.
    pub fn stored_content(&self, board_id: &str) -> Option<EncryptedContent> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.contents.get(board_id).cloned())
    }

    /// Lock the state and record the call, or fail it as configured.
    fn begin(&self, operation: String) -> Result<MutexGuard<'_, MemoryState>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Database("in-memory remote lock poisoned".to_string()))?;
        state.calls.push(operation.clone());
        if !state.reachable {
            return Err(RemoteFailure::Unreachable.into_error(&operation));
        }
        if let Some(failure) = state.failures.pop_front() {
            return Err(failure.into_error(&operation));
        }
        Ok(state)
    }
}

#[async_trait]
impl RemoteApi for MemoryRemoteApi {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        let state = self.begin("list_workspaces".to_string())?;
        Ok(state.workspaces.clone())
    }

    async fn ensure_default_workspace(&self) -> Result<Workspace> {
        let mut state = self.begin("ensure_default_workspace".to_string())?;
        if let Some(existing) = state.workspaces.iter().find(|ws| ws.is_default) {
            return Ok(existing.clone());
        }
        let workspace = Workspace {
            id: state.next_id("ws"),
            name: "My Boards".to_string(),
            is_default: true,
            created_at: now_millis(),
        };
        state.workspaces.push(workspace.clone());
        Ok(workspace)
    }

    async fn list_boards(&self, workspace_id: &str) -> Result<Vec<RemoteBoard>> {
        let state = self.begin(format!("list_boards:{workspace_id}"))?;
        Ok(state
            .boards
            .iter()
            .filter(|board| board.workspace_id == workspace_id && !board.archived)
            .cloned()
            .collect())
    }

    async fn create_board(
        &self,
        workspace_id: &str,
        name: &str,
        idempotency_key: Option<&str>,
    ) -> Result<RemoteBoard> {
        let mut state = self.begin(format!("create_board:{name}"))?;
        if !state.workspaces.iter().any(|ws| ws.id == workspace_id) {
            return Err(Error::NotFound(format!("workspace {workspace_id}")));
        }
        if let Some(key) = idempotency_key {
            if let Some(existing_id) = state.idempotency.get(key).cloned() {
                if let Some(existing) = state.boards.iter().find(|b| b.id == existing_id) {
                    return Ok(existing.clone());
                }
            }
        }

        let now = now_millis();
        let board = RemoteBoard {
            id: state.next_id("brd"),
            workspace_id: workspace_id.to_string(),
            name: name.to_string(),
            thumbnail: None,
            created_at: now,
            updated_at: now,
            archived: false,
        };
        if let Some(key) = idempotency_key {
            state.idempotency.insert(key.to_string(), board.id.clone());
        }
        state.boards.push(board.clone());
        Ok(board)
    }

    async fn update_board(&self, board_id: &str, patch: &BoardPatch) -> Result<()> {
        let mut state = self.begin(format!("update_board:{board_id}"))?;
        let board = state.board_mut(board_id)?;
        if let Some(name) = &patch.name {
            board.name.clone_from(name);
        }
        if let Some(thumbnail) = &patch.thumbnail {
            board.thumbnail = Some(thumbnail.clone());
        }
        board.updated_at = now_millis().max(board.updated_at);
        Ok(())
    }

    async fn archive_board(&self, board_id: &str) -> Result<()> {
        let mut state = self.begin(format!("archive_board:{board_id}"))?;
        let board = state.board_mut(board_id)?;
        board.archived = true;
        board.updated_at = now_millis().max(board.updated_at);
        Ok(())
    }

    async fn get_content(&self, board_id: &str) -> Result<Option<EncryptedContent>> {
        let state = self.begin(format!("get_content:{board_id}"))?;
        Ok(state.contents.get(board_id).cloned())
    }

    async fn save_content(&self, board_id: &str, content: &EncryptedContent) -> Result<()> {
        let mut state = self.begin(format!("save_content:{board_id}"))?;
        state.board_mut(board_id)?;
        state.contents.insert(board_id.to_string(), content.clone());
        Ok(())
    }
}
