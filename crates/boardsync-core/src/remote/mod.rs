//! Remote store: the encrypted record of truth behind an RPC surface.
//!
//! [`RemoteApi`] is the black-box service (`query`/`mutation` calls keyed by
//! workspace or board id). [`CloudStore`] layers key derivation, encryption,
//! checksums and workspace selection on top of it.

mod cloud;
mod http;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Board, BoardId, BoardPatch, EncryptedContent, Workspace};

pub use cloud::CloudStore;
pub use http::HttpRemoteApi;
pub use memory::{MemoryRemoteApi, RemoteFailure};

/// Board metadata as the remote service stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBoard {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Archived boards are hidden but recoverable
    #[serde(default)]
    pub archived: bool,
}

impl From<RemoteBoard> for Board {
    fn from(remote: RemoteBoard) -> Self {
        Self {
            id: BoardId::from(remote.id.clone()),
            cloud_id: Some(remote.id),
            name: remote.name,
            thumbnail: remote.thumbnail,
            created_at: remote.created_at,
            last_modified: remote.updated_at,
            pending_delete: false,
        }
    }
}

/// The remote RPC surface. Content only ever crosses it encrypted.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>>;

    /// Get-or-create the caller's default workspace.
    async fn ensure_default_workspace(&self) -> Result<Workspace>;

    async fn list_boards(&self, workspace_id: &str) -> Result<Vec<RemoteBoard>>;

    /// Create a board. A repeated `idempotency_key` returns the board created the first time.
    async fn create_board(
        &self,
        workspace_id: &str,
        name: &str,
        idempotency_key: Option<&str>,
    ) -> Result<RemoteBoard>;

    async fn update_board(&self, board_id: &str, patch: &BoardPatch) -> Result<()>;

    /// Hide a board without destroying it.
    async fn archive_board(&self, board_id: &str) -> Result<()>;

    async fn get_content(&self, board_id: &str) -> Result<Option<EncryptedContent>>;

    async fn save_content(&self, board_id: &str, content: &EncryptedContent) -> Result<()>;
}
