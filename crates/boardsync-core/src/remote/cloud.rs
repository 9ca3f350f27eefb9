//! Encrypted board storage for one signed-in user.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::RemoteApi;
use crate::context::SyncContext;
use crate::crypto::{self, ContentKey};
use crate::error::{Error, Result};
use crate::models::{Board, BoardContent, BoardId, BoardPatch, EncryptedContent, Workspace};
use crate::util::now_millis;

/// Remote store adapter: derives the user's key, encrypts content on the way
/// out, verifies it on the way in and scopes board calls to a workspace.
pub struct CloudStore {
    user_id: String,
    api: Arc<dyn RemoteApi>,
    ctx: SyncContext,
    workspace_id: Mutex<Option<String>>,
    /// Last remote version seen per board, used to keep versions increasing
    versions: Mutex<HashMap<String, u64>>,
}

impl std::fmt::Debug for CloudStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("CloudStore")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl CloudStore {
    pub fn new(user_id: impl Into<String>, api: Arc<dyn RemoteApi>, ctx: SyncContext) -> Result<Self> {
        let user_id = user_id.into().trim().to_string();
        if user_id.is_empty() {
            return Err(Error::InvalidInput("user id must not be empty".to_string()));
        }
        Ok(Self {
            user_id,
            api,
            ctx,
            workspace_id: Mutex::new(None),
            versions: Mutex::new(HashMap::new()),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn key(&self) -> Result<Arc<ContentKey>> {
        self.ctx
            .keys
            .key_for(&self.user_id, &self.ctx.settings.key_salt)
    }

    /// Get-or-create the default workspace and select it.
    pub async fn ensure_default_workspace(&self) -> Result<String> {
        let mut selected = self.workspace_id.lock().await;
        if let Some(id) = selected.as_ref() {
            return Ok(id.clone());
        }
        let workspace = self.api.ensure_default_workspace().await?;
        tracing::info!(workspace_id = %workspace.id, "Using default workspace");
        *selected = Some(workspace.id.clone());
        Ok(workspace.id)
    }

    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        self.api.list_workspaces().await
    }

    pub async fn select_workspace(&self, workspace_id: impl Into<String>) {
        *self.workspace_id.lock().await = Some(workspace_id.into());
    }

    pub async fn workspace_id(&self) -> Option<String> {
        self.workspace_id.lock().await.clone()
    }

    async fn require_workspace(&self) -> Result<String> {
        self.workspace_id().await.ok_or(Error::NoWorkspace)
    }

    /// Live (non-archived) boards of the selected workspace.
    pub async fn get_boards(&self) -> Result<Vec<Board>> {
        let workspace_id = self.require_workspace().await?;
        let boards = self.api.list_boards(&workspace_id).await?;
        Ok(boards
            .into_iter()
            .filter(|board| !board.archived)
            .map(Board::from)
            .collect())
    }

    pub async fn create_board(&self, name: &str) -> Result<Board> {
        let workspace_id = self.require_workspace().await?;
        let created = self.api.create_board(&workspace_id, name, None).await?;
        Ok(created.into())
    }

    /// Create a board requested under `requested` (usually a temporary id).
    ///
    /// The remote assigns the id; the returned board carries it.
    pub async fn create_board_with_id(
        &self,
        requested: &BoardId,
        name: &str,
        idempotency_key: Option<&str>,
    ) -> Result<Board> {
        let workspace_id = self.require_workspace().await?;
        let created = self
            .api
            .create_board(&workspace_id, name, idempotency_key)
            .await?;
        if created.id != requested.as_str() {
            tracing::debug!(requested = %requested, assigned = %created.id, "Remote assigned board id");
        }
        Ok(created.into())
    }

    pub async fn update_board(&self, id: &BoardId, patch: &BoardPatch) -> Result<()> {
        self.require_workspace().await?;
        self.api.update_board(id.as_str(), patch).await
    }

    /// Archive a board.
    pub async fn delete_board(&self, id: &BoardId) -> Result<()> {
        self.require_workspace().await?;
        self.api.archive_board(id.as_str()).await?;
        self.versions.lock().await.remove(id.as_str());
        Ok(())
    }

    /// Fetch and decrypt a board's content, `None` if it was never saved remotely.
    pub async fn get_board_content(&self, id: &BoardId) -> Result<Option<BoardContent>> {
        self.require_workspace().await?;
        let Some(encrypted) = self.api.get_content(id.as_str()).await? else {
            return Ok(None);
        };
        let content = self.decrypt_content(&encrypted)?;
        self.remember_version(id, encrypted.version).await;
        Ok(Some(content))
    }

    /// Encrypt and write a board's content; returns the version written.
    pub async fn save_board_content(&self, id: &BoardId, content: &BoardContent) -> Result<u64> {
        self.require_workspace().await?;
        let known = self
            .versions
            .lock()
            .await
            .get(id.as_str())
            .copied()
            .unwrap_or_default();
        let version = known.max(content.version) + 1;

        let encrypted = self.encrypt_content(content, version)?;
        self.api.save_content(id.as_str(), &encrypted).await?;
        self.remember_version(id, version).await;
        tracing::debug!(board_id = %id, version, "Pushed board content");
        Ok(version)
    }

    /// Seal content for the wire.
    pub fn encrypt_content(&self, content: &BoardContent, version: u64) -> Result<EncryptedContent> {
        let key = self.key()?;
        let plaintext = content.payload_bytes()?;
        let (ciphertext, iv) = crypto::encrypt(&plaintext, &key)?;
        Ok(EncryptedContent {
            ciphertext,
            iv,
            version,
            checksum: content.compute_checksum()?,
            updated_at: now_millis(),
            updated_by: self.user_id.clone(),
        })
    }

    /// Open content from the wire and check it against its checksum.
    pub fn decrypt_content(&self, encrypted: &EncryptedContent) -> Result<BoardContent> {
        let key = self.key()?;
        let plaintext = crypto::decrypt(&encrypted.ciphertext, &encrypted.iv, &key)?;
        let mut content = BoardContent::from_payload_bytes(&plaintext)?;
        let checksum = content.compute_checksum()?;
        if checksum != encrypted.checksum {
            return Err(Error::Encryption(format!(
                "checksum mismatch: stored {}, computed {checksum}",
                encrypted.checksum
            )));
        }
        content.version = encrypted.version;
        content.checksum = Some(checksum);
        Ok(content)
    }

    async fn remember_version(&self, id: &BoardId, version: u64) {
        let mut versions = self.versions.lock().await;
        let entry = versions.entry(id.to_string()).or_default();
        *entry = (*entry).max(version);
    }
}
