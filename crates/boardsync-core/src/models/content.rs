//! Board content and its encrypted envelope

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Board;
use crate::crypto;
use crate::error::Result;

/// The drawing payload a board owns. Opaque to the sync layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardContent {
    #[serde(default)]
    pub elements: Vec<Value>,
    #[serde(default)]
    pub app_state: Map<String, Value>,
    /// Incremented on every save
    #[serde(default)]
    pub version: u64,
    /// SHA-256 hex of `{elements, appState}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl BoardContent {
    #[must_use]
    pub const fn new(elements: Vec<Value>, app_state: Map<String, Value>) -> Self {
        Self {
            elements,
            app_state,
            version: 0,
            checksum: None,
        }
    }

    /// Nothing has been drawn and no view state recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.app_state.is_empty()
    }

    /// Checksum over the drawing payload only, independent of `version`.
    pub fn compute_checksum(&self) -> Result<String> {
        crypto::content_checksum(&self.elements, &self.app_state)
    }

    /// Recompute the checksum and store it on the content.
    pub fn seal(&mut self) -> Result<()> {
        self.checksum = Some(self.compute_checksum()?);
        Ok(())
    }

    /// Serialize the drawing payload for encryption.
    pub(crate) fn payload_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&ContentPayload {
            elements: &self.elements,
            app_state: &self.app_state,
        })?)
    }

    pub(crate) fn from_payload_bytes(bytes: &[u8]) -> Result<Self> {
        let payload: OwnedContentPayload = serde_json::from_slice(bytes)?;
        Ok(Self::new(payload.elements, payload.app_state))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentPayload<'a> {
    elements: &'a [Value],
    app_state: &'a Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnedContentPayload {
    #[serde(default)]
    elements: Vec<Value>,
    #[serde(default)]
    app_state: Map<String, Value>,
}

/// Board content as the remote store keeps it. Never carries plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedContent {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub version: u64,
    pub checksum: String,
    pub updated_at: i64,
    pub updated_by: String,
}

/// A binary file placed on the canvas (image, embed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardFile {
    pub id: String,
    pub mime_type: String,
    pub data_url: String,
    pub created_at: i64,
}

/// Everything the editor needs to open a board.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardData {
    pub board: Board,
    pub content: BoardContent,
    pub files: Vec<BoardFile>,
}
