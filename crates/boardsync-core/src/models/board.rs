//! Board model

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::util::{next_timestamp, now_millis};

/// Prefix of client-generated ids that the remote has not confirmed yet.
pub const TEMP_ID_PREFIX: &str = "local_";

/// Identifier of a board.
///
/// Either a temporary `local_<uuid>` id generated while offline or the id
/// assigned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(String);

impl BoardId {
    /// Generate a new temporary id.
    #[must_use]
    pub fn new_local() -> Self {
        Self(format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4()))
    }

    /// Whether this id was generated on the device and not yet replaced.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BoardId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for BoardId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identity and metadata of one whiteboard document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: BoardId,
    /// Remote id once known; set on boards that started with a temporary id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_id: Option<String>,
    pub name: String,
    /// Opaque preview produced by the canvas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last mutation timestamp (Unix ms)
    pub last_modified: i64,
    /// Deletion is waiting in the offline queue
    #[serde(default)]
    pub pending_delete: bool,
}

impl Board {
    /// Create a board with the given id and name, stamped now.
    #[must_use]
    pub fn new(id: BoardId, name: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id,
            cloud_id: None,
            name: name.into(),
            thumbnail: None,
            created_at: now,
            last_modified: now,
            pending_delete: false,
        }
    }

    /// Apply a patch and bump `last_modified`.
    pub fn apply(&mut self, patch: &BoardPatch) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(thumbnail) = &patch.thumbnail {
            self.thumbnail = Some(thumbnail.clone());
        }
        self.touch();
    }

    /// Bump `last_modified` without moving it backwards.
    pub fn touch(&mut self) {
        self.last_modified = next_timestamp(self.last_modified);
    }

    /// Whether `id` names this board, either directly or through its remote id.
    #[must_use]
    pub fn matches(&self, id: &str) -> bool {
        self.id.as_str() == id || self.cloud_id.as_deref() == Some(id)
    }
}

/// The fields of a [`Board`] a caller may change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl BoardPatch {
    #[must_use]
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn thumbnail(thumbnail: impl Into<String>) -> Self {
        Self {
            thumbnail: Some(thumbnail.into()),
            ..Self::default()
        }
    }

    /// Fold a later patch over this one; fields set in `later` win.
    #[must_use]
    pub fn merge(mut self, later: Self) -> Self {
        if later.name.is_some() {
            self.name = later.name;
        }
        if later.thumbnail.is_some() {
            self.thumbnail = later.thumbnail;
        }
        self
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.thumbnail.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn local_ids_are_temporary_and_unique() {
        let first = BoardId::new_local();
        let second = BoardId::new_local();
        assert!(first.is_temporary());
        assert_ne!(first, second);
        assert!(!BoardId::from("brd_123").is_temporary());
    }

    #[test]
    fn new_board_starts_with_equal_timestamps() {
        let board = Board::new(BoardId::from("brd_1"), "Sprint Plan");
        assert_eq!(board.name, "Sprint Plan");
        assert_eq!(board.created_at, board.last_modified);
        assert!(!board.pending_delete);
    }

    #[test]
    fn apply_patch_updates_fields_and_never_rewinds_clock() {
        let mut board = Board::new(BoardId::from("brd_1"), "Old");
        board.last_modified = i64::MAX - 1;
        board.apply(&BoardPatch::rename("New"));
        assert_eq!(board.name, "New");
        assert_eq!(board.last_modified, i64::MAX - 1);
    }

    #[test]
    fn merge_keeps_fields_from_both_patches() {
        let merged = BoardPatch::rename("Roadmap").merge(BoardPatch::thumbnail("data:image/png"));
        assert_eq!(
            merged,
            BoardPatch {
                name: Some("Roadmap".to_string()),
                thumbnail: Some("data:image/png".to_string()),
            }
        );
    }

    #[test]
    fn merge_prefers_later_values() {
        let merged = BoardPatch::rename("First").merge(BoardPatch::rename("Second"));
        assert_eq!(merged.name.as_deref(), Some("Second"));
    }

    #[test]
    fn matches_by_cloud_id() {
        let mut board = Board::new(BoardId::from("local_abc"), "Draft");
        board.cloud_id = Some("brd_9".to_string());
        assert!(board.matches("local_abc"));
        assert!(board.matches("brd_9"));
        assert!(!board.matches("brd_10"));
    }
}
