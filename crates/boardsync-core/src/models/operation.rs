//! Queued offline mutation model

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{BoardId, BoardPatch};
use crate::util::now_millis;

/// Kind of entity a queued operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Board,
}

impl EntityType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Board => "board",
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "board" => Ok(Self::Board),
            other => Err(format!("unknown entity type '{other}'")),
        }
    }
}

/// `create`, `update` or `delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(label)
    }
}

/// Operation-specific data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OperationPayload {
    CreateBoard { name: String },
    UpdateBoard(BoardPatch),
    DeleteBoard,
}

impl OperationPayload {
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::CreateBoard { .. } => OperationKind::Create,
            Self::UpdateBoard(_) => OperationKind::Update,
            Self::DeleteBoard => OperationKind::Delete,
        }
    }
}

/// One durable pending mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedOperation {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub payload: OperationPayload,
    /// Enqueue time (Unix ms)
    pub timestamp: i64,
    pub retry_count: u32,
    /// Stable across retries so the remote can de-duplicate creates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl QueuedOperation {
    /// Queue a board creation under a (usually temporary) id.
    #[must_use]
    pub fn create_board(board_id: &BoardId, name: impl Into<String>) -> Self {
        Self::new(
            board_id,
            OperationPayload::CreateBoard { name: name.into() },
        )
        .with_idempotency_key(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn update_board(board_id: &BoardId, patch: BoardPatch) -> Self {
        Self::new(board_id, OperationPayload::UpdateBoard(patch))
    }

    #[must_use]
    pub fn delete_board(board_id: &BoardId) -> Self {
        Self::new(board_id, OperationPayload::DeleteBoard)
    }

    fn new(board_id: &BoardId, payload: OperationPayload) -> Self {
        Self {
            id: Uuid::now_v7(),
            entity_type: EntityType::Board,
            entity_id: board_id.to_string(),
            payload,
            timestamp: now_millis(),
            retry_count: 0,
            idempotency_key: None,
        }
    }

    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.payload.kind()
    }

    /// Whether this operation targets the given entity.
    #[must_use]
    pub fn targets(&self, entity_type: EntityType, entity_id: &str) -> bool {
        self.entity_type == entity_type && self.entity_id == entity_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_carries_idempotency_key() {
        let op = QueuedOperation::create_board(&BoardId::from("local_abc"), "Sprint Plan");
        assert_eq!(op.kind(), OperationKind::Create);
        assert!(op.idempotency_key.is_some());
        assert_eq!(op.retry_count, 0);
    }

    #[test]
    fn update_and_delete_have_no_idempotency_key() {
        let id = BoardId::from("brd_1");
        assert!(QueuedOperation::update_board(&id, BoardPatch::rename("x"))
            .idempotency_key
            .is_none());
        assert_eq!(
            QueuedOperation::delete_board(&id).kind(),
            OperationKind::Delete
        );
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = OperationPayload::UpdateBoard(BoardPatch::rename("Roadmap"));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "updateBoard");
        assert_eq!(json["name"], "Roadmap");
        let back: OperationPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn operation_ids_sort_by_creation() {
        let id = BoardId::from("brd_1");
        let first = QueuedOperation::delete_board(&id);
        let second = QueuedOperation::delete_board(&id);
        assert!(first.id < second.id);
    }
}
