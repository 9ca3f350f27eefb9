//! Data models for boardsync

mod board;
mod content;
mod operation;
mod workspace;

pub use board::{Board, BoardId, BoardPatch, TEMP_ID_PREFIX};
pub use content::{BoardContent, BoardData, BoardFile, EncryptedContent};
pub use operation::{EntityType, OperationKind, OperationPayload, QueuedOperation};
pub use workspace::Workspace;
