use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] boardsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Board name cannot be empty")]
    EmptyBoardName,
    #[error("Board ID cannot be empty")]
    EmptyBoardId,
    #[error("No scene JSON provided")]
    EmptyInput,
    #[error("Board not found for id/prefix: {0}")]
    BoardNotFound(String),
    #[error("{0}")]
    AmbiguousBoardId(String),
    #[error("`{0}` needs a signed-in user. Pass --user or set BOARDSYNC_USER_ID.")]
    UserRequired(&'static str),
    #[error("Cloud sync is not configured. Pass --remote-url or set BOARDSYNC_REMOTE_URL.")]
    RemoteNotConfigured,
}
