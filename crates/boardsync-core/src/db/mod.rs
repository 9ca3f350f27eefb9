//! Database layer for boardsync

mod connection;
mod migrations;
mod queue_repository;
mod repository;
mod state_repository;

pub use connection::Database;
pub use queue_repository::{QueueRepository, SqliteQueueRepository};
pub use repository::{BoardRepository, SqliteBoardRepository};
pub use state_repository::{SqliteStateRepository, StateRepository, ANONYMOUS_BACKUP_KEY};
