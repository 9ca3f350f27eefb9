//! Local key/value state repository implementation

use crate::error::Result;
use crate::models::BoardId;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

const KEY_CURRENT_BOARD: &str = "current_board_id";
const KEY_DELETED_BOARDS: &str = "deleted_board_ids";
const KEY_CACHE_OWNER: &str = "cache_owner";

/// Reserved key under which the anonymous board list is kept on login
pub const ANONYMOUS_BACKUP_KEY: &str = "backup:anonymous_boards";

/// Trait for small pieces of persisted client state
pub trait StateRepository {
    /// Read a raw value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a raw value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value
    fn remove(&self, key: &str) -> Result<()>;

    /// Read a JSON value
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(Into::into)
    }

    /// Write a JSON value
    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, &serde_json::to_string(value)?)
    }

    /// Board the editor last had open
    fn current_board_id(&self) -> Result<Option<BoardId>> {
        Ok(self.get(KEY_CURRENT_BOARD)?.map(BoardId::from))
    }

    fn set_current_board_id(&self, id: Option<&BoardId>) -> Result<()> {
        match id {
            Some(id) => self.set(KEY_CURRENT_BOARD, id.as_str()),
            None => self.remove(KEY_CURRENT_BOARD),
        }
    }

    /// Tombstones of boards deleted on this device
    fn deleted_board_ids(&self) -> Result<Vec<String>> {
        Ok(self.get_json(KEY_DELETED_BOARDS)?.unwrap_or_default())
    }

    fn set_deleted_board_ids(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            self.remove(KEY_DELETED_BOARDS)
        } else {
            self.set_json(KEY_DELETED_BOARDS, ids)
        }
    }

    /// User whose boards the cache currently holds, `None` for anonymous data
    fn cache_owner(&self) -> Result<Option<String>> {
        self.get(KEY_CACHE_OWNER)
    }

    fn set_cache_owner(&self, owner: Option<&str>) -> Result<()> {
        match owner {
            Some(owner) => self.set(KEY_CACHE_OWNER, owner),
            None => self.remove(KEY_CACHE_OWNER),
        }
    }
}

/// `SQLite` implementation of `StateRepository`
pub struct SqliteStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl StateRepository for SqliteStateRepository<'_> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM local_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO local_state (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM local_state WHERE key = ?1", params![key])?;
        Ok(())
    }
}
