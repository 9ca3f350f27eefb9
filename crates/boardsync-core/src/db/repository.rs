//! Board repository implementation

use crate::error::Result;
use crate::models::{Board, BoardContent, BoardFile, BoardId};
use crate::util::now_millis;
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for board storage operations
pub trait BoardRepository {
    /// List every cached board in insertion order
    fn list(&self) -> Result<Vec<Board>>;

    /// Get a board by id
    fn get(&self, id: &BoardId) -> Result<Option<Board>>;

    /// Insert or overwrite a board row
    fn upsert(&self, board: &Board) -> Result<()>;

    /// Remove a board together with its content and files
    fn delete(&self, id: &BoardId) -> Result<()>;

    /// Replace the whole board list
    fn replace_all(&self, boards: &[Board]) -> Result<()>;

    /// Move a board and everything it owns to a new id
    fn rename(&self, old: &BoardId, new: &BoardId) -> Result<()>;

    /// Remove every board, content blob and file
    fn clear(&self) -> Result<()>;

    /// Load saved content, `None` if never saved
    fn get_content(&self, id: &BoardId) -> Result<Option<BoardContent>>;

    /// Persist content for a board
    fn save_content(&self, id: &BoardId, content: &BoardContent) -> Result<()>;

    /// List files attached to a board
    fn get_files(&self, id: &BoardId) -> Result<Vec<BoardFile>>;

    /// Insert or overwrite files attached to a board
    fn save_files(&self, id: &BoardId, files: &[BoardFile]) -> Result<()>;
}

/// `SQLite` implementation of `BoardRepository`
pub struct SqliteBoardRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteBoardRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a board from a database row
    fn parse_board(row: &rusqlite::Row<'_>) -> rusqlite::Result<Board> {
        let id: String = row.get(0)?;
        Ok(Board {
            id: BoardId::from(id),
            cloud_id: row.get(1)?,
            name: row.get(2)?,
            thumbnail: row.get(3)?,
            created_at: row.get(4)?,
            last_modified: row.get(5)?,
            pending_delete: row.get::<_, i32>(6)? != 0,
        })
    }

    fn insert_board(&self, board: &Board) -> Result<()> {
        self.conn.execute(
            "INSERT INTO boards (id, cloud_id, name, thumbnail, created_at, last_modified, pending_delete)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                cloud_id = excluded.cloud_id,
                name = excluded.name,
                thumbnail = excluded.thumbnail,
                created_at = excluded.created_at,
                last_modified = excluded.last_modified,
                pending_delete = excluded.pending_delete",
            params![
                board.id.as_str(),
                board.cloud_id,
                board.name,
                board.thumbnail,
                board.created_at,
                board.last_modified,
                i32::from(board.pending_delete)
            ],
        )?;
        Ok(())
    }
}

impl BoardRepository for SqliteBoardRepository<'_> {
    fn list(&self) -> Result<Vec<Board>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, cloud_id, name, thumbnail, created_at, last_modified, pending_delete
             FROM boards
             ORDER BY rowid ASC",
        )?;

        let boards = stmt
            .query_map([], Self::parse_board)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(boards)
    }

    fn get(&self, id: &BoardId) -> Result<Option<Board>> {
        let board = self
            .conn
            .query_row(
                "SELECT id, cloud_id, name, thumbnail, created_at, last_modified, pending_delete
                 FROM boards WHERE id = ?1",
                params![id.as_str()],
                Self::parse_board,
            )
            .optional()?;
        Ok(board)
    }

    fn upsert(&self, board: &Board) -> Result<()> {
        self.insert_board(board)
    }

    fn delete(&self, id: &BoardId) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM boards WHERE id = ?1", params![id.as_str()])?;
        tx.execute(
            "DELETE FROM board_content WHERE board_id = ?1",
            params![id.as_str()],
        )?;
        tx.execute(
            "DELETE FROM board_files WHERE board_id = ?1",
            params![id.as_str()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn replace_all(&self, boards: &[Board]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM boards", [])?;
        for board in boards {
            self.insert_board(board)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn rename(&self, old: &BoardId, new: &BoardId) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let ids = [old.as_str(), new.as_str()];

        // An existing target row wins; the old row's content and files replace the target's.
        tx.execute(
            "DELETE FROM boards WHERE id = ?1 AND EXISTS (SELECT 1 FROM boards WHERE id = ?2)",
            ids,
        )?;
        tx.execute(
            "UPDATE boards SET id = ?2, cloud_id = ?2 WHERE id = ?1",
            ids,
        )?;
        tx.execute(
            "DELETE FROM board_content
             WHERE board_id = ?2 AND EXISTS (SELECT 1 FROM board_content WHERE board_id = ?1)",
            ids,
        )?;
        tx.execute(
            "UPDATE board_content SET board_id = ?2 WHERE board_id = ?1",
            ids,
        )?;
        tx.execute(
            "DELETE FROM board_files
             WHERE board_id = ?2 AND file_id IN (SELECT file_id FROM board_files WHERE board_id = ?1)",
            ids,
        )?;
        tx.execute(
            "UPDATE board_files SET board_id = ?2 WHERE board_id = ?1",
            ids,
        )?;
        tx.commit()?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
             DELETE FROM boards;
             DELETE FROM board_content;
             DELETE FROM board_files;
             COMMIT;",
        )?;
        Ok(())
    }

    fn get_content(&self, id: &BoardId) -> Result<Option<BoardContent>> {
        let row = self
            .conn
            .query_row(
                "SELECT elements, app_state, version, checksum FROM board_content WHERE board_id = ?1",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((elements, app_state, version, checksum)) = row else {
            return Ok(None);
        };

        Ok(Some(BoardContent {
            elements: serde_json::from_str(&elements)?,
            app_state: serde_json::from_str(&app_state)?,
            version: u64::try_from(version).unwrap_or_default(),
            checksum,
        }))
    }

    fn save_content(&self, id: &BoardId, content: &BoardContent) -> Result<()> {
        let elements = serde_json::to_string(&content.elements)?;
        let app_state = serde_json::to_string(&content.app_state)?;
        self.conn.execute(
            "INSERT INTO board_content (board_id, elements, app_state, version, checksum, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(board_id) DO UPDATE SET
                elements = excluded.elements,
                app_state = excluded.app_state,
                version = excluded.version,
                checksum = excluded.checksum,
                updated_at = excluded.updated_at",
            params![
                id.as_str(),
                elements,
                app_state,
                i64::try_from(content.version).unwrap_or(i64::MAX),
                content.checksum,
                now_millis()
            ],
        )?;
        Ok(())
    }

    fn get_files(&self, id: &BoardId) -> Result<Vec<BoardFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT file_id, mime_type, data_url, created_at
             FROM board_files
             WHERE board_id = ?1
             ORDER BY created_at ASC, file_id ASC",
        )?;

        let files = stmt
            .query_map(params![id.as_str()], |row| {
                Ok(BoardFile {
                    id: row.get(0)?,
                    mime_type: row.get(1)?,
                    data_url: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(files)
    }

    fn save_files(&self, id: &BoardId, files: &[BoardFile]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for file in files {
            tx.execute(
                "INSERT INTO board_files (board_id, file_id, mime_type, data_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(board_id, file_id) DO UPDATE SET
                    mime_type = excluded.mime_type,
                    data_url = excluded.data_url",
                params![
                    id.as_str(),
                    file.id,
                    file.mime_type,
                    file.data_url,
                    file.created_at
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
