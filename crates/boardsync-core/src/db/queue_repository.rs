//! Offline queue persistence

use crate::error::{Error, Result};
use crate::models::{EntityType, QueuedOperation};
use rusqlite::{params, Connection};
use uuid::Uuid;

/// Trait for the durable mutation log
pub trait QueueRepository {
    /// Load an owner's operations in enqueue order
    fn load(&self, owner_id: &str) -> Result<Vec<QueuedOperation>>;

    /// Append an operation to the owner's log
    fn append(&self, owner_id: &str, op: &QueuedOperation) -> Result<()>;

    /// Persist the mutable parts of an operation (target, payload, retry count)
    fn update(&self, op: &QueuedOperation) -> Result<()>;

    /// Remove one operation
    fn remove(&self, id: &Uuid) -> Result<()>;

    /// Remove every operation of an owner
    fn clear(&self, owner_id: &str) -> Result<()>;

    /// Retarget an owner's operations from one entity id to another
    fn rewrite_entity_id(
        &self,
        owner_id: &str,
        entity_type: EntityType,
        old: &str,
        new: &str,
    ) -> Result<usize>;
}

/// `SQLite` implementation of `QueueRepository`
pub struct SqliteQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    #[allow(clippy::type_complexity)]
    fn parse_row(
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<(String, String, String, String, i64, u32, Option<String>)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }
}

impl QueueRepository for SqliteQueueRepository<'_> {
    fn load(&self, owner_id: &str) -> Result<Vec<QueuedOperation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, entity_type, entity_id, payload, timestamp, retry_count, idempotency_key
             FROM offline_queue
             WHERE owner_id = ?1
             ORDER BY seq ASC",
        )?;

        let rows = stmt
            .query_map(params![owner_id], Self::parse_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(
                |(id, entity_type, entity_id, payload, timestamp, retry_count, idempotency_key)| {
                    Ok(QueuedOperation {
                        id: id
                            .parse()
                            .map_err(|_| Error::Database(format!("invalid queue id '{id}'")))?,
                        entity_type: entity_type.parse().map_err(Error::Database)?,
                        entity_id,
                        payload: serde_json::from_str(&payload)?,
                        timestamp,
                        retry_count,
                        idempotency_key,
                    })
                },
            )
            .collect()
    }

    fn append(&self, owner_id: &str, op: &QueuedOperation) -> Result<()> {
        self.conn.execute(
            "INSERT INTO offline_queue
                (id, owner_id, entity_type, entity_id, kind, payload, timestamp, retry_count, idempotency_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                op.id.to_string(),
                owner_id,
                op.entity_type.as_str(),
                op.entity_id,
                op.kind().to_string(),
                serde_json::to_string(&op.payload)?,
                op.timestamp,
                op.retry_count,
                op.idempotency_key
            ],
        )?;
        Ok(())
    }

    fn update(&self, op: &QueuedOperation) -> Result<()> {
        self.conn.execute(
            "UPDATE offline_queue
             SET entity_id = ?2, kind = ?3, payload = ?4, retry_count = ?5
             WHERE id = ?1",
            params![
                op.id.to_string(),
                op.entity_id,
                op.kind().to_string(),
                serde_json::to_string(&op.payload)?,
                op.retry_count
            ],
        )?;
        Ok(())
    }

    fn remove(&self, id: &Uuid) -> Result<()> {
        self.conn.execute(
            "DELETE FROM offline_queue WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    fn clear(&self, owner_id: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM offline_queue WHERE owner_id = ?1",
            params![owner_id],
        )?;
        Ok(())
    }

    fn rewrite_entity_id(
        &self,
        owner_id: &str,
        entity_type: EntityType,
        old: &str,
        new: &str,
    ) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE offline_queue SET entity_id = ?4
             WHERE owner_id = ?1 AND entity_type = ?2 AND entity_id = ?3",
            params![owner_id, entity_type.as_str(), old, new],
        )?;
        Ok(rows)
    }
}
