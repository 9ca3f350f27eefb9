//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        apply(conn, 1, MIGRATION_V1)?;
    }
    if version < 2 {
        apply(conn, 2, MIGRATION_V2)?;
    }
    if version < 3 {
        apply(conn, 3, MIGRATION_V3)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Version 1: board metadata, content blobs and the local key/value state
const MIGRATION_V1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS boards (
        id TEXT PRIMARY KEY,
        cloud_id TEXT,
        name TEXT NOT NULL,
        thumbnail TEXT,
        created_at INTEGER NOT NULL,
        last_modified INTEGER NOT NULL,
        pending_delete INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_boards_cloud_id ON boards(cloud_id)",
    "CREATE TABLE IF NOT EXISTS board_content (
        board_id TEXT PRIMARY KEY,
        elements TEXT NOT NULL,
        app_state TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 0,
        checksum TEXT,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS local_state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
];

/// Version 2: durable offline mutation log, one FIFO per owner
const MIGRATION_V2: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS offline_queue (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        owner_id TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        payload TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        retry_count INTEGER NOT NULL DEFAULT 0,
        idempotency_key TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_offline_queue_owner ON offline_queue(owner_id, seq)",
];

/// Version 3: files placed on the canvas
const MIGRATION_V3: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS board_files (
        board_id TEXT NOT NULL,
        file_id TEXT NOT NULL,
        mime_type TEXT NOT NULL,
        data_url TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (board_id, file_id)
    )",
];

fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", [])?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, []) {
            conn.execute("ROLLBACK", []).ok();
            return Err(e.into());
        }
    }

    let recorded = conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    );
    if let Err(e) = recorded.and_then(|_| conn.execute("COMMIT", [])) {
        conn.execute("ROLLBACK", []).ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version} of {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_reach_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, i64::from(CURRENT_VERSION));
    }

    #[test]
    fn creates_queue_table() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='offline_queue')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(exists);
    }
}
