//! SQLite schema migrations.
//!
//! Migrations are listed in order and applied inside one transaction. The
//! applied versions are recorded in `schema_migrations` together with the
//! migration name, so a database opened by an older build can be diagnosed.

use rusqlite::{params, Connection, OptionalExtension};
use spacegate_core::now_millis;
use tracing::debug;

use crate::error::{Result, StoreError};

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "spaces and snapshots",
        sql: r#"
        CREATE TABLE spaces (
            key BLOB PRIMARY KEY,             -- 32 bytes
            genesis_feed_key BLOB NOT NULL,
            control_feed_key BLOB NOT NULL,
            data_feed_key BLOB NOT NULL,
            latest_timeframe TEXT,            -- JSON
            snapshot_ref TEXT,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE snapshots (
            id TEXT PRIMARY KEY,              -- Blake3 hex of data
            data BLOB NOT NULL,
            created_at INTEGER NOT NULL
        );
        "#,
    },
    Migration {
        version: 2,
        name: "snapshot ref index",
        sql: "CREATE INDEX idx_spaces_snapshot_ref ON spaces(snapshot_ref);",
    },
];

/// Schema version after all migrations.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Version recorded in the database, 0 for a fresh file.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

/// Bring the schema up to [`latest_version`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        )",
    )?;

    let current = schema_version(conn)?;
    if current > latest_version() {
        return Err(StoreError::Migration(format!(
            "database schema v{} is newer than this build (v{})",
            current,
            latest_version()
        )));
    }

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in pending {
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now_millis()],
        )?;
        debug!(version = migration.version, name = migration.name, "applied migration");
    }
    tx.commit()?;
    Ok(())
}
