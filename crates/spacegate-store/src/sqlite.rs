//! SQLite implementation of the metadata and snapshot stores.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use spacegate_core::{now_millis, PublicKey, Timeframe};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::metadata::SpaceMetadata;
use crate::migration;
use crate::traits::{snapshot_id, MetadataStore, SnapshotStore};

/// Metadata and snapshots in one SQLite file.
///
/// One connection behind a mutex; every call runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database file and bring its schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// A private in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(mut conn: Connection) -> Result<Self> {
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// Helper to read a 32-byte key column.
fn key_column(row: &rusqlite::Row<'_>, index: usize, name: &str) -> rusqlite::Result<PublicKey> {
    let bytes: Vec<u8> = row.get(index)?;
    PublicKey::try_from(bytes.as_slice()).map_err(|_| {
        rusqlite::Error::InvalidColumnType(index, name.into(), rusqlite::types::Type::Blob)
    })
}

// Helper to convert a row to SpaceMetadata. Timeframe JSON is parsed by the caller.
fn row_to_metadata(row: &rusqlite::Row<'_>) -> rusqlite::Result<(SpaceMetadata, Option<String>)> {
    let metadata = SpaceMetadata {
        key: key_column(row, 0, "key")?,
        genesis_feed_key: key_column(row, 1, "genesis_feed_key")?,
        control_feed_key: key_column(row, 2, "control_feed_key")?,
        data_feed_key: key_column(row, 3, "data_feed_key")?,
        latest_timeframe: None,
        snapshot_ref: row.get(5)?,
    };
    let timeframe: Option<String> = row.get(4)?;
    Ok((metadata, timeframe))
}

fn finish_metadata((mut metadata, timeframe): (SpaceMetadata, Option<String>)) -> Result<SpaceMetadata> {
    metadata.latest_timeframe = timeframe
        .map(|json| serde_json::from_str::<Timeframe>(&json))
        .transpose()?;
    Ok(metadata)
}

const SELECT_SPACES: &str = "SELECT key, genesis_feed_key, control_feed_key, data_feed_key,
        latest_timeframe, snapshot_ref
 FROM spaces";

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn load(&self) -> Result<()> {
        let count: i64 = self
            .blocking(|conn| {
                conn.query_row("SELECT COUNT(*) FROM spaces", [], |row| row.get(0))
                    .map_err(StoreError::from)
            })
            .await?;
        debug!(spaces = count, "loaded space metadata");
        Ok(())
    }

    async fn spaces(&self) -> Result<Vec<SpaceMetadata>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(&format!("{} ORDER BY rowid", SELECT_SPACES))?;
            let rows = stmt
                .query_map([], row_to_metadata)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(finish_metadata).collect()
        })
        .await
    }

    async fn get_space(&self, key: &PublicKey) -> Result<Option<SpaceMetadata>> {
        let key = *key;
        self.blocking(move |conn| {
            conn.query_row(
                &format!("{} WHERE key = ?1", SELECT_SPACES),
                params![key.as_bytes().as_slice()],
                row_to_metadata,
            )
            .optional()?
            .map(finish_metadata)
            .transpose()
        })
        .await
    }

    async fn add_space(&self, metadata: SpaceMetadata) -> Result<()> {
        self.blocking(move |conn| {
            let timeframe = metadata
                .latest_timeframe
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            let inserted = conn.execute(
                "INSERT OR IGNORE INTO spaces (
                    key, genesis_feed_key, control_feed_key, data_feed_key,
                    latest_timeframe, snapshot_ref, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    metadata.key.as_bytes().as_slice(),
                    metadata.genesis_feed_key.as_bytes().as_slice(),
                    metadata.control_feed_key.as_bytes().as_slice(),
                    metadata.data_feed_key.as_bytes().as_slice(),
                    timeframe,
                    metadata.snapshot_ref,
                    now_millis(),
                ],
            )?;

            if inserted == 0 {
                return Err(StoreError::AlreadyExists(metadata.key.to_hex()));
            }
            Ok(())
        })
        .await
    }

    async fn set_latest_timeframe(&self, key: &PublicKey, timeframe: Timeframe) -> Result<()> {
        let key = *key;
        self.blocking(move |conn| {
            let json = serde_json::to_string(&timeframe)?;
            let updated = conn.execute(
                "UPDATE spaces SET latest_timeframe = ?1 WHERE key = ?2",
                params![json, key.as_bytes().as_slice()],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(key.to_hex()));
            }
            Ok(())
        })
        .await
    }

    async fn set_snapshot_ref(&self, key: &PublicKey, snapshot_ref: String) -> Result<()> {
        let key = *key;
        self.blocking(move |conn| {
            let updated = conn.execute(
                "UPDATE spaces SET snapshot_ref = ?1 WHERE key = ?2",
                params![snapshot_ref, key.as_bytes().as_slice()],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(key.to_hex()));
            }
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.blocking(|conn| {
            conn.execute("DELETE FROM spaces", [])?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn save_snapshot(&self, data: Bytes) -> Result<String> {
        self.blocking(move |conn| {
            let id = snapshot_id(&data);
            conn.execute(
                "INSERT OR IGNORE INTO snapshots (id, data, created_at) VALUES (?1, ?2, ?3)",
                params![id, data.as_ref(), now_millis()],
            )?;
            Ok(id)
        })
        .await
    }

    async fn load_snapshot(&self, id: &str) -> Result<Option<Bytes>> {
        let id = id.to_string();
        self.blocking(move |conn| {
            let data: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT data FROM snapshots WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(data.map(Bytes::from))
        })
        .await
    }

    async fn list_snapshots(&self) -> Result<Vec<String>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM snapshots ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(ids)
        })
        .await
    }
}
