//! SQLite-backed sound store.
//!
//! Entries live in two tables: `sounds` holds the metadata JSON and the
//! storage index, `sound_audios` holds one BLOB row per captured variant.
//! Every public operation is a single transaction run on a blocking thread.
//!
//! The connection is opened lazily by [`ConnectionManager`] and shared by
//! all callers. When opening fails, or a table turns out to be missing, the
//! handle is dropped so that the next call starts over from scratch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode as SqliteCode, OptionalExtension};
use tracing::{debug, warn};

use super::store::SoundStore;
use crate::error::{CacheError, ErrorCode, Result};
use crate::types::{CachedSound, SoundId, SoundMetadata};

/// File name of the database inside the cache directory.
pub const DATABASE_FILE: &str = "sounds.sqlite3";

/// Current schema version, stored in `PRAGMA user_version`.
///
/// Bumping it drops and recreates both tables on the next open.
pub const SCHEMA_VERSION: i64 = 2;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS sounds (
        id INTEGER PRIMARY KEY,
        metadata TEXT NOT NULL,
        storage_index INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sounds_storage_index ON sounds(storage_index);
    CREATE TABLE IF NOT EXISTS sound_audios (
        sound_id INTEGER NOT NULL,
        position INTEGER NOT NULL,
        data BLOB NOT NULL,
        PRIMARY KEY (sound_id, position)
    );
";

/// Where the database lives.
#[derive(Debug, Clone)]
enum StoreLocation {
    File(PathBuf),
    Memory,
}

type SharedConnection = Arc<Mutex<Connection>>;

/// Owner of the lazily opened, process-wide store connection.
pub struct ConnectionManager {
    location: StoreLocation,
    handle: Mutex<Option<SharedConnection>>,
}

impl ConnectionManager {
    fn new(location: StoreLocation) -> Self {
        Self {
            location,
            handle: Mutex::new(None),
        }
    }

    /// Returns the shared connection, opening it if needed.
    ///
    /// Blocks; call from a blocking thread.
    pub fn connection(&self) -> Result<SharedConnection> {
        let mut handle = self.handle.lock();
        if let Some(ref conn) = *handle {
            return Ok(Arc::clone(conn));
        }

        let conn = Arc::new(Mutex::new(open_connection(&self.location)?));
        *handle = Some(Arc::clone(&conn));
        debug!(location = ?self.location, "store connection opened");
        Ok(conn)
    }

    /// Drops the shared connection so the next call reopens it.
    pub fn reset(&self) {
        if self.handle.lock().take().is_some() {
            warn!(location = ?self.location, "store connection reset");
        }
    }

    /// Returns true if a connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.handle.lock().is_some()
    }
}

/// Sound store persisted in a SQLite database.
pub struct SqliteStore {
    manager: Arc<ConnectionManager>,
}

impl SqliteStore {
    /// Creates a store for `<dir>/sounds.sqlite3`.
    ///
    /// Nothing is opened until the first operation.
    pub fn open(dir: &Path) -> Self {
        Self {
            manager: Arc::new(ConnectionManager::new(StoreLocation::File(
                dir.join(DATABASE_FILE),
            ))),
        }
    }

    /// Creates a store backed by a private in-memory database.
    ///
    /// A connection reset discards its contents.
    pub fn in_memory() -> Self {
        Self {
            manager: Arc::new(ConnectionManager::new(StoreLocation::Memory)),
        }
    }

    /// Returns the connection manager.
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Runs `op` against the shared connection on a blocking thread.
    async fn run<T, F>(&self, name: &'static str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let manager = Arc::clone(&self.manager);
        let result = tokio::task::spawn_blocking(move || {
            let shared = manager.connection()?;
            let mut conn = shared.lock();
            op(&mut *conn)
        })
        .await
        .unwrap_or_else(|e| {
            Err(CacheError::store_unavailable(format!(
                "{} task failed: {}",
                name, e
            )))
        });

        if let Err(ref e) = result {
            if e.code.invalidates_connection() {
                warn!(operation = name, error = %e.message, "store operation failed");
                self.manager.reset();
            }
        }
        result
    }

    /// Runs a read, retrying once on a fresh connection.
    async fn read<T, F>(&self, name: &'static str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&mut Connection) -> Result<T> + Clone + Send + 'static,
    {
        match self.run(name, op.clone()).await {
            Err(e) if e.code.invalidates_connection() => self.run(name, op).await,
            other => other,
        }
    }
}

#[async_trait]
impl SoundStore for SqliteStore {
    async fn get_all(&self) -> Vec<CachedSound> {
        match self.read("get_all", read_all).await {
            Ok(sounds) => sounds,
            Err(e) => {
                warn!(error = %e.message, "reading cached sounds failed, treating store as empty");
                Vec::new()
            }
        }
    }

    async fn get_by_id(&self, id: SoundId) -> Option<CachedSound> {
        match self.read("get_by_id", move |conn| read_one(conn, id)).await {
            Ok(sound) => sound,
            Err(e) => {
                warn!(sound_id = id, error = %e.message, "reading cached sound failed");
                None
            }
        }
    }

    async fn put(&self, sound: &CachedSound) -> Result<()> {
        let sound = sound.clone();
        self.run("put", move |conn| write_one(conn, &sound)).await
    }

    async fn delete_by_id(&self, id: SoundId) -> Result<()> {
        self.run("delete_by_id", move |conn| {
            let tx = conn.transaction().map_err(|e| sql_error(e, "delete", true))?;
            delete_rows(&tx, id)?;
            tx.commit().map_err(|e| sql_error(e, "delete", true))
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.run("clear", |conn| {
            let tx = conn.transaction().map_err(|e| sql_error(e, "clear", true))?;
            tx.execute_batch("DELETE FROM sound_audios; DELETE FROM sounds;")
                .map_err(|e| sql_error(e, "clear", true))?;
            tx.commit().map_err(|e| sql_error(e, "clear", true))
        })
        .await
    }
}

/// Opens the database and brings the schema to [`SCHEMA_VERSION`].
fn open_connection(location: &StoreLocation) -> Result<Connection> {
    let conn = match location {
        StoreLocation::File(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CacheError::with_source(
                        ErrorCode::StoreUnavailable,
                        format!("cannot create cache directory {}", parent.display()),
                        e,
                    )
                })?;
            }
            Connection::open(path)
        }
        StoreLocation::Memory => Connection::open_in_memory(),
    }
    .map_err(|e| CacheError::with_source(ErrorCode::StoreUnavailable, "cannot open store", e))?;

    conn.busy_timeout(Duration::from_secs(5))
        .map_err(|e| sql_error(e, "configure", false))?;
    migrate(&conn)?;
    Ok(conn)
}

/// Creates missing tables, recreating them when the schema version changed.
fn migrate(conn: &Connection) -> Result<()> {
    let version: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| sql_error(e, "read schema version", false))?;

    if version != SCHEMA_VERSION && version != 0 {
        debug!(from = version, to = SCHEMA_VERSION, "recreating store schema");
        conn.execute_batch("DROP TABLE IF EXISTS sound_audios; DROP TABLE IF EXISTS sounds;")
            .map_err(|e| sql_error(e, "drop old schema", true))?;
    }

    conn.execute_batch(SCHEMA)
        .map_err(|e| sql_error(e, "create schema", true))?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(|e| sql_error(e, "write schema version", true))?;
    Ok(())
}

fn read_all(conn: &mut Connection) -> Result<Vec<CachedSound>> {
    let tx = conn.transaction().map_err(|e| sql_error(e, "get_all", false))?;

    let rows: Vec<(SoundId, String, i64)> = {
        let mut stmt = tx
            .prepare("SELECT id, metadata, storage_index FROM sounds ORDER BY storage_index")
            .map_err(|e| sql_error(e, "get_all", false))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, SoundId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .map_err(|e| sql_error(e, "get_all", false))?;
        rows.collect::<rusqlite::Result<_>>()
            .map_err(|e| sql_error(e, "get_all", false))?
    };

    let mut blobs: HashMap<SoundId, Vec<(usize, Vec<u8>)>> = HashMap::new();
    {
        let mut stmt = tx
            .prepare("SELECT sound_id, position, data FROM sound_audios")
            .map_err(|e| sql_error(e, "get_all", false))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, SoundId>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })
            .map_err(|e| sql_error(e, "get_all", false))?;
        for row in rows {
            let (id, position, data) = row.map_err(|e| sql_error(e, "get_all", false))?;
            blobs.entry(id).or_default().push((position as usize, data));
        }
    }

    // Unreadable entries would hold bytes that no quota check can see.
    let mut sounds = Vec::with_capacity(rows.len());
    for (id, metadata, storage_index) in rows {
        match decode(&metadata, storage_index, blobs.remove(&id).unwrap_or_default()) {
            Ok(sound) => sounds.push(sound),
            Err(e) => {
                warn!(sound_id = id, error = %e.message, "dropping unreadable entry");
                if let Err(e) = delete_rows(&tx, id) {
                    warn!(sound_id = id, error = %e.message, "dropping unreadable entry failed");
                }
            }
        }
    }
    tx.commit().map_err(|e| sql_error(e, "get_all", false))?;

    Ok(sounds)
}

/// Deletes an entry and its blobs inside `tx`.
fn delete_rows(tx: &rusqlite::Transaction<'_>, id: SoundId) -> Result<()> {
    tx.execute("DELETE FROM sound_audios WHERE sound_id = ?1", params![id])
        .map_err(|e| sql_error(e, "delete", true))?;
    tx.execute("DELETE FROM sounds WHERE id = ?1", params![id])
        .map_err(|e| sql_error(e, "delete", true))?;
    Ok(())
}

fn read_one(conn: &mut Connection, id: SoundId) -> Result<Option<CachedSound>> {
    let tx = conn.transaction().map_err(|e| sql_error(e, "get_by_id", false))?;

    let row: Option<(String, i64)> = tx
        .query_row(
            "SELECT metadata, storage_index FROM sounds WHERE id = ?1",
            params![id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()
        .map_err(|e| sql_error(e, "get_by_id", false))?;

    let Some((metadata, storage_index)) = row else {
        return Ok(None);
    };

    let blobs: Vec<(usize, Vec<u8>)> = {
        let mut stmt = tx
            .prepare("SELECT position, data FROM sound_audios WHERE sound_id = ?1")
            .map_err(|e| sql_error(e, "get_by_id", false))?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok((row.get::<_, i64>(0)? as usize, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(|e| sql_error(e, "get_by_id", false))?;
        rows.collect::<rusqlite::Result<_>>()
            .map_err(|e| sql_error(e, "get_by_id", false))?
    };
    tx.commit().map_err(|e| sql_error(e, "get_by_id", false))?;

    decode(&metadata, storage_index, blobs).map(Some)
}

fn write_one(conn: &mut Connection, sound: &CachedSound) -> Result<()> {
    let id = sound.id();
    let metadata = serde_json::to_string(&sound.metadata)
        .map_err(|e| CacheError::store_write_failed(format!("cannot encode metadata: {}", e)))?;

    let tx = conn.transaction().map_err(|e| sql_error(e, "put", true))?;
    tx.execute(
        "INSERT INTO sounds (id, metadata, storage_index) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET
             metadata = excluded.metadata,
             storage_index = excluded.storage_index",
        params![id, metadata, sound.storage_index as i64],
    )
    .map_err(|e| sql_error(e, "put", true))?;
    tx.execute("DELETE FROM sound_audios WHERE sound_id = ?1", params![id])
        .map_err(|e| sql_error(e, "put", true))?;
    {
        let mut stmt = tx
            .prepare("INSERT INTO sound_audios (sound_id, position, data) VALUES (?1, ?2, ?3)")
            .map_err(|e| sql_error(e, "put", true))?;
        for (position, blob) in sound.audios.iter().enumerate() {
            stmt.execute(params![id, position as i64, &blob[..]])
                .map_err(|e| sql_error(e, "put", true))?;
        }
    }
    tx.commit().map_err(|e| sql_error(e, "put", true))?;

    debug!(sound_id = id, bytes = sound.size_bytes(), "stored sound");
    Ok(())
}

/// Rebuilds a cached sound from its row and blob rows.
fn decode(metadata: &str, storage_index: i64, blobs: Vec<(usize, Vec<u8>)>) -> Result<CachedSound> {
    let metadata: SoundMetadata =
        serde_json::from_str(metadata).map_err(|e| CacheError::store_corrupt(e.to_string()))?;

    let mut sound = CachedSound::new(metadata, Vec::with_capacity(blobs.len()), storage_index as u64);
    for (position, data) in blobs {
        sound = sound.with_variant(position, Bytes::from(data));
    }
    Ok(sound)
}

/// Maps a SQLite error onto the cache error taxonomy.
fn sql_error(err: rusqlite::Error, operation: &str, write: bool) -> CacheError {
    if let rusqlite::Error::SqliteFailure(_, Some(msg)) = &err {
        if msg.starts_with("no such table") {
            return CacheError::store_missing(format!("{} failed: {}", operation, msg));
        }
    }

    let code = match &err {
        rusqlite::Error::SqliteFailure(e, _) => match e.code {
            SqliteCode::DatabaseBusy
            | SqliteCode::DatabaseLocked
            | SqliteCode::CannotOpen
            | SqliteCode::NotADatabase
            | SqliteCode::DatabaseCorrupt => ErrorCode::StoreUnavailable,
            _ if write => ErrorCode::StoreWriteFailed,
            _ => ErrorCode::StoreCorrupt,
        },
        _ if write => ErrorCode::StoreWriteFailed,
        _ => ErrorCode::StoreCorrupt,
    };
    CacheError::with_source(code, format!("{} failed", operation), err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::total_bytes;

    fn make_sound(id: SoundId, sizes: &[usize], storage_index: u64) -> CachedSound {
        CachedSound::new(
            SoundMetadata {
                id,
                sound_name: format!("sound {}", id),
                audio_paths: (0..sizes.len()).map(|i| format!("{}/{}.mp3", id, i)).collect(),
                ..Default::default()
            },
            sizes.iter().map(|&n| Bytes::from(vec![id as u8; n])).collect(),
            storage_index,
        )
    }

    #[tokio::test]
    async fn put_and_get_round_trips_variants() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path());
        let sound = make_sound(3, &[10, 20], 1);

        store.put(&sound).await.unwrap();

        let loaded = store.get_by_id(3).await.unwrap();
        assert_eq!(loaded, sound);
        assert!(dir.path().join(DATABASE_FILE).exists());
    }

    #[tokio::test]
    async fn missing_id_is_none() {
        let store = SqliteStore::in_memory();
        assert!(store.get_by_id(404).await.is_none());
    }

    #[tokio::test]
    async fn upsert_same_content_keeps_one_entry() {
        let store = SqliteStore::in_memory();
        let sound = make_sound(1, &[100], 1);

        store.put(&sound).await.unwrap();
        store.put(&sound).await.unwrap();

        let all = store.get_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(total_bytes(&all), 100);
    }

    #[tokio::test]
    async fn upsert_replaces_all_blobs() {
        let store = SqliteStore::in_memory();
        store.put(&make_sound(1, &[10, 10, 10], 1)).await.unwrap();
        store.put(&make_sound(1, &[5], 2)).await.unwrap();

        let loaded = store.get_by_id(1).await.unwrap();
        assert_eq!(loaded.audios.len(), 1);
        assert_eq!(loaded.size_bytes(), 5);
        assert_eq!(loaded.storage_index, 2);
    }

    #[tokio::test]
    async fn uncaptured_variants_survive_round_trip() {
        let store = SqliteStore::in_memory();
        let sound = make_sound(2, &[], 1).with_variant(1, Bytes::from_static(b"second"));
        store.put(&sound).await.unwrap();

        let loaded = store.get_by_id(2).await.unwrap();
        assert!(loaded.variant(0).is_none());
        assert_eq!(loaded.variant(1).unwrap().as_ref(), b"second");
    }

    #[tokio::test]
    async fn get_all_orders_by_storage_index() {
        let store = SqliteStore::in_memory();
        store.put(&make_sound(10, &[1], 3)).await.unwrap();
        store.put(&make_sound(11, &[1], 1)).await.unwrap();
        store.put(&make_sound(12, &[1], 2)).await.unwrap();

        let ids: Vec<SoundId> = store.get_all().await.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![11, 12, 10]);
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let store = SqliteStore::in_memory();
        store.put(&make_sound(1, &[4], 1)).await.unwrap();
        store.put(&make_sound(2, &[4], 2)).await.unwrap();

        store.delete_by_id(1).await.unwrap();
        store.delete_by_id(999).await.unwrap();
        assert!(store.get_by_id(1).await.is_none());
        assert_eq!(store.get_all().await.len(), 1);

        store.clear().await.unwrap();
        assert!(store.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn entries_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SqliteStore::open(dir.path());
            store.put(&make_sound(7, &[32], 1)).await.unwrap();
        }
        let store = SqliteStore::open(dir.path());
        assert_eq!(store.get_by_id(7).await.unwrap().size_bytes(), 32);
    }

    #[tokio::test]
    async fn missing_table_resets_connection_and_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path());
        store.put(&make_sound(1, &[8], 1)).await.unwrap();
        assert!(store.manager().is_connected());

        let other = Connection::open(dir.path().join(DATABASE_FILE)).unwrap();
        other.execute_batch("DROP TABLE sound_audios;").unwrap();
        drop(other);

        let err = store.put(&make_sound(2, &[8], 2)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::StoreMissing);
        assert!(err.message.contains("no such table"));
        assert!(!store.manager().is_connected());

        // Reopening recreates the missing table.
        store.put(&make_sound(2, &[8], 2)).await.unwrap();
        assert_eq!(store.get_by_id(2).await.unwrap().size_bytes(), 8);
    }

    #[tokio::test]
    async fn unreadable_entry_is_dropped_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path());
        store.put(&make_sound(1, &[8], 1)).await.unwrap();
        store.put(&make_sound(2, &[16], 2)).await.unwrap();

        let other = Connection::open(dir.path().join(DATABASE_FILE)).unwrap();
        other
            .execute("UPDATE sounds SET metadata = 'not json' WHERE id = 2", [])
            .unwrap();
        drop(other);

        let all = store.get_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id(), 1);

        let other = Connection::open(dir.path().join(DATABASE_FILE)).unwrap();
        let blobs: i64 = other
            .query_row(
                "SELECT COUNT(*) FROM sound_audios WHERE sound_id = 2",
                [],
                |row| row.get(0),
            )
            .unwrap();
        let rows: i64 = other
            .query_row("SELECT COUNT(*) FROM sounds", [], |row| row.get(0))
            .unwrap();
        assert_eq!(blobs, 0);
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn read_of_missing_table_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path());
        store.put(&make_sound(1, &[8], 1)).await.unwrap();

        let other = Connection::open(dir.path().join(DATABASE_FILE)).unwrap();
        other
            .execute_batch("DROP TABLE sound_audios; DROP TABLE sounds;")
            .unwrap();
        drop(other);

        assert!(store.get_all().await.is_empty());
        assert!(store.manager().is_connected());
    }

    #[tokio::test]
    async fn old_schema_version_is_recreated() {
        let dir = tempfile::tempdir().unwrap();
        {
            let conn = Connection::open(dir.path().join(DATABASE_FILE)).unwrap();
            conn.execute_batch(
                "CREATE TABLE sounds (key TEXT PRIMARY KEY, value BLOB);
                 PRAGMA user_version = 1;",
            )
            .unwrap();
        }

        let store = SqliteStore::open(dir.path());
        store.put(&make_sound(5, &[3], 1)).await.unwrap();
        assert_eq!(store.get_by_id(5).await.unwrap().size_bytes(), 3);
    }

    #[tokio::test]
    async fn unopenable_store_fails_writes_and_degrades_reads() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let store = SqliteStore::open(&blocker.join("cache"));

        assert!(store.get_all().await.is_empty());
        assert!(store.get_by_id(1).await.is_none());

        let err = store.put(&make_sound(1, &[1], 1)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::StoreUnavailable);
        assert!(!store.manager().is_connected());
    }
}
