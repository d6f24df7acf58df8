//! SQLite backend for durable token records
//!
//! Schema:
//! - kv table: key, JSON value, optional expiry (unix millis), write time
//! - store_metadata table: schema version
//!
//! Expired rows are filtered out on read and deleted by `purge_expired`.
//! A schema version mismatch drops cached token records (they are
//! refetchable) but keeps registry and metadata documents.

use super::{KvStore, StoreError, StoreStats, TOKEN_PREFIX};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Current schema version
///
/// Increment when the stored `TokenCacheData` shape changes so that stale
/// records are dropped on startup instead of failing to decode.
const SCHEMA_VERSION: i64 = 1;

const DB_FILE: &str = "sipmeta.db";

/// SQLite-backed store (thread-safe, blocking work on the tokio blocking pool)
pub struct SqliteKv {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteKv {
    /// Create or open the database under `dir`
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir).map_err(|source| StoreError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(DB_FILE);
        let conn = Connection::open(&path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS store_metadata (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_kv_expires ON kv(expires_at);
            "#,
        )?;

        let stored_version: Option<i64> = conn
            .query_row(
                "SELECT value FROM store_metadata WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match stored_version {
            Some(v) if v != SCHEMA_VERSION => {
                let dropped = conn.execute(
                    "DELETE FROM kv WHERE key LIKE ?1 ESCAPE '\\'",
                    params![like_prefix(TOKEN_PREFIX)],
                )?;
                conn.execute(
                    "INSERT OR REPLACE INTO store_metadata (key, value) VALUES ('version', ?1)",
                    params![SCHEMA_VERSION],
                )?;
                warn!(
                    stored = v,
                    current = SCHEMA_VERSION,
                    dropped,
                    "Store schema version mismatch, dropped cached token records"
                );
            }
            None => {
                conn.execute(
                    "INSERT INTO store_metadata (key, value) VALUES ('version', ?1)",
                    params![SCHEMA_VERSION],
                )?;
                debug!("Store schema version initialized to {}", SCHEMA_VERSION);
            }
            Some(_) => {}
        }

        debug!(path = %path.display(), "SQLite store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
        .map_err(StoreError::from)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// LIKE pattern matching keys that start with `prefix` literally
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT value FROM kv WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now_millis()],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let now = now_millis();
            let expires_at =
                ttl.map(|ttl| now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)));
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value, expires_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![key, value, expires_at, now],
            )
            .map(|_| ())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM kv WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now_millis()],
            )
            .map(|n| n > 0)
        })
        .await
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let pattern = like_prefix(prefix);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key FROM kv WHERE key LIKE ?1 ESCAPE '\\' \
                 AND (expires_at IS NULL OR expires_at > ?2) ORDER BY key",
            )?;
            let keys = stmt
                .query_map(params![pattern, now_millis()], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(keys)
        })
        .await
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let removed = self
            .with_conn(|conn| {
                conn.execute(
                    "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    params![now_millis()],
                )
            })
            .await?;
        debug!(removed, "Purged expired entries");
        Ok(removed)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.with_conn(|conn| {
            let now = now_millis();
            let total_entries: i64 = conn.query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
            let expired_entries: i64 = conn.query_row(
                "SELECT COUNT(*) FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
                |row| row.get(0),
            )?;
            let total_size: Option<i64> = conn.query_row(
                "SELECT SUM(LENGTH(key) + LENGTH(value)) FROM kv",
                [],
                |row| row.get(0),
            )?;
            Ok(StoreStats {
                total_entries: total_entries as usize,
                expired_entries: expired_entries as usize,
                total_size_bytes: total_size.unwrap_or(0) as usize,
            })
        })
        .await
    }
}

impl Drop for SqliteKv {
    fn drop(&mut self) {
        // Flush WAL into the main file so it doesn't grow across restarts
        let conn = self.conn.lock();
        if let Err(e) = conn.pragma_update(None, "wal_checkpoint", "TRUNCATE") {
            warn!("Failed to checkpoint WAL on SqliteKv drop: {}", e);
        }
    }
}
