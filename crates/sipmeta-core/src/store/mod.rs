//! Key-value persistence for token records, metadata documents and the registry
//!
//! Values are JSON text. Every backend honours per-entry TTLs: an expired
//! entry is invisible to `get` and `keys` even before it is purged.

mod memory;
mod sqlite;

pub use memory::MemoryKv;
pub use sqlite::SqliteKv;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Key prefix for merged `TokenCacheData` records
pub const TOKEN_PREFIX: &str = "sip10:";

/// Key prefix for metadata documents served over HTTP
pub const METADATA_PREFIX: &str = "metadata:";

pub const MANAGED_KEY: &str = "registry:managed";
pub const BLACKLIST_KEY: &str = "registry:blacklist";

pub fn token_key(contract_id: &str) -> String {
    format!("{}{}", TOKEN_PREFIX, contract_id)
}

pub fn metadata_key(contract_id: &str) -> String {
    format!("{}{}", METADATA_PREFIX, contract_id)
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create store directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Value under '{key}' is not valid JSON")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode value for '{key}'")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store task aborted: {0}")]
    Task(String),
}

/// Entry counts reported by `sipmeta purge`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub total_size_bytes: usize,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Value under `key`, or None when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite; `ttl: None` never expires
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Returns true if a live entry was removed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Live keys starting with `prefix`, sorted
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Physically drop expired entries; returns how many were removed
    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

/// Read and decode a JSON value
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Decode {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Encode and write a JSON value
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.put(key, raw, ttl).await
}
