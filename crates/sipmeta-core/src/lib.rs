//! sipmeta-core - Core library for sipmeta
//!
//! Fetches SIP-010 token metadata from several sources, merges it, and
//! caches the result in a TTL-bounded key-value store.

pub mod clarity;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod fetcher;
pub mod maintenance;
pub mod models;
pub mod registry;
pub mod service;
pub mod sources;
pub mod store;

pub use config::Config;
pub use context::AppContext;
pub use error::{MetadataError, Result};
pub use event::{EventBus, TokenEvent};
pub use fetcher::{MetadataFetcher, TokenFetcher};
pub use models::{ContractId, TokenCacheData};
pub use registry::TokenRegistry;
pub use service::{RefreshOutcome, TokenService};
pub use store::KvStore;
