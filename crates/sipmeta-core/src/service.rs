//! Token service: read-through cache over the metadata fetcher
//!
//! - `get`: store hit returns immediately; a miss fetches, writes with TTL
//!   and returns. A fetch error on a miss yields None.
//! - `force_refresh`: always fetches and overwrites; on failure the stale
//!   record (if any) is returned untouched.
//!
//! Concurrent misses (and concurrent refreshes) of the same token share one
//! in-flight fetch+write.

use crate::error::{MetadataError, Result};
use crate::event::{EventBus, TokenEvent};
use crate::fetcher::TokenFetcher;
use crate::models::{ContractId, TokenCacheData};
use crate::registry::TokenRegistry;
use crate::store::{load_json, metadata_key, save_json, token_key, KvStore, TOKEN_PREFIX};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Default record lifetime (30 days)
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Shortest lifetime a patched record is written with
const MIN_PATCH_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// What a refresh produced
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Fetched and written
    Fresh(TokenCacheData),
    /// Fetch failed; the previous record was kept
    Stale(TokenCacheData),
    /// Fetch failed and nothing was stored
    Missing,
}

impl RefreshOutcome {
    pub fn into_option(self) -> Option<TokenCacheData> {
        match self {
            RefreshOutcome::Fresh(data) | RefreshOutcome::Stale(data) => Some(data),
            RefreshOutcome::Missing => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FlightKind {
    Get,
    Refresh,
}

type Flight = Arc<OnceCell<RefreshOutcome>>;

pub struct TokenService {
    store: Arc<dyn KvStore>,
    fetcher: Arc<dyn TokenFetcher>,
    registry: TokenRegistry,
    events: EventBus,
    ttl: Duration,
    flights: DashMap<(FlightKind, ContractId), Flight>,
}

impl TokenService {
    pub fn new(
        store: Arc<dyn KvStore>,
        fetcher: Arc<dyn TokenFetcher>,
        registry: TokenRegistry,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            fetcher,
            registry,
            events,
            ttl: DEFAULT_TTL,
            flights: DashMap::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Read-through lookup
    pub async fn get(&self, contract_id: &ContractId) -> Result<Option<TokenCacheData>> {
        if let Some(data) = self.cached(contract_id).await {
            self.events.publish(TokenEvent::CacheHit(contract_id.clone()));
            return Ok(Some(data));
        }
        if self.registry.is_blacklisted(contract_id).await? {
            debug!(contract_id = %contract_id, "Blacklisted token not fetched");
            self.events.publish(TokenEvent::Blacklisted(contract_id.clone()));
            return Ok(None);
        }

        self.events.publish(TokenEvent::CacheMiss(contract_id.clone()));
        let outcome = self
            .single_flight(FlightKind::Get, contract_id, || async {
                // A flight that just finished may have filled the cache
                if let Some(data) = self.cached(contract_id).await {
                    return RefreshOutcome::Fresh(data);
                }
                match self.fetch_and_store(contract_id).await {
                    Some(data) => RefreshOutcome::Fresh(data),
                    None => RefreshOutcome::Missing,
                }
            })
            .await;
        Ok(outcome.into_option())
    }

    /// Bypass the cache read, fetch and overwrite
    pub async fn force_refresh(&self, contract_id: &ContractId) -> Result<Option<TokenCacheData>> {
        Ok(self.refresh(contract_id).await?.into_option())
    }

    /// Like `force_refresh` but tells fresh data apart from a stale fallback
    pub async fn refresh(&self, contract_id: &ContractId) -> Result<RefreshOutcome> {
        if self.registry.is_blacklisted(contract_id).await? {
            self.events.publish(TokenEvent::Blacklisted(contract_id.clone()));
            return Err(MetadataError::Blacklisted {
                contract_id: contract_id.to_string(),
            });
        }

        let outcome = self
            .single_flight(FlightKind::Refresh, contract_id, || async {
                if let Some(data) = self.fetch_and_store(contract_id).await {
                    return RefreshOutcome::Fresh(data);
                }
                match self.cached(contract_id).await {
                    Some(stale) => {
                        info!(contract_id = %contract_id, "Refresh failed, serving stale record");
                        self.events.publish(TokenEvent::StaleServed(contract_id.clone()));
                        RefreshOutcome::Stale(stale)
                    }
                    None => RefreshOutcome::Missing,
                }
            })
            .await;
        Ok(outcome)
    }

    /// Stored record without fetching; read errors count as absent
    pub async fn cached(&self, contract_id: &ContractId) -> Option<TokenCacheData> {
        match load_json(&*self.store, &token_key(contract_id.as_str())).await {
            Ok(data) => data,
            Err(e) => {
                warn!(contract_id = %contract_id, error = %e, "Store read failed, treating as miss");
                None
            }
        }
    }

    /// Write a maintenance patch without refetching. The record keeps its
    /// `last_updated` and only the lifetime it had left, never less than a
    /// day (or the full TTL, if that is shorter).
    pub async fn put(&self, data: &TokenCacheData) -> Result<()> {
        let ttl = self.remaining_ttl(data);
        save_json(&*self.store, &token_key(data.contract_id.as_str()), data, Some(ttl)).await?;
        Ok(())
    }

    fn remaining_ttl(&self, data: &TokenCacheData) -> Duration {
        let age = (Utc::now() - data.last_updated).to_std().unwrap_or(Duration::ZERO);
        self.ttl.saturating_sub(age).max(MIN_PATCH_TTL.min(self.ttl))
    }

    pub async fn invalidate(&self, contract_id: &ContractId) -> Result<bool> {
        Ok(self.store.delete(&token_key(contract_id.as_str())).await?)
    }

    /// IDs with a live cached record
    pub async fn cached_ids(&self) -> Result<Vec<ContractId>> {
        let keys = self.store.keys(TOKEN_PREFIX).await?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                let raw = key.strip_prefix(TOKEN_PREFIX)?;
                match ContractId::parse(raw) {
                    Ok(id) => Some(id),
                    Err(e) => {
                        warn!(key = %key, error = %e, "Skipping malformed cache key");
                        None
                    }
                }
            })
            .collect())
    }

    /// Metadata document served at `/api/metadata/<id>`
    pub async fn document(&self, contract_id: &ContractId) -> Result<Option<Value>> {
        Ok(load_json(&*self.store, &metadata_key(contract_id.as_str())).await?)
    }

    pub async fn put_document(&self, contract_id: &ContractId, doc: &Value) -> Result<()> {
        save_json(&*self.store, &metadata_key(contract_id.as_str()), doc, None).await?;
        info!(contract_id = %contract_id, "Stored metadata document");
        Ok(())
    }

    /// Fetch and persist; None when the fetch failed or found nothing
    async fn fetch_and_store(&self, contract_id: &ContractId) -> Option<TokenCacheData> {
        let mut data = match self.fetcher.fetch(contract_id).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                self.events.publish(TokenEvent::FetchFailed {
                    contract_id: contract_id.clone(),
                    reason: "no source named the token".to_string(),
                });
                return None;
            }
            Err(e) => {
                warn!(contract_id = %contract_id, error = %e, "Fetch failed");
                self.events.publish(TokenEvent::FetchFailed {
                    contract_id: contract_id.clone(),
                    reason: e.to_string(),
                });
                return None;
            }
        };

        data.last_updated = Utc::now();
        if let Err(e) = save_json(&*self.store, &token_key(contract_id.as_str()), &data, Some(self.ttl)).await {
            warn!(contract_id = %contract_id, error = %e, "Store write failed, returning unsaved record");
        }
        self.events.publish(TokenEvent::Refreshed(contract_id.clone()));
        Some(data)
    }

    async fn single_flight<F, Fut>(&self, kind: FlightKind, contract_id: &ContractId, init: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = RefreshOutcome>,
    {
        let key = (kind, contract_id.clone());
        // The entry guard must drop before awaiting
        let flight = self
            .flights
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let outcome = flight.get_or_init(init).await.clone();

        self.flights.remove_if(&key, |_, f| Arc::ptr_eq(f, &flight));
        outcome
    }
}
