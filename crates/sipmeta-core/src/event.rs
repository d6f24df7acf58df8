//! Event bus for token cache activity using tokio::broadcast
//!
//! The HTTP server and maintenance jobs subscribe to observe hits, misses
//! and refreshes without coupling to the service internals.

use crate::models::ContractId;
use tokio::sync::broadcast;

/// Events emitted by the token service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    /// Served from the store without fetching
    CacheHit(ContractId),
    /// Not in the store; a fetch follows
    CacheMiss(ContractId),
    /// A fresh record was fetched and written
    Refreshed(ContractId),
    /// Every source failed or returned nothing
    FetchFailed { contract_id: ContractId, reason: String },
    /// A refresh failed and the previous record was returned
    StaleServed(ContractId),
    /// A refresh was refused because the token is blacklisted
    Blacklisted(ContractId),
}

impl TokenEvent {
    pub fn contract_id(&self) -> &ContractId {
        match self {
            TokenEvent::CacheHit(id)
            | TokenEvent::CacheMiss(id)
            | TokenEvent::Refreshed(id)
            | TokenEvent::StaleServed(id)
            | TokenEvent::Blacklisted(id) => id,
            TokenEvent::FetchFailed { contract_id, .. } => contract_id,
        }
    }

    /// Stable snake_case name, used as the SSE event type
    pub fn kind(&self) -> &'static str {
        match self {
            TokenEvent::CacheHit(_) => "cache_hit",
            TokenEvent::CacheMiss(_) => "cache_miss",
            TokenEvent::Refreshed(_) => "refreshed",
            TokenEvent::FetchFailed { .. } => "fetch_failed",
            TokenEvent::StaleServed(_) => "stale_served",
            TokenEvent::Blacklisted(_) => "blacklisted",
        }
    }
}

/// Event bus for broadcasting token events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TokenEvent>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create with default capacity (256 events)
    pub fn default_capacity() -> Self {
        Self::new(256)
    }

    pub fn publish(&self, event: TokenEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TokenEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::default_capacity()
    }
}
