//! Metadata sources queried by the fetcher
//!
//! Each source is a trait so the merge pipeline can be exercised against
//! in-process fakes. The HTTP implementations share one reqwest client.

mod api;
mod chain;
mod token_uri;

pub use api::HttpMetadataApi;
pub use chain::StacksChainReader;
pub use token_uri::{gateway_url, HttpTokenUriResolver};

use crate::error::{MetadataError, Result};
use crate::models::{ContractId, PartialMetadata, TokenSupply};
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!("sipmeta/", env!("CARGO_PKG_VERSION"));

/// Remote metadata REST API
#[async_trait]
pub trait MetadataApi: Send + Sync {
    /// `Ok(None)` when the API has no document for this token
    async fn fetch(&self, contract_id: &ContractId) -> Result<Option<PartialMetadata>>;
}

/// SIP-010 read-only contract calls
///
/// `Ok(None)` means the contract answered but had nothing useful
/// (`none`, an empty string, or no fungible token declared).
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn token_uri(&self, contract_id: &ContractId) -> Result<Option<String>>;
    async fn name(&self, contract_id: &ContractId) -> Result<Option<String>>;
    async fn symbol(&self, contract_id: &ContractId) -> Result<Option<String>>;
    async fn decimals(&self, contract_id: &ContractId) -> Result<Option<u8>>;
    async fn total_supply(&self, contract_id: &ContractId) -> Result<Option<TokenSupply>>;
    /// Fungible-token asset name from the contract interface
    async fn identifier(&self, contract_id: &ContractId) -> Result<Option<String>>;
}

/// Token-URI JSON documents (SIP-016)
#[async_trait]
pub trait TokenUriResolver: Send + Sync {
    async fn resolve(&self, uri: &str) -> Result<Option<PartialMetadata>>;
}

/// Shared HTTP client for all sources
pub fn build_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| MetadataError::InvalidConfig {
        message: format!("failed to build HTTP client: {}", e),
    })
}

/// Parse a base URL so that `join` appends to its path instead of
/// replacing the last segment
pub(crate) fn base_url(base: &str) -> std::result::Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Resolve a relative path against a configured base URL
pub(crate) fn join_url(base: &str, path: &str) -> Result<String> {
    base_url(base)
        .and_then(|url| url.join(path.trim_start_matches('/')))
        .map(String::from)
        .map_err(|e| MetadataError::InvalidConfig {
            message: format!("cannot join '{}' onto base URL '{}': {}", path, base, e),
        })
}
