//! Error types for sipmeta-core
//!
//! Source failures are recoverable: the fetcher logs them and degrades to
//! whatever other sources answered. Only store and configuration errors
//! surface to callers unchanged.

use crate::clarity::ClarityError;
use crate::models::ContractIdError;
use crate::store::StoreError;
use thiserror::Error;

/// Core error type for sipmeta operations
#[derive(Error, Debug)]
pub enum MetadataError {
    // ===================
    // Network Errors
    // ===================
    #[error("Request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid JSON from {url}: {message}")]
    InvalidJson { url: String, message: String },

    #[error("Unsupported token URI scheme: {uri}")]
    UnsupportedUri { uri: String },

    // ===================
    // Contract Errors
    // ===================
    #[error("Read-only call {function} on {contract_id} failed: {cause}")]
    ReadOnlyCall {
        contract_id: String,
        function: String,
        cause: String,
    },

    #[error("Unexpected result from {function} on {contract_id}")]
    UnexpectedValue {
        contract_id: String,
        function: String,
        #[source]
        source: ClarityError,
    },

    #[error("{function} on {contract_id} returned {value}, which does not fit {target}")]
    OutOfRange {
        contract_id: String,
        function: String,
        value: u128,
        target: &'static str,
    },

    // ===================
    // Pipeline Errors
    // ===================
    #[error("All metadata sources failed for {contract_id}: {failures}")]
    AllSourcesFailed {
        contract_id: String,
        failures: String,
    },

    #[error("{contract_id} is blacklisted")]
    Blacklisted { contract_id: String },

    #[error(transparent)]
    InvalidContractId(#[from] ContractIdError),

    // ===================
    // Store Errors
    // ===================
    #[error(transparent)]
    Store(#[from] StoreError),

    // ===================
    // Config Errors
    // ===================
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl MetadataError {
    /// Wrap a reqwest error with the URL being requested
    pub fn http(url: impl Into<String>, source: reqwest::Error) -> Self {
        MetadataError::Http {
            url: url.into(),
            source,
        }
    }

    /// True when the failure came from a remote source rather than local state
    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            MetadataError::Http { .. }
                | MetadataError::Status { .. }
                | MetadataError::InvalidJson { .. }
                | MetadataError::UnsupportedUri { .. }
                | MetadataError::ReadOnlyCall { .. }
                | MetadataError::UnexpectedValue { .. }
                | MetadataError::OutOfRange { .. }
                | MetadataError::AllSourcesFailed { .. }
        )
    }
}

pub type Result<T, E = MetadataError> = std::result::Result<T, E>;
