//! Data models for sipmeta

pub mod contract_id;
pub mod token;

pub use contract_id::{ContractId, ContractIdError, NATIVE_STX};
pub use token::{PartialMetadata, TokenCacheData, TokenSupply, SIP10_TYPE};
