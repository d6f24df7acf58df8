//! Contract identifier newtype
//!
//! A fungible token is identified by the contract that deploys it:
//! `<address>.<contract-name>`. The native token uses the literal `.stx`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier used for the native STX token
pub const NATIVE_STX: &str = ".stx";

/// Maximum contract name length accepted by the Stacks node
const MAX_CONTRACT_NAME_LEN: usize = 128;

/// Stacks principal: `S` + version char + c32 payload (no I, L, O, U)
static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^S[PMTN][0-9A-HJKMNP-TV-Z]{38,40}$").expect("valid address regex"));

static CONTRACT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]*$").expect("valid contract name regex"));

/// Reasons a contract identifier is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractIdError {
    #[error("contract id is empty")]
    Empty,

    #[error("contract id '{0}' is missing the '.' separator")]
    MissingSeparator(String),

    #[error("invalid Stacks address '{0}'")]
    InvalidAddress(String),

    #[error("invalid contract name '{0}'")]
    InvalidContractName(String),
}

/// Validated `<address>.<contract-name>` identifier (or `.stx`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractId(String);

impl ContractId {
    /// Parse and validate a contract identifier
    pub fn parse(raw: &str) -> Result<Self, ContractIdError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ContractIdError::Empty);
        }
        if raw == NATIVE_STX {
            return Ok(Self::native());
        }

        let (address, name) = raw
            .split_once('.')
            .ok_or_else(|| ContractIdError::MissingSeparator(raw.to_string()))?;

        if !ADDRESS_RE.is_match(address) {
            return Err(ContractIdError::InvalidAddress(address.to_string()));
        }
        if name.len() > MAX_CONTRACT_NAME_LEN || !CONTRACT_NAME_RE.is_match(name) {
            return Err(ContractIdError::InvalidContractName(name.to_string()));
        }

        Ok(Self(raw.to_string()))
    }

    /// The native STX token identifier
    pub fn native() -> Self {
        Self(NATIVE_STX.to_string())
    }

    /// True for `.stx`
    pub fn is_native(&self) -> bool {
        self.0 == NATIVE_STX
    }

    /// Deployer address (empty for the native token)
    pub fn address(&self) -> &str {
        self.0.split_once('.').map(|(a, _)| a).unwrap_or_default()
    }

    /// Contract name (`stx` for the native token)
    pub fn contract_name(&self) -> &str {
        self.0.split_once('.').map(|(_, n)| n).unwrap_or_default()
    }

    /// Get reference to inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract inner String, consuming self
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContractId {
    type Err = ContractIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContractId {
    type Error = ContractIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContractId> for String {
    fn from(id: ContractId) -> Self {
        id.into_inner()
    }
}

impl AsRef<str> for ContractId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContractId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
