//! Precedence merge and placeholder generation
//!
//! Layers, lowest to highest: generated defaults < on-chain < token URI < API.
//! `total_supply` is the exception: the on-chain value always wins.

use crate::models::{ContractId, PartialMetadata, TokenCacheData, SIP10_TYPE};
use chrono::Utc;

pub const DEFAULT_DECIMALS: u8 = 6;

/// Merge the real source layers (no placeholders yet)
pub fn merge_layers(
    onchain: PartialMetadata,
    uri: PartialMetadata,
    api: PartialMetadata,
) -> PartialMetadata {
    let onchain_supply = onchain.total_supply;
    let mut merged = onchain.overlay(uri).overlay(api);
    if onchain_supply.is_some() {
        merged.total_supply = onchain_supply;
    }
    merged
}

/// True when no real source named the token
pub fn lacks_identity(merged: &PartialMetadata) -> bool {
    merged.name.is_none() && merged.symbol.is_none()
}

/// Generated stand-ins for fields no source supplied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    image_base: String,
}

impl Placeholders {
    pub fn new(image_base: impl Into<String>) -> Self {
        Self {
            image_base: image_base.into(),
        }
    }

    /// `"my-token"` → `"My Token"`
    pub fn name(&self, contract_id: &ContractId) -> String {
        title_case(contract_id.contract_name())
    }

    /// Initials of a multi-word name, else the first four characters
    pub fn symbol(&self, name: &str) -> String {
        let words: Vec<&str> = name
            .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
            .filter(|w| !w.is_empty())
            .collect();
        let symbol: String = if words.len() > 1 {
            words.iter().filter_map(|w| w.chars().next()).collect()
        } else {
            name.chars().filter(|c| c.is_alphanumeric()).take(4).collect()
        };
        let symbol = symbol.to_uppercase();
        if symbol.is_empty() {
            "TKN".to_string()
        } else {
            symbol
        }
    }

    pub fn description(&self, name: &str, symbol: &str) -> String {
        format!("{} ({}) token on Stacks", name, symbol)
    }

    pub fn image(&self, symbol: &str) -> String {
        format!("{}{}", self.image_base, symbol)
    }

    pub fn is_placeholder_image(&self, image: &str) -> bool {
        image.starts_with(&self.image_base)
    }

    pub fn is_placeholder_description(&self, data: &TokenCacheData) -> bool {
        data.description
            .as_deref()
            .is_some_and(|d| d == self.description(&data.name, &data.symbol))
    }

    /// Fill every missing field and produce the cacheable record
    pub fn apply(&self, contract_id: &ContractId, merged: PartialMetadata) -> TokenCacheData {
        let name = merged.name.unwrap_or_else(|| self.name(contract_id));
        let symbol = merged.symbol.unwrap_or_else(|| self.symbol(&name));
        let description = merged
            .description
            .unwrap_or_else(|| self.description(&name, &symbol));
        let image = merged.image.unwrap_or_else(|| self.image(&symbol));

        TokenCacheData {
            contract_id: contract_id.clone(),
            decimals: merged.decimals.unwrap_or(DEFAULT_DECIMALS),
            identifier: merged.identifier,
            description: Some(description),
            image: Some(image),
            token_uri: merged.token_uri,
            token_type: merged.token_type.unwrap_or_else(|| SIP10_TYPE.to_string()),
            total_supply: merged.total_supply,
            properties: merged.properties,
            last_updated: Utc::now(),
            name,
            symbol,
        }
    }
}

fn title_case(raw: &str) -> String {
    raw.split(|c: char| c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
