//! Token metadata records
//!
//! `TokenCacheData` is the merged, cached record. `PartialMetadata` is what a
//! single source (API, token URI, contract calls) contributes before merging.

use super::contract_id::ContractId;
use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Default token standard tag
pub const SIP10_TYPE: &str = "SIP10";

/// Total supply in base units
///
/// Serialized as a decimal string so values beyond 2^53 survive JSON
/// consumers. Older records stored it as a JSON number; both forms are
/// accepted on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenSupply(pub u128);

impl TokenSupply {
    pub fn get(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for TokenSupply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenSupply {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u128>().map(TokenSupply)
    }
}

impl From<u128> for TokenSupply {
    fn from(v: u128) -> Self {
        Self(v)
    }
}

impl Serialize for TokenSupply {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

struct SupplyVisitor;

impl<'de> Visitor<'de> for SupplyVisitor {
    type Value = TokenSupply;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(TokenSupply(v as u128))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<Self::Value, E> {
        Ok(TokenSupply(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u128::try_from(v)
            .map(TokenSupply)
            .map_err(|_| E::custom(format!("negative supply {}", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if v.is_finite() && v >= 0.0 && v.fract() == 0.0 {
            Ok(TokenSupply(v as u128))
        } else {
            Err(E::custom(format!("supply {} is not a whole number", v)))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse::<TokenSupply>()
            .map_err(|e| E::custom(format!("invalid supply '{}': {}", v, e)))
    }
}

impl<'de> Deserialize<'de> for TokenSupply {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SupplyVisitor)
    }
}

fn default_token_type() -> String {
    SIP10_TYPE.to_string()
}

/// Display metadata for one fungible token (the cached record)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCacheData {
    #[serde(rename = "contractId")]
    pub contract_id: ContractId,

    pub name: String,

    pub symbol: String,

    pub decimals: u8,

    /// Fungible-token asset name declared by the contract
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// URI returned by `get-token-uri`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,

    #[serde(rename = "type", default = "default_token_type")]
    pub token_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_supply: Option<TokenSupply>,

    /// Free-form properties passed through from metadata documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,

    #[serde(rename = "lastUpdated", default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl TokenCacheData {
    /// Hard-coded record for the native STX token
    pub fn native_stx() -> Self {
        Self {
            contract_id: ContractId::native(),
            name: "Stacks".to_string(),
            symbol: "STX".to_string(),
            decimals: 6,
            identifier: Some("STX".to_string()),
            description: Some("The native token of the Stacks blockchain".to_string()),
            image: Some("https://assets.stacks.co/stx-logo.png".to_string()),
            token_uri: None,
            token_type: default_token_type(),
            total_supply: None,
            properties: None,
            last_updated: Utc::now(),
        }
    }

    /// Supply formatted with the token's decimals (e.g. `1234.5`)
    pub fn display_supply(&self) -> Option<String> {
        let supply = self.total_supply?.get();
        if self.decimals == 0 {
            return Some(supply.to_string());
        }
        let scale = 10u128.checked_pow(self.decimals as u32)?;
        let whole = supply / scale;
        let frac = supply % scale;
        if frac == 0 {
            return Some(whole.to_string());
        }
        let frac = format!("{:0width$}", frac, width = self.decimals as usize);
        Some(format!("{}.{}", whole, frac.trim_end_matches('0')))
    }
}

/// Metadata contributed by a single source; every field optional
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialMetadata {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub token_uri: Option<String>,
    pub token_type: Option<String>,
    pub total_supply: Option<TokenSupply>,
    pub properties: Option<Map<String, Value>>,
}

impl PartialMetadata {
    /// Lay `other` on top of `self`: every field present in `other` wins
    pub fn overlay(mut self, other: PartialMetadata) -> Self {
        macro_rules! take {
            ($($field:ident),*) => {
                $( if other.$field.is_some() { self.$field = other.$field; } )*
            };
        }
        take!(
            name,
            symbol,
            decimals,
            identifier,
            description,
            image,
            token_uri,
            token_type,
            total_supply,
            properties
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Lenient extraction from a metadata JSON document
    ///
    /// Accepts the remote API shape and SIP-016 token-URI documents, where
    /// `symbol`/`decimals`/`total_supply` may sit under `properties` and
    /// the image may be called `image_uri`/`image_url`.
    pub fn from_json(doc: &Value) -> Self {
        let properties = doc.get("properties").and_then(Value::as_object);
        let lookup = |key: &str| {
            doc.get(key)
                .filter(|v| !v.is_null())
                .or_else(|| properties.and_then(|p| p.get(key)).filter(|v| !v.is_null()))
        };
        let string = |key: &str| {
            lookup(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let decimals = lookup("decimals").and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        });

        let total_supply = lookup("total_supply")
            .or_else(|| lookup("totalSupply"))
            .and_then(|v| serde_json::from_value::<TokenSupply>(v.clone()).ok());

        let image = ["image", "image_uri", "image_url", "imageUrl"]
            .into_iter()
            .find_map(|k| string(k));

        Self {
            name: string("name"),
            symbol: string("symbol"),
            decimals: decimals.and_then(|d| u8::try_from(d).ok()),
            identifier: string("identifier"),
            description: string("description"),
            image,
            token_uri: None,
            token_type: doc
                .get("type")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            total_supply,
            properties: properties.cloned(),
        }
    }
}

impl From<&TokenCacheData> for PartialMetadata {
    fn from(data: &TokenCacheData) -> Self {
        Self {
            name: Some(data.name.clone()),
            symbol: Some(data.symbol.clone()),
            decimals: Some(data.decimals),
            identifier: data.identifier.clone(),
            description: data.description.clone(),
            image: data.image.clone(),
            token_uri: data.token_uri.clone(),
            token_type: Some(data.token_type.clone()),
            total_supply: data.total_supply,
            properties: data.properties.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_supply_accepts_number_and_string() {
        let a: TokenSupply = serde_json::from_value(json!(1000)).unwrap();
        let b: TokenSupply = serde_json::from_value(json!("1000")).unwrap();
        let c: TokenSupply = serde_json::from_value(json!(1e21)).unwrap();
        assert_eq!(a, b);
        assert_eq!(c.get(), 1_000_000_000_000_000_000_000);
        assert!(serde_json::from_value::<TokenSupply>(json!(-5)).is_err());
        assert!(serde_json::from_value::<TokenSupply>(json!(1.5)).is_err());
    }

    #[test]
    fn test_supply_serializes_as_string() {
        let supply = TokenSupply(340_282_366_920_938_463_463_374_607_431_768_211_455);
        assert_eq!(
            serde_json::to_value(supply).unwrap(),
            json!("340282366920938463463374607431768211455")
        );
    }

    #[test]
    fn test_token_cache_data_wire_names() {
        let data = TokenCacheData::native_stx();
        let v = serde_json::to_value(&data).unwrap();
        assert_eq!(v["contractId"], ".stx");
        assert_eq!(v["type"], "SIP10");
        assert!(v.get("lastUpdated").is_some());
        assert!(v.get("total_supply").is_none());
    }

    #[test]
    fn test_legacy_record_with_numeric_supply() {
        let v = json!({
            "contractId": "SP2ZNGJ85ENDY6QRHQ5P2D4FXKGZWCKTB2T0Z55KS.charisma-token",
            "name": "Charisma",
            "symbol": "CHA",
            "decimals": 6,
            "total_supply": 1000000000
        });
        let data: TokenCacheData = serde_json::from_value(v).unwrap();
        assert_eq!(data.total_supply, Some(TokenSupply(1_000_000_000)));
        assert_eq!(data.token_type, SIP10_TYPE);
    }

    #[test]
    fn test_display_supply() {
        let mut data = TokenCacheData::native_stx();
        data.total_supply = Some(TokenSupply(1_818_000_500_000));
        assert_eq!(data.display_supply().as_deref(), Some("1818000.5"));
        data.total_supply = Some(TokenSupply(2_000_000));
        assert_eq!(data.display_supply().as_deref(), Some("2"));
    }

    #[test]
    fn test_overlay_prefers_present_fields() {
        let base = PartialMetadata {
            name: Some("base".into()),
            symbol: Some("B".into()),
            ..Default::default()
        };
        let top = PartialMetadata {
            name: Some("top".into()),
            decimals: Some(8),
            ..Default::default()
        };
        let merged = base.overlay(top);
        assert_eq!(merged.name.as_deref(), Some("top"));
        assert_eq!(merged.symbol.as_deref(), Some("B"));
        assert_eq!(merged.decimals, Some(8));
    }

    #[test]
    fn test_from_json_sip016_document() {
        let doc = json!({
            "sip": 16,
            "name": "Welsh",
            "description": "  ",
            "image_uri": "ipfs://bafy/welsh.png",
            "properties": { "symbol": "WELSH", "decimals": "6", "total_supply": 10000000000u64 }
        });
        let meta = PartialMetadata::from_json(&doc);
        assert_eq!(meta.name.as_deref(), Some("Welsh"));
        assert_eq!(meta.symbol.as_deref(), Some("WELSH"));
        assert_eq!(meta.decimals, Some(6));
        assert_eq!(meta.description, None);
        assert_eq!(meta.image.as_deref(), Some("ipfs://bafy/welsh.png"));
        assert_eq!(meta.total_supply, Some(TokenSupply(10_000_000_000)));
        assert!(meta.properties.is_some());
    }

    #[test]
    fn test_from_json_rejects_out_of_range_decimals() {
        let meta = PartialMetadata::from_json(&json!({ "decimals": 4096 }));
        assert_eq!(meta.decimals, None);
        assert!(meta.name.is_none());
    }
}
