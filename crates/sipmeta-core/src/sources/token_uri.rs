//! Token-URI resolution
//!
//! Supported forms:
//! - `http(s)://...` fetched as-is
//! - `ipfs://<cid>/...` and `ipfs://ipfs/<cid>/...` through the configured gateway
//! - `data:application/json[;base64],...` decoded inline

use super::{base_url, TokenUriResolver};
use crate::error::{MetadataError, Result};
use crate::models::PartialMetadata;
use async_trait::async_trait;
use base64::Engine;
use percent_encoding::percent_decode_str;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

/// Rewrite a URI to something fetchable over HTTP; None for other schemes
pub fn gateway_url(uri: &str, gateway: &str) -> Option<String> {
    let uri = uri.trim();
    // CIDs are case-sensitive, so the ipfs:// form is not run through Url
    if let Some(rest) = uri.strip_prefix("ipfs://") {
        let path = rest.strip_prefix("ipfs/").unwrap_or(rest);
        let joined = base_url(gateway).ok()?.join(path.trim_start_matches('/')).ok()?;
        return Some(joined.into());
    }
    let url = Url::parse(uri).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.into())
}

/// Decode the JSON payload of a `data:` URI
fn decode_data_uri(uri: &str) -> Result<Value> {
    let unsupported = || MetadataError::UnsupportedUri {
        uri: truncate_uri(uri),
    };
    let rest = uri.get(5..).ok_or_else(unsupported)?;
    let (header, payload) = rest.split_once(',').ok_or_else(unsupported)?;

    let mut params = header.split(';');
    let media_type = params.next().unwrap_or_default().trim().to_ascii_lowercase();
    if media_type != "application/json" {
        return Err(unsupported());
    }
    let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| MetadataError::InvalidJson {
                url: truncate_uri(uri),
                message: format!("invalid base64: {}", e),
            })?
    } else {
        percent_decode_str(payload).collect()
    };

    serde_json::from_slice(&bytes).map_err(|e| MetadataError::InvalidJson {
        url: truncate_uri(uri),
        message: e.to_string(),
    })
}

/// Keep data URIs out of logs and error messages
fn truncate_uri(uri: &str) -> String {
    match uri.char_indices().nth(64) {
        Some((idx, _)) => format!("{}...", &uri[..idx]),
        None => uri.to_string(),
    }
}

pub struct HttpTokenUriResolver {
    client: reqwest::Client,
    gateway: String,
}

impl HttpTokenUriResolver {
    pub fn new(client: reqwest::Client, gateway: impl Into<String>) -> Self {
        Self {
            client,
            gateway: gateway.into(),
        }
    }

    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MetadataError::http(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| MetadataError::http(url, e))?;
        serde_json::from_slice(&body).map_err(|e| MetadataError::InvalidJson {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    fn to_metadata(&self, doc: &Value) -> Option<PartialMetadata> {
        if !doc.is_object() {
            return None;
        }
        let mut meta = PartialMetadata::from_json(doc);
        // Images in SIP-016 documents are often ipfs:// too
        if let Some(image) = meta.image.take() {
            meta.image = Some(if image.starts_with("ipfs://") {
                gateway_url(&image, &self.gateway).unwrap_or(image)
            } else {
                image
            });
        }
        (!meta.is_empty()).then_some(meta)
    }
}

#[async_trait]
impl TokenUriResolver for HttpTokenUriResolver {
    async fn resolve(&self, uri: &str) -> Result<Option<PartialMetadata>> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Ok(None);
        }

        if uri.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:")) {
            let doc = decode_data_uri(uri)?;
            return Ok(self.to_metadata(&doc));
        }

        let Some(url) = gateway_url(uri, &self.gateway) else {
            warn!(uri = %truncate_uri(uri), "Unsupported token URI scheme");
            return Ok(None);
        };

        debug!(uri, url = %url, "Resolving token URI");
        let doc = self.fetch_json(&url).await?;
        Ok(self.to_metadata(&doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GATEWAY: &str = "https://ipfs.io/ipfs/";

    fn resolver() -> HttpTokenUriResolver {
        HttpTokenUriResolver::new(reqwest::Client::new(), GATEWAY)
    }

    #[test]
    fn test_gateway_url_rewrites_ipfs() {
        assert_eq!(
            gateway_url("ipfs://bafy123/meta.json", GATEWAY).as_deref(),
            Some("https://ipfs.io/ipfs/bafy123/meta.json")
        );
        assert_eq!(
            gateway_url("ipfs://ipfs/bafy123", "https://gw.example/ipfs").as_deref(),
            Some("https://gw.example/ipfs/bafy123")
        );
        assert_eq!(
            gateway_url("https://x.io/a.json", GATEWAY).as_deref(),
            Some("https://x.io/a.json")
        );
        assert_eq!(gateway_url("ar://abc", GATEWAY), None);
    }

    #[test]
    fn test_gateway_url_rejects_unparseable() {
        assert_eq!(gateway_url("https://", GATEWAY), None);
        assert_eq!(gateway_url("ipfs://bafy123", "not a gateway"), None);
        assert_eq!(
            gateway_url("HTTPS://x.io/a.json", GATEWAY).as_deref(),
            Some("https://x.io/a.json")
        );
    }

    #[tokio::test]
    async fn test_resolve_base64_data_uri() {
        let json = r#"{"name":"Inline","properties":{"symbol":"INL","decimals":8},"image":"ipfs://bafyimg"}"#;
        let encoded = base64::engine::general_purpose::STANDARD.encode(json);
        let uri = format!("data:application/json;base64,{}", encoded);

        let meta = resolver().resolve(&uri).await.unwrap().unwrap();
        assert_eq!(meta.name.as_deref(), Some("Inline"));
        assert_eq!(meta.symbol.as_deref(), Some("INL"));
        assert_eq!(meta.decimals, Some(8));
        assert_eq!(meta.image.as_deref(), Some("https://ipfs.io/ipfs/bafyimg"));
    }

    #[tokio::test]
    async fn test_resolve_plain_data_uri() {
        let uri = "data:application/json,%7B%22name%22%3A%22Plain%22%7D";
        let meta = resolver().resolve(uri).await.unwrap().unwrap();
        assert_eq!(meta.name.as_deref(), Some("Plain"));

        // A stray percent sign is kept literally
        let uri = "data:application/json,%7B%22name%22%3A%22100%%22%7D";
        let meta = resolver().resolve(uri).await.unwrap().unwrap();
        assert_eq!(meta.name.as_deref(), Some("100%"));
    }

    #[tokio::test]
    async fn test_resolve_rejects_other_media_types() {
        let err = resolver()
            .resolve("data:text/plain,hello")
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::UnsupportedUri { .. }));
    }

    #[tokio::test]
    async fn test_resolve_unknown_scheme_is_none() {
        assert!(resolver().resolve("ar://abc").await.unwrap().is_none());
        assert!(resolver().resolve("   ").await.unwrap().is_none());
    }

    #[test]
    fn test_truncate_uri() {
        let long = format!("data:application/json,{}", "x".repeat(200));
        assert!(truncate_uri(&long).len() < 80);
        assert_eq!(truncate_uri("ipfs://a"), "ipfs://a");
    }
}
