//! Image reachability check used by `audit-images`

use crate::error::{MetadataError, Result};
use crate::sources::gateway_url;
use async_trait::async_trait;

#[async_trait]
pub trait ImageProbe: Send + Sync {
    /// HTTP status of a HEAD request to the image
    async fn status(&self, url: &str) -> Result<u16>;
}

pub struct HttpImageProbe {
    client: reqwest::Client,
    gateway: String,
}

impl HttpImageProbe {
    pub fn new(client: reqwest::Client, gateway: impl Into<String>) -> Self {
        Self {
            client,
            gateway: gateway.into(),
        }
    }
}

#[async_trait]
impl ImageProbe for HttpImageProbe {
    async fn status(&self, url: &str) -> Result<u16> {
        let target = gateway_url(url, &self.gateway).ok_or_else(|| MetadataError::UnsupportedUri {
            uri: url.to_string(),
        })?;
        let response = self
            .client
            .head(&target)
            .send()
            .await
            .map_err(|e| MetadataError::http(&target, e))?;
        Ok(response.status().as_u16())
    }
}
