//! Remote metadata API client: `GET {base}/api/metadata/<contractId>`

use super::{join_url, MetadataApi};
use crate::error::{MetadataError, Result};
use crate::models::{ContractId, PartialMetadata};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

pub struct HttpMetadataApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMetadataApi {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url_for(&self, contract_id: &ContractId) -> Result<String> {
        join_url(&self.base_url, &format!("api/metadata/{}", contract_id))
    }
}

#[async_trait]
impl MetadataApi for HttpMetadataApi {
    async fn fetch(&self, contract_id: &ContractId) -> Result<Option<PartialMetadata>> {
        let url = self.url_for(contract_id)?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MetadataError::http(&url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(contract_id = %contract_id, "Metadata API has no document");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(MetadataError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| MetadataError::http(&url, e))?;
        let doc: Value = serde_json::from_str(&body).map_err(|e| MetadataError::InvalidJson {
            url: url.clone(),
            message: e.to_string(),
        })?;
        if !doc.is_object() {
            return Err(MetadataError::InvalidJson {
                url,
                message: "expected a JSON object".to_string(),
            });
        }

        let meta = PartialMetadata::from_json(&doc);
        Ok((!meta.is_empty()).then_some(meta))
    }
}
