//! Stacks node client for SIP-010 read-only calls
//!
//! `POST /v2/contracts/call-read/<addr>/<name>/<fn>` answers
//! `{"okay": true, "result": "0x..."}` or `{"okay": false, "cause": "..."}`.

use super::{join_url, ChainReader};
use crate::clarity::{ClarityError, ClarityValue};
use crate::error::{MetadataError, Result};
use crate::models::{ContractId, TokenSupply};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct CallReadRequest<'a> {
    sender: &'a str,
    arguments: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CallReadResponse {
    okay: bool,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    cause: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContractInterface {
    #[serde(default)]
    fungible_tokens: Vec<FungibleTokenDecl>,
}

#[derive(Debug, Deserialize)]
struct FungibleTokenDecl {
    name: String,
}

pub struct StacksChainReader {
    client: reqwest::Client,
    base_url: String,
}

impl StacksChainReader {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Call a zero-argument read-only function and unwrap its `(ok ...)`
    async fn call_read(&self, contract_id: &ContractId, function: &str) -> Result<ClarityValue> {
        let url = join_url(
            &self.base_url,
            &format!(
                "v2/contracts/call-read/{}/{}/{}",
                contract_id.address(),
                contract_id.contract_name(),
                function
            ),
        )?;
        let body = CallReadRequest {
            sender: contract_id.address(),
            arguments: Vec::new(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MetadataError::http(&url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status {
                url,
                status: status.as_u16(),
            });
        }
        let reply: CallReadResponse = response
            .json()
            .await
            .map_err(|e| MetadataError::InvalidJson {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let unexpected = |source: ClarityError| MetadataError::UnexpectedValue {
            contract_id: contract_id.to_string(),
            function: function.to_string(),
            source,
        };

        match (reply.okay, reply.result) {
            (true, Some(hex)) => {
                let value = ClarityValue::from_hex(&hex).map_err(unexpected)?;
                debug!(contract_id = %contract_id, function, value = %value, "Read-only call");
                value.into_ok().map_err(unexpected)
            }
            (_, _) => Err(MetadataError::ReadOnlyCall {
                contract_id: contract_id.to_string(),
                function: function.to_string(),
                cause: reply.cause.unwrap_or_else(|| "no result".to_string()),
            }),
        }
    }

    async fn call_string(&self, contract_id: &ContractId, function: &str) -> Result<Option<String>> {
        let value = self.call_read(contract_id, function).await?;
        let Some(value) = value.into_optional() else {
            return Ok(None);
        };
        let s = value
            .into_string()
            .map_err(|source| MetadataError::UnexpectedValue {
                contract_id: contract_id.to_string(),
                function: function.to_string(),
                source,
            })?;
        let s = s.trim();
        Ok((!s.is_empty()).then(|| s.to_string()))
    }

    async fn call_uint(&self, contract_id: &ContractId, function: &str) -> Result<Option<u128>> {
        let value = self.call_read(contract_id, function).await?;
        value
            .into_optional()
            .map(|v| v.into_u128())
            .transpose()
            .map_err(|source| MetadataError::UnexpectedValue {
                contract_id: contract_id.to_string(),
                function: function.to_string(),
                source,
            })
    }
}

#[async_trait]
impl ChainReader for StacksChainReader {
    async fn token_uri(&self, contract_id: &ContractId) -> Result<Option<String>> {
        self.call_string(contract_id, "get-token-uri").await
    }

    async fn name(&self, contract_id: &ContractId) -> Result<Option<String>> {
        self.call_string(contract_id, "get-name").await
    }

    async fn symbol(&self, contract_id: &ContractId) -> Result<Option<String>> {
        self.call_string(contract_id, "get-symbol").await
    }

    async fn decimals(&self, contract_id: &ContractId) -> Result<Option<u8>> {
        let Some(value) = self.call_uint(contract_id, "get-decimals").await? else {
            return Ok(None);
        };
        u8::try_from(value)
            .map(Some)
            .map_err(|_| MetadataError::OutOfRange {
                contract_id: contract_id.to_string(),
                function: "get-decimals".to_string(),
                value,
                target: "u8",
            })
    }

    async fn total_supply(&self, contract_id: &ContractId) -> Result<Option<TokenSupply>> {
        Ok(self
            .call_uint(contract_id, "get-total-supply")
            .await?
            .map(TokenSupply))
    }

    async fn identifier(&self, contract_id: &ContractId) -> Result<Option<String>> {
        let url = join_url(
            &self.base_url,
            &format!(
                "v2/contracts/interface/{}/{}",
                contract_id.address(),
                contract_id.contract_name()
            ),
        )?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MetadataError::http(&url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status {
                url,
                status: status.as_u16(),
            });
        }
        let interface: ContractInterface =
            response
                .json()
                .await
                .map_err(|e| MetadataError::InvalidJson {
                    url: url.clone(),
                    message: e.to_string(),
                })?;

        Ok(interface.fungible_tokens.into_iter().next().map(|ft| ft.name))
    }
}
