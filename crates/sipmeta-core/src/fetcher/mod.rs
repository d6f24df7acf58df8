//! Multi-source metadata fetcher
//!
//! Phase 1 queries the metadata API, the token URI and the on-chain total
//! supply concurrently. Phase 2 issues direct contract calls only for the
//! identity fields phase 1 left empty. Source failures are logged and the
//! remaining sources carry on.

pub mod merge;

pub use merge::{lacks_identity, merge_layers, Placeholders, DEFAULT_DECIMALS};

use crate::error::{MetadataError, Result};
use crate::models::{ContractId, PartialMetadata, TokenCacheData};
use crate::sources::{ChainReader, MetadataApi, TokenUriResolver};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Anything that can produce a merged token record
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// `Ok(None)`: sources answered but none named the token.
    /// `Err`: every attempted source failed.
    async fn fetch(&self, contract_id: &ContractId) -> Result<Option<TokenCacheData>>;
}

/// Per-fetch bookkeeping of which sources answered
#[derive(Default)]
struct SourceLog {
    answered: usize,
    failures: Vec<String>,
}

impl SourceLog {
    fn record<T>(&mut self, contract_id: &ContractId, source: &str, result: Result<Option<T>>) -> Option<T> {
        match result {
            Ok(value) => {
                self.answered += 1;
                value
            }
            Err(e) => {
                warn!(contract_id = %contract_id, source, error = %e, "Metadata source failed");
                self.failures.push(format!("{}: {}", source, e));
                None
            }
        }
    }

    fn record_opt<T>(
        &mut self,
        contract_id: &ContractId,
        source: &str,
        result: Option<Result<Option<T>>>,
    ) -> Option<T> {
        result.and_then(|r| self.record(contract_id, source, r))
    }
}

pub struct MetadataFetcher {
    api: Arc<dyn MetadataApi>,
    chain: Arc<dyn ChainReader>,
    uri: Arc<dyn TokenUriResolver>,
    placeholders: Placeholders,
}

impl MetadataFetcher {
    pub fn new(
        api: Arc<dyn MetadataApi>,
        chain: Arc<dyn ChainReader>,
        uri: Arc<dyn TokenUriResolver>,
        placeholders: Placeholders,
    ) -> Self {
        Self {
            api,
            chain,
            uri,
            placeholders,
        }
    }

    /// `get-token-uri` then resolve; the URI itself is kept even if resolving fails
    async fn token_uri_document(
        &self,
        contract_id: &ContractId,
    ) -> (Result<Option<String>>, Option<Result<Option<PartialMetadata>>>) {
        match self.chain.token_uri(contract_id).await {
            Ok(Some(uri)) => {
                let doc = self.uri.resolve(&uri).await;
                (Ok(Some(uri)), Some(doc))
            }
            other => (other, None),
        }
    }

    async fn fetch_sources(&self, contract_id: &ContractId) -> Result<Option<PartialMetadata>> {
        let mut log = SourceLog::default();

        // Phase 1
        let (api_res, (uri_res, doc_res), supply_res) = tokio::join!(
            self.api.fetch(contract_id),
            self.token_uri_document(contract_id),
            self.chain.total_supply(contract_id),
        );

        let api = log.record(contract_id, "api", api_res).unwrap_or_default();
        let doc = log.record_opt(contract_id, "token-uri-json", doc_res).unwrap_or_default();
        let mut onchain = PartialMetadata {
            token_uri: log.record(contract_id, "get-token-uri", uri_res),
            total_supply: log.record(contract_id, "get-total-supply", supply_res),
            ..Default::default()
        };

        // Phase 2
        let current = merge_layers(onchain.clone(), doc.clone(), api.clone());
        let (name_res, symbol_res, decimals_res, identifier_res) = tokio::join!(
            async {
                match current.name {
                    None => Some(self.chain.name(contract_id).await),
                    Some(_) => None,
                }
            },
            async {
                match current.symbol {
                    None => Some(self.chain.symbol(contract_id).await),
                    Some(_) => None,
                }
            },
            async {
                match current.decimals {
                    None => Some(self.chain.decimals(contract_id).await),
                    Some(_) => None,
                }
            },
            async {
                match current.identifier {
                    None => Some(self.chain.identifier(contract_id).await),
                    Some(_) => None,
                }
            },
        );
        onchain.name = log.record_opt(contract_id, "get-name", name_res);
        onchain.symbol = log.record_opt(contract_id, "get-symbol", symbol_res);
        onchain.decimals = log.record_opt(contract_id, "get-decimals", decimals_res);
        onchain.identifier = log.record_opt(contract_id, "contract-interface", identifier_res);

        if log.answered == 0 && !log.failures.is_empty() {
            return Err(MetadataError::AllSourcesFailed {
                contract_id: contract_id.to_string(),
                failures: log.failures.join("; "),
            });
        }

        let merged = merge_layers(onchain, doc, api);
        if lacks_identity(&merged) {
            debug!(contract_id = %contract_id, "No source named the token");
            return Ok(None);
        }
        Ok(Some(merged))
    }
}

#[async_trait]
impl TokenFetcher for MetadataFetcher {
    async fn fetch(&self, contract_id: &ContractId) -> Result<Option<TokenCacheData>> {
        if contract_id.is_native() {
            return Ok(Some(TokenCacheData::native_stx()));
        }
        let Some(merged) = self.fetch_sources(contract_id).await? else {
            return Ok(None);
        };
        let data = self.placeholders.apply(contract_id, merged);
        debug!(contract_id = %contract_id, name = %data.name, symbol = %data.symbol, "Fetched token metadata");
        Ok(Some(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenSupply;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    const ID: &str = "SP2ZNGJ85ENDY6QRHQ5P2D4FXKGZWCKTB2T0Z55KS.charisma-token";

    fn id() -> ContractId {
        ContractId::parse(ID).unwrap()
    }

    fn failure() -> MetadataError {
        MetadataError::Status {
            url: "http://test".into(),
            status: 500,
        }
    }

    #[derive(Default)]
    struct FakeApi {
        doc: Option<PartialMetadata>,
        fail: bool,
    }

    #[async_trait]
    impl MetadataApi for FakeApi {
        async fn fetch(&self, _: &ContractId) -> Result<Option<PartialMetadata>> {
            if self.fail {
                return Err(failure());
            }
            Ok(self.doc.clone())
        }
    }

    /// Chain fake: missing keys answer `none`, "fail" answers an error
    #[derive(Default)]
    struct FakeChain {
        strings: HashMap<&'static str, &'static str>,
        decimals: Option<u8>,
        supply: Option<u128>,
        fail_all: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeChain {
        fn string(&self, function: &'static str) -> Result<Option<String>> {
            self.calls.lock().push(function);
            if self.fail_all {
                return Err(failure());
            }
            Ok(self.strings.get(function).map(|s| s.to_string()))
        }

        fn called(&self, function: &str) -> bool {
            self.calls.lock().iter().any(|f| *f == function)
        }
    }

    #[async_trait]
    impl ChainReader for FakeChain {
        async fn token_uri(&self, _: &ContractId) -> Result<Option<String>> {
            self.string("get-token-uri")
        }
        async fn name(&self, _: &ContractId) -> Result<Option<String>> {
            self.string("get-name")
        }
        async fn symbol(&self, _: &ContractId) -> Result<Option<String>> {
            self.string("get-symbol")
        }
        async fn decimals(&self, _: &ContractId) -> Result<Option<u8>> {
            self.calls.lock().push("get-decimals");
            if self.fail_all {
                return Err(failure());
            }
            Ok(self.decimals)
        }
        async fn total_supply(&self, _: &ContractId) -> Result<Option<TokenSupply>> {
            self.calls.lock().push("get-total-supply");
            if self.fail_all {
                return Err(failure());
            }
            Ok(self.supply.map(TokenSupply))
        }
        async fn identifier(&self, _: &ContractId) -> Result<Option<String>> {
            self.string("identifier")
        }
    }

    #[derive(Default)]
    struct FakeUri {
        doc: Option<PartialMetadata>,
        fail: bool,
    }

    #[async_trait]
    impl TokenUriResolver for FakeUri {
        async fn resolve(&self, _: &str) -> Result<Option<PartialMetadata>> {
            if self.fail {
                return Err(failure());
            }
            Ok(self.doc.clone())
        }
    }

    fn fetcher(api: FakeApi, chain: Arc<FakeChain>, uri: FakeUri) -> MetadataFetcher {
        MetadataFetcher::new(
            Arc::new(api),
            chain,
            Arc::new(uri),
            Placeholders::new("https://placehold.co/400x400?text="),
        )
    }

    #[tokio::test]
    async fn test_native_stx_is_hardcoded() {
        let chain = Arc::new(FakeChain {
            fail_all: true,
            ..Default::default()
        });
        let f = fetcher(FakeApi { fail: true, ..Default::default() }, chain.clone(), FakeUri::default());

        let data = f.fetch(&ContractId::native()).await.unwrap().unwrap();
        assert_eq!(data.symbol, "STX");
        assert_eq!(data.decimals, 6);
        assert!(chain.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_api_wins_over_uri_and_chain() {
        let chain = Arc::new(FakeChain {
            strings: HashMap::from([
                ("get-token-uri", "ipfs://bafy/meta.json"),
                ("get-name", "Chain Name"),
                ("identifier", "charisma"),
            ]),
            decimals: Some(6),
            supply: Some(1_000_000),
            ..Default::default()
        });
        let api = FakeApi {
            doc: Some(PartialMetadata {
                name: Some("Charisma".into()),
                total_supply: Some(TokenSupply(5)),
                ..Default::default()
            }),
            ..Default::default()
        };
        let uri = FakeUri {
            doc: Some(PartialMetadata {
                name: Some("Uri Name".into()),
                symbol: Some("CHA".into()),
                image: Some("https://img/cha.png".into()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let data = fetcher(api, chain.clone(), uri).fetch(&id()).await.unwrap().unwrap();
        assert_eq!(data.name, "Charisma");
        assert_eq!(data.symbol, "CHA");
        assert_eq!(data.decimals, 6);
        assert_eq!(data.identifier.as_deref(), Some("charisma"));
        assert_eq!(data.image.as_deref(), Some("https://img/cha.png"));
        assert_eq!(data.token_uri.as_deref(), Some("ipfs://bafy/meta.json"));
        assert_eq!(data.total_supply, Some(TokenSupply(1_000_000)));

        // Phase 2 only asks for what phase 1 left empty
        assert!(!chain.called("get-name"));
        assert!(!chain.called("get-symbol"));
        assert!(chain.called("get-decimals"));
        assert!(chain.called("identifier"));
    }

    #[tokio::test]
    async fn test_chain_only_token() {
        let chain = Arc::new(FakeChain {
            strings: HashMap::from([("get-name", "Welsh Corgi Coin"), ("get-symbol", "WELSH")]),
            decimals: Some(6),
            ..Default::default()
        });
        let data = fetcher(FakeApi::default(), chain, FakeUri::default())
            .fetch(&id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data.name, "Welsh Corgi Coin");
        assert_eq!(data.symbol, "WELSH");
        assert_eq!(
            data.description.as_deref(),
            Some("Welsh Corgi Coin (WELSH) token on Stacks")
        );
        assert!(data.token_uri.is_none());
    }

    #[tokio::test]
    async fn test_no_name_and_no_symbol_is_none() {
        let chain = Arc::new(FakeChain {
            decimals: Some(6),
            supply: Some(10),
            ..Default::default()
        });
        let result = fetcher(FakeApi::default(), chain, FakeUri::default())
            .fetch(&id())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_failing_sources_degrade() {
        let chain = Arc::new(FakeChain {
            strings: HashMap::from([("get-token-uri", "https://x/meta.json"), ("get-symbol", "CHA")]),
            ..Default::default()
        });
        let api = FakeApi {
            fail: true,
            ..Default::default()
        };
        let uri = FakeUri {
            fail: true,
            ..Default::default()
        };
        let data = fetcher(api, chain, uri).fetch(&id()).await.unwrap().unwrap();
        assert_eq!(data.symbol, "CHA");
        assert_eq!(data.name, "Charisma Token");
        assert_eq!(data.token_uri.as_deref(), Some("https://x/meta.json"));
    }

    #[tokio::test]
    async fn test_all_sources_failed_is_error() {
        let chain = Arc::new(FakeChain {
            fail_all: true,
            ..Default::default()
        });
        let api = FakeApi {
            fail: true,
            ..Default::default()
        };
        let err = fetcher(api, chain, FakeUri::default())
            .fetch(&id())
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::AllSourcesFailed { .. }));
    }
}
