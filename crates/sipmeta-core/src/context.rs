//! Wiring: builds the store, sources, fetcher and service from a `Config`

use crate::config::{Config, StoreBackend};
use crate::event::EventBus;
use crate::fetcher::{MetadataFetcher, Placeholders};
use crate::maintenance::{HttpImageProbe, JobOptions, MaintenanceRunner};
use crate::registry::TokenRegistry;
use crate::service::TokenService;
use crate::sources::{build_client, ChainReader, HttpMetadataApi, HttpTokenUriResolver, StacksChainReader};
use crate::store::{KvStore, MemoryKv, SqliteKv};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn KvStore>,
    pub chain: Arc<dyn ChainReader>,
    pub service: Arc<TokenService>,
    pub placeholders: Placeholders,
    client: reqwest::Client,
}

impl AppContext {
    pub fn from_config(config: Config) -> Result<Self> {
        let store: Arc<dyn KvStore> = match config.store.backend {
            StoreBackend::Sqlite => Arc::new(
                SqliteKv::open(&config.store.path)
                    .with_context(|| format!("Failed to open store at {}", config.store.path.display()))?,
            ),
            StoreBackend::Memory => Arc::new(MemoryKv::new()),
        };
        info!(backend = ?config.store.backend, "Store ready");

        let client = build_client(config.sources.request_timeout()).context("Failed to build HTTP client")?;
        let sources = &config.sources;

        let chain: Arc<dyn ChainReader> = Arc::new(StacksChainReader::new(client.clone(), &sources.stacks_api_url));
        let placeholders = Placeholders::new(&sources.placeholder_image_base);
        let fetcher = MetadataFetcher::new(
            Arc::new(HttpMetadataApi::new(client.clone(), &sources.metadata_api_url)),
            chain.clone(),
            Arc::new(HttpTokenUriResolver::new(client.clone(), &sources.ipfs_gateway)),
            placeholders.clone(),
        );

        let registry = TokenRegistry::new(store.clone());
        let service = TokenService::new(store.clone(), Arc::new(fetcher), registry, EventBus::default())
            .with_ttl(config.cache.ttl());

        Ok(Self {
            config,
            store,
            chain,
            service: Arc::new(service),
            placeholders,
            client,
        })
    }

    /// Runner with config defaults, overridden by explicit options
    pub fn maintenance(&self, options: JobOptions) -> MaintenanceRunner {
        MaintenanceRunner::new(
            self.service.clone(),
            self.store.clone(),
            self.chain.clone(),
            Arc::new(HttpImageProbe::new(self.client.clone(), &self.config.sources.ipfs_gateway)),
            self.placeholders.clone(),
            options,
        )
    }

    pub fn default_job_options(&self) -> JobOptions {
        let m = &self.config.maintenance;
        JobOptions {
            batch_size: m.batch_size,
            batch_delay: Duration::from_millis(m.batch_delay_ms),
            score_threshold: m.score_threshold,
            ..JobOptions::default()
        }
    }
}
