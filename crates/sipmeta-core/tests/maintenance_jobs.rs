//! Maintenance jobs against in-memory fakes

use async_trait::async_trait;
use serde_json::json;
use sipmeta_core::fetcher::{Placeholders, TokenFetcher};
use sipmeta_core::maintenance::{ImageProbe, Job, JobOptions, MaintenanceRunner, Mode};
use sipmeta_core::models::{ContractId, TokenCacheData, TokenSupply};
use sipmeta_core::sources::ChainReader;
use sipmeta_core::store::{KvStore, MemoryKv, StoreError, StoreStats};
use sipmeta_core::{EventBus, Result, TokenRegistry, TokenService};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PLACEHOLDER_BASE: &str = "https://placehold.co/400x400?text=";

fn cid(name: &str) -> ContractId {
    ContractId::parse(&format!("SP2ZNGJ85ENDY6QRHQ5P2D4FXKGZWCKTB2T0Z55KS.{}", name)).unwrap()
}

/// Memory store that counts writes
#[derive(Default)]
struct CountingStore {
    inner: MemoryKv,
    writes: AtomicUsize,
}

impl CountingStore {
    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.writes.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl KvStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.keys(prefix).await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.inner.stats().await
    }
}

#[derive(Default)]
struct FakeFetcher {
    calls: AtomicUsize,
}

#[async_trait]
impl TokenFetcher for FakeFetcher {
    async fn fetch(&self, contract_id: &ContractId) -> Result<Option<TokenCacheData>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut data = complete(contract_id.contract_name());
        data.contract_id = contract_id.clone();
        data.name = format!("Refreshed {}", contract_id.contract_name());
        Ok(Some(data))
    }
}

/// Only `identifier` is used by maintenance
struct FakeChain;

#[async_trait]
impl ChainReader for FakeChain {
    async fn token_uri(&self, _: &ContractId) -> Result<Option<String>> {
        Ok(None)
    }
    async fn name(&self, _: &ContractId) -> Result<Option<String>> {
        Ok(None)
    }
    async fn symbol(&self, _: &ContractId) -> Result<Option<String>> {
        Ok(None)
    }
    async fn decimals(&self, _: &ContractId) -> Result<Option<u8>> {
        Ok(None)
    }
    async fn total_supply(&self, _: &ContractId) -> Result<Option<TokenSupply>> {
        Ok(None)
    }
    async fn identifier(&self, contract_id: &ContractId) -> Result<Option<String>> {
        Ok(Some(format!("{}-ft", contract_id.contract_name())))
    }
}

/// 404 for anything under /broken/
struct FakeProbe;

#[async_trait]
impl ImageProbe for FakeProbe {
    async fn status(&self, url: &str) -> Result<u16> {
        if url.contains("/broken/") {
            Ok(404)
        } else {
            Ok(200)
        }
    }
}

fn complete(name: &str) -> TokenCacheData {
    TokenCacheData {
        contract_id: cid(name),
        name: name.to_string(),
        symbol: name.to_uppercase(),
        decimals: 6,
        identifier: Some(name.to_string()),
        description: Some(format!("The {} token", name)),
        image: Some(format!("https://good/{}.png", name)),
        total_supply: Some(TokenSupply(1_000)),
        ..TokenCacheData::native_stx()
    }
}

struct Fixture {
    store: Arc<CountingStore>,
    fetcher: Arc<FakeFetcher>,
    service: Arc<TokenService>,
}

impl Fixture {
    /// alpha: complete; beta: placeholders, no identifier/supply;
    /// gamma: legacy numeric supply and a broken image
    async fn new() -> Self {
        let store = Arc::new(CountingStore::default());
        let fetcher = Arc::new(FakeFetcher::default());
        let registry = TokenRegistry::new(store.clone());
        let service = Arc::new(TokenService::new(
            store.clone(),
            fetcher.clone(),
            registry.clone(),
            EventBus::default(),
        ));

        service.put(&complete("alpha")).await.unwrap();

        let placeholders = Placeholders::new(PLACEHOLDER_BASE);
        let beta = TokenCacheData {
            identifier: None,
            total_supply: None,
            description: Some(placeholders.description("beta", "BETA")),
            image: Some(placeholders.image("BETA")),
            ..complete("beta")
        };
        service.put(&beta).await.unwrap();

        let gamma = json!({
            "contractId": cid("gamma").as_str(),
            "name": "gamma",
            "symbol": "GAMMA",
            "decimals": 6,
            "identifier": "gamma",
            "description": "The gamma token",
            "image": "https://broken/gamma.png",
            "type": "SIP10",
            "total_supply": 5000,
            "lastUpdated": "2024-01-01T00:00:00Z"
        });
        store
            .put("sip10:SP2ZNGJ85ENDY6QRHQ5P2D4FXKGZWCKTB2T0Z55KS.gamma", gamma.to_string(), None)
            .await
            .unwrap();

        registry.add(&cid("alpha")).await.unwrap();
        registry.add(&cid("beta")).await.unwrap();

        store.reset();
        Self {
            store,
            fetcher,
            service,
        }
    }

    fn runner(&self, mode: Mode) -> MaintenanceRunner {
        MaintenanceRunner::new(
            self.service.clone(),
            self.store.clone(),
            Arc::new(FakeChain),
            Arc::new(FakeProbe),
            Placeholders::new(PLACEHOLDER_BASE),
            JobOptions {
                mode,
                batch_size: 2,
                batch_delay: Duration::ZERO,
                score_threshold: 80,
            },
        )
    }

    fn fetches(&self) -> usize {
        self.fetcher.calls.load(Ordering::SeqCst)
    }
}

fn names(ids: &[ContractId]) -> Vec<&str> {
    let mut names: Vec<&str> = ids.iter().map(|id| id.contract_name()).collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_dry_run_never_writes() {
    let fx = Fixture::new().await;
    let runner = fx.runner(Mode::DryRun);

    let expected: [(Job, Vec<&str>); 6] = [
        (Job::Audit, vec![]),
        (Job::FixIdentifiers, vec!["beta"]),
        (Job::ConvertSupply, vec!["gamma"]),
        (Job::AuditImages, vec!["beta", "gamma"]),
        (Job::RefreshIncomplete, vec!["beta"]),
        (Job::RefreshManaged, vec!["alpha", "beta"]),
    ];

    for (job, changed) in expected {
        let report = runner.run(job).await.unwrap();
        assert_eq!(names(&report.changed), changed, "job {}", job);
        assert!(report.failures.is_empty(), "job {}: {:?}", job, report.failures);
    }

    assert_eq!(fx.store.writes(), 0);
    assert_eq!(fx.fetches(), 0);
}

#[tokio::test]
async fn test_audit_scores() {
    let fx = Fixture::new().await;
    let report = fx.runner(Mode::Live).run(Job::Audit).await.unwrap();

    assert_eq!(report.scanned, 3);
    let scores = report.scores.unwrap();
    assert_eq!(scores.count, 3);
    // beta: name + symbol + decimals only
    assert_eq!(scores.lowest[0], (cid("beta"), 50));
    assert_eq!(scores.buckets[4], 2);
    assert_eq!(fx.store.writes(), 0);
}

#[tokio::test]
async fn test_live_fix_identifiers() {
    let fx = Fixture::new().await;
    let report = fx.runner(Mode::Live).run(Job::FixIdentifiers).await.unwrap();

    assert_eq!(names(&report.changed), vec!["beta"]);
    assert_eq!(report.unchanged, 2);
    let beta = fx.service.cached(&cid("beta")).await.unwrap();
    assert_eq!(beta.identifier.as_deref(), Some("beta-ft"));
    assert_eq!(fx.store.writes(), 1);
}

#[tokio::test]
async fn test_live_convert_supply_rewrites_as_string() {
    let fx = Fixture::new().await;
    let report = fx.runner(Mode::Live).run(Job::ConvertSupply).await.unwrap();
    assert_eq!(names(&report.changed), vec!["gamma"]);

    let raw = fx
        .store
        .get("sip10:SP2ZNGJ85ENDY6QRHQ5P2D4FXKGZWCKTB2T0Z55KS.gamma")
        .await
        .unwrap()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["total_supply"], json!("5000"));

    // Second pass finds nothing to do
    let report = fx.runner(Mode::Live).run(Job::ConvertSupply).await.unwrap();
    assert!(report.changed.is_empty());
}

#[tokio::test]
async fn test_live_refresh_incomplete_and_blacklist() {
    let fx = Fixture::new().await;
    let report = fx.runner(Mode::Live).run(Job::RefreshIncomplete).await.unwrap();

    assert_eq!(names(&report.changed), vec!["beta"]);
    assert_eq!(fx.fetches(), 1);
    assert_eq!(fx.service.cached(&cid("beta")).await.unwrap().name, "Refreshed beta");

    // Blacklisted entries are skipped, not fetched
    fx.service.registry().blacklist_add(&cid("gamma")).await.unwrap();
    let report = fx.runner(Mode::Live).run(Job::AuditImages).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(fx.fetches(), 1);
}

#[tokio::test]
async fn test_live_refresh_managed() {
    let fx = Fixture::new().await;
    let report = fx.runner(Mode::Live).run(Job::RefreshManaged).await.unwrap();

    assert_eq!(names(&report.changed), vec!["alpha", "beta"]);
    assert_eq!(fx.fetches(), 2);
    assert!(report.to_string().contains("refresh-managed (live)"));
}

#[tokio::test]
async fn test_batches_are_throttled() {
    let fx = Fixture::new().await;
    let runner = MaintenanceRunner::new(
        fx.service.clone(),
        fx.store.clone(),
        Arc::new(FakeChain),
        Arc::new(FakeProbe),
        Placeholders::new(PLACEHOLDER_BASE),
        JobOptions {
            mode: Mode::DryRun,
            batch_size: 1,
            batch_delay: Duration::from_millis(40),
            score_threshold: 80,
        },
    );

    // three entries in batches of one: two pauses
    let report = runner.run(Job::RefreshIncomplete).await.unwrap();
    assert_eq!(report.scanned, 3);
    assert!(report.elapsed >= Duration::from_millis(80));
}
