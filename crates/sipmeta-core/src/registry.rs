//! Managed token list and blacklist
//!
//! Both live in the KV store without TTL. Writes are read-modify-write, so
//! they are serialized within the process.

use crate::store::{load_json, save_json, KvStore, StoreError, BLACKLIST_KEY, MANAGED_KEY};
use crate::models::ContractId;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Clone)]
pub struct TokenRegistry {
    store: Arc<dyn KvStore>,
    write_lock: Arc<Mutex<()>>,
}

impl TokenRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Managed IDs in insertion order
    pub async fn managed(&self) -> Result<Vec<ContractId>, StoreError> {
        Ok(load_json(&*self.store, MANAGED_KEY).await?.unwrap_or_default())
    }

    pub async fn blacklist(&self) -> Result<BTreeSet<ContractId>, StoreError> {
        Ok(load_json(&*self.store, BLACKLIST_KEY).await?.unwrap_or_default())
    }

    pub async fn is_blacklisted(&self, contract_id: &ContractId) -> Result<bool, StoreError> {
        Ok(self.blacklist().await?.contains(contract_id))
    }

    /// Append to the managed list; returns false if already present.
    /// Blacklisted IDs are not added.
    pub async fn add(&self, contract_id: &ContractId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        if self.is_blacklisted(contract_id).await? {
            return Ok(false);
        }
        let mut managed = self.managed().await?;
        if managed.contains(contract_id) {
            return Ok(false);
        }
        managed.push(contract_id.clone());
        save_json(&*self.store, MANAGED_KEY, &managed, None).await?;
        info!(contract_id = %contract_id, "Added to managed list");
        Ok(true)
    }

    pub async fn remove(&self, contract_id: &ContractId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        self.remove_managed(contract_id).await
    }

    /// Blacklist an ID and drop it from the managed list
    pub async fn blacklist_add(&self, contract_id: &ContractId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut blacklist = self.blacklist().await?;
        let inserted = blacklist.insert(contract_id.clone());
        if inserted {
            save_json(&*self.store, BLACKLIST_KEY, &blacklist, None).await?;
            info!(contract_id = %contract_id, "Blacklisted");
        }
        self.remove_managed(contract_id).await?;
        Ok(inserted)
    }

    pub async fn blacklist_remove(&self, contract_id: &ContractId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut blacklist = self.blacklist().await?;
        if !blacklist.remove(contract_id) {
            return Ok(false);
        }
        save_json(&*self.store, BLACKLIST_KEY, &blacklist, None).await?;
        info!(contract_id = %contract_id, "Removed from blacklist");
        Ok(true)
    }

    async fn remove_managed(&self, contract_id: &ContractId) -> Result<bool, StoreError> {
        let mut managed = self.managed().await?;
        let before = managed.len();
        managed.retain(|id| id != contract_id);
        if managed.len() == before {
            return Ok(false);
        }
        save_json(&*self.store, MANAGED_KEY, &managed, None).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKv;

    fn cid(name: &str) -> ContractId {
        ContractId::parse(&format!("SP2ZNGJ85ENDY6QRHQ5P2D4FXKGZWCKTB2T0Z55KS.{}", name)).unwrap()
    }

    #[tokio::test]
    async fn test_managed_list_is_ordered_and_deduplicated() {
        let registry = TokenRegistry::new(Arc::new(MemoryKv::new()));

        assert!(registry.add(&cid("b")).await.unwrap());
        assert!(registry.add(&cid("a")).await.unwrap());
        assert!(!registry.add(&cid("b")).await.unwrap());

        assert_eq!(registry.managed().await.unwrap(), vec![cid("b"), cid("a")]);

        assert!(registry.remove(&cid("b")).await.unwrap());
        assert!(!registry.remove(&cid("b")).await.unwrap());
        assert_eq!(registry.managed().await.unwrap(), vec![cid("a")]);
    }

    #[tokio::test]
    async fn test_blacklisting_removes_from_managed() {
        let registry = TokenRegistry::new(Arc::new(MemoryKv::new()));
        registry.add(&cid("scam")).await.unwrap();
        registry.add(&cid("good")).await.unwrap();

        assert!(registry.blacklist_add(&cid("scam")).await.unwrap());
        assert!(!registry.blacklist_add(&cid("scam")).await.unwrap());

        assert!(registry.is_blacklisted(&cid("scam")).await.unwrap());
        assert_eq!(registry.managed().await.unwrap(), vec![cid("good")]);

        // Blacklisted IDs cannot be re-added until unblacklisted
        assert!(!registry.add(&cid("scam")).await.unwrap());
        assert!(registry.blacklist_remove(&cid("scam")).await.unwrap());
        assert!(registry.add(&cid("scam")).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_not_lost() {
        let registry = TokenRegistry::new(Arc::new(MemoryKv::new()));
        let handles: Vec<_> = (0..20)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.add(&cid(&format!("t{}", i))).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(registry.managed().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_lists_survive_a_full_memory_store() {
        let store = Arc::new(MemoryKv::with_capacity(50));
        let registry = TokenRegistry::new(store.clone());
        registry.add(&cid("good")).await.unwrap();
        registry.blacklist_add(&cid("scam")).await.unwrap();

        for i in 0..2000 {
            let key = format!("sip10:k{}", i);
            store
                .put(&key, "{}".into(), Some(std::time::Duration::from_secs(60)))
                .await
                .unwrap();
            store.get(&key).await.unwrap();
            store.get(&key).await.unwrap();
        }
        store.purge_expired().await.unwrap();

        assert!(registry.is_blacklisted(&cid("scam")).await.unwrap());
        assert_eq!(registry.managed().await.unwrap(), vec![cid("good")]);
    }
}
