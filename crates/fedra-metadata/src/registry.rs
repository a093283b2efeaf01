//! Tenant registry.
//!
//! Single source of truth mapping tenant → metadata store. Stores are
//! created lazily on first access; the map's write lock is the arbiter of
//! first-access races, so exactly one store ever exists per tenant and no
//! losing construction is retained.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use fedra_core::TenantId;

use crate::descriptor::ExtendedMetadata;
use crate::keys::KeyManager;
use crate::store::TenantMetadataStore;

/// Concurrent map from tenant identity to its metadata store.
#[derive(Debug, Default)]
pub struct TenantRegistry {
    stores: RwLock<HashMap<TenantId, Arc<TenantMetadataStore>>>,
    /// Shared key material inherited by every store, current and future.
    key_manager: RwLock<Option<Arc<KeyManager>>>,
    /// Defaults inherited by stores created after this was set.
    default_extended: RwLock<ExtendedMetadata>,
}

impl TenantRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The store for `tenant_id`, creating it if this is the tenant's
    /// first access.
    ///
    /// Concurrent first accesses for the same tenant all receive the same
    /// `Arc`; construction happens under the map's write lock after a
    /// final occupancy check, so there is never a second live store to
    /// discard.
    pub async fn get_or_create(&self, tenant_id: TenantId) -> Arc<TenantMetadataStore> {
        if let Some(existing) = self.stores.read().await.get(&tenant_id) {
            return existing.clone();
        }

        let key_manager = self.key_manager.read().await.clone();
        let default_extended = self.default_extended.read().await.clone();

        let mut stores = self.stores.write().await;
        if let Some(existing) = stores.get(&tenant_id) {
            // Lost the race; the winner's store is the tenant's store.
            return existing.clone();
        }

        let store = Arc::new(TenantMetadataStore::new(tenant_id));
        if let Some(km) = key_manager {
            store.set_key_manager(km).await;
        }
        store.set_default_extended_metadata(default_extended).await;
        stores.insert(tenant_id, store.clone());
        info!(tenant_id = %tenant_id, "Created tenant metadata store");
        store
    }

    /// The store for `tenant_id`, if one exists.
    pub async fn get(&self, tenant_id: TenantId) -> Option<Arc<TenantMetadataStore>> {
        self.stores.read().await.get(&tenant_id).cloned()
    }

    /// Snapshot of the currently known tenant identities.
    ///
    /// Tenants inserted while the snapshot is in use are picked up by the
    /// next caller; perfect consistency with concurrent insertion is not
    /// required here.
    pub async fn list_tenants(&self) -> Vec<TenantId> {
        self.stores.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.stores.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.stores.read().await.is_empty()
    }

    /// Set the shared key manager, applying it to every existing store and
    /// recording it for stores created later.
    pub async fn set_key_manager(&self, key_manager: Arc<KeyManager>) {
        *self.key_manager.write().await = Some(key_manager.clone());
        let stores = self.stores.read().await;
        for store in stores.values() {
            store.set_key_manager(key_manager.clone()).await;
        }
        debug!(stores = stores.len(), "Applied shared key manager");
    }

    /// Set the default extended metadata inherited by every existing and
    /// future store.
    pub async fn set_default_extended_metadata(&self, extended: ExtendedMetadata) {
        *self.default_extended.write().await = extended.clone();
        for store in self.stores.read().await.values() {
            store.set_default_extended_metadata(extended.clone()).await;
        }
    }

    /// Destroy every store and empty the map. Called once at shutdown.
    pub async fn destroy_all(&self) {
        let mut stores = self.stores.write().await;
        for store in stores.values() {
            store.destroy().await;
        }
        let count = stores.len();
        stores.clear();
        info!(stores = count, "Destroyed all tenant metadata stores");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::KeyUse;
    use crate::keys::KeyEntry;

    #[tokio::test]
    async fn test_get_or_create_returns_same_store() {
        let registry = TenantRegistry::new();
        let tenant_id = TenantId::new();

        let first = registry.get_or_create(tenant_id).await;
        let second = registry.get_or_create(tenant_id).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_tenants_get_distinct_stores() {
        let registry = TenantRegistry::new();
        let a = registry.get_or_create(TenantId::new()).await;
        let b = registry.get_or_create(TenantId::new()).await;
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.list_tenants().await.len(), 2);
    }

    #[tokio::test]
    async fn test_get_does_not_create() {
        let registry = TenantRegistry::new();
        assert!(registry.get(TenantId::new()).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_first_access_single_winner() {
        let registry = Arc::new(TenantRegistry::new());
        let tenant_id = TenantId::new();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(
                async move { registry.get_or_create(tenant_id).await },
            ));
        }

        let stores: Vec<_> = futures_join_all(handles).await;
        let first = &stores[0];
        for store in &stores {
            assert!(Arc::ptr_eq(first, store));
        }
        assert_eq!(registry.len().await, 1);
    }

    // Minimal join-all so the test does not pull in the futures crate.
    async fn futures_join_all(
        handles: Vec<tokio::task::JoinHandle<Arc<TenantMetadataStore>>>,
    ) -> Vec<Arc<TenantMetadataStore>> {
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.await.expect("task panicked"));
        }
        out
    }

    #[tokio::test]
    async fn test_key_manager_applies_to_existing_and_future_stores() {
        let registry = TenantRegistry::new();
        let existing = registry.get_or_create(TenantId::new()).await;

        let mut km = KeyManager::new();
        km.add_key(KeyEntry {
            name: "primary".to_string(),
            key_use: KeyUse::Signing,
            material_pem: String::new(),
        });
        registry.set_key_manager(Arc::new(km)).await;

        assert!(existing.key_manager().await.is_some());

        let created_later = registry.get_or_create(TenantId::new()).await;
        assert!(created_later.key_manager().await.is_some());
    }

    #[tokio::test]
    async fn test_destroy_all_empties_registry() {
        let registry = TenantRegistry::new();
        registry.get_or_create(TenantId::new()).await;
        registry.get_or_create(TenantId::new()).await;

        registry.destroy_all().await;
        assert!(registry.is_empty().await);
        assert!(registry.list_tenants().await.is_empty());
    }
}
