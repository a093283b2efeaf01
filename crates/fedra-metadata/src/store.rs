//! Per-tenant metadata store.
//!
//! Caches and serves trust metadata for one tenant. The store keeps the
//! registered provider handles in one map and serves every lookup from a
//! separately published [`MetadataIndex`] snapshot: a refresh builds the
//! next index off to the side and publishes it with a single `Arc` swap,
//! so concurrent readers always observe either the pre- or post-refresh
//! state, never a torn set.
//!
//! The scheduler is the only writer of the provider set; arbitrary caller
//! tasks read concurrently.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info};

use fedra_core::{ProviderId, TenantId, TenantScoped};

use crate::descriptor::{EntityDescriptor, ExtendedMetadata, RoleDescriptor, RoleKind};
use crate::error::{FederationError, FederationResult, RegistrationError};
use crate::keys::KeyManager;
use crate::provider::{MetadataProviderHandle, ProviderChange, ProviderChangeListener};

/// Immutable lookup index derived from the registered provider handles.
///
/// Rebuilt wholesale on refresh; never mutated in place after publication.
#[derive(Debug, Default)]
struct MetadataIndex {
    /// entity ID → descriptor
    entities: HashMap<String, Arc<EntityDescriptor>>,
    /// alias → entity ID
    aliases: HashMap<String, String>,
    /// SHA-256(entity ID) → entity ID
    hashes: HashMap<[u8; 32], String>,
    idp_names: HashSet<String>,
    sp_names: HashSet<String>,
}

impl MetadataIndex {
    fn build(providers: &HashMap<ProviderId, Arc<MetadataProviderHandle>>) -> Self {
        let mut index = Self::default();
        for handle in providers.values() {
            for entity in handle.entities() {
                let entity_id = entity.entity_id.clone();
                index
                    .hashes
                    .insert(entity.entity_id_hash(), entity_id.clone());
                if let Some(alias) = &entity.alias {
                    index.aliases.insert(alias.clone(), entity_id.clone());
                }
                if entity.has_role(RoleKind::IdentityProvider) {
                    index.idp_names.insert(entity_id.clone());
                }
                if entity.has_role(RoleKind::ServiceProvider) {
                    index.sp_names.insert(entity_id.clone());
                }
                index.entities.insert(entity_id, Arc::new(entity.clone()));
            }
        }
        index
    }
}

/// Cache of federation trust metadata for one tenant.
pub struct TenantMetadataStore {
    tenant_id: TenantId,
    /// Registered provider handles, keyed by source record ID.
    providers: RwLock<HashMap<ProviderId, Arc<MetadataProviderHandle>>>,
    /// Published lookup index; swapped atomically on refresh.
    index: RwLock<Arc<MetadataIndex>>,
    refresh_required: AtomicBool,
    changes_tx: mpsc::UnboundedSender<ProviderChange>,
    changes_rx: Mutex<mpsc::UnboundedReceiver<ProviderChange>>,
    default_idp: RwLock<Option<String>>,
    hosted_sp_name: RwLock<Option<String>>,
    default_extended: RwLock<ExtendedMetadata>,
    key_manager: RwLock<Option<Arc<KeyManager>>>,
    require_valid: AtomicBool,
}

impl TenantMetadataStore {
    /// Create an empty store for `tenant_id`.
    #[must_use]
    pub fn new(tenant_id: TenantId) -> Self {
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        Self {
            tenant_id,
            providers: RwLock::new(HashMap::new()),
            index: RwLock::new(Arc::new(MetadataIndex::default())),
            refresh_required: AtomicBool::new(false),
            changes_tx,
            changes_rx: Mutex::new(changes_rx),
            default_idp: RwLock::new(None),
            hosted_sp_name: RwLock::new(None),
            default_extended: RwLock::new(ExtendedMetadata::default()),
            key_manager: RwLock::new(None),
            require_valid: AtomicBool::new(false),
        }
    }

    /// The tenant this store belongs to.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// A handle collaborators use to signal out-of-band provider changes.
    #[must_use]
    pub fn change_listener(&self) -> ProviderChangeListener {
        ProviderChangeListener::new(self.changes_tx.clone())
    }

    /// Register a metadata provider handle.
    ///
    /// Re-registering the same provider ID replaces the previous handle
    /// (the record was updated). Fails when the handle belongs to another
    /// tenant, exposes no entities, or collides on an entity ID already
    /// served by a different provider in this store. On success the store
    /// is marked refresh-required; lookups keep serving the previously
    /// published index until the next [`refresh_if_required`](Self::refresh_if_required).
    pub async fn add_provider(&self, handle: MetadataProviderHandle) -> FederationResult<()> {
        if handle.tenant_id() != self.tenant_id {
            return Err(RegistrationError::ForeignTenant {
                expected: self.tenant_id,
                actual: handle.tenant_id(),
            }
            .into());
        }
        if handle.entities().is_empty() {
            return Err(RegistrationError::EmptyHandle.into());
        }

        let mut providers = self.providers.write().await;
        let new_ids: HashSet<&str> = handle.entity_ids().collect();
        for (provider_id, existing) in providers.iter() {
            if *provider_id == handle.id() {
                continue;
            }
            if let Some(duplicate) = existing.entity_ids().find(|id| new_ids.contains(id)) {
                return Err(RegistrationError::DuplicateEntityId(duplicate.to_string()).into());
            }
        }

        let entity_count = handle.entities().len();
        let provider_id = handle.id();
        providers.insert(provider_id, Arc::new(handle));
        drop(providers);

        self.refresh_required.store(true, Ordering::Release);
        info!(
            tenant_id = %self.tenant_id,
            provider_id = %provider_id,
            entities = entity_count,
            "Registered metadata provider"
        );
        Ok(())
    }

    /// Unregister a provider. Idempotent; returns whether anything was
    /// removed.
    pub async fn remove_provider(&self, provider_id: ProviderId) -> bool {
        let removed = self.providers.write().await.remove(&provider_id).is_some();
        if removed {
            self.refresh_required.store(true, Ordering::Release);
            info!(
                tenant_id = %self.tenant_id,
                provider_id = %provider_id,
                "Unregistered metadata provider"
            );
        }
        removed
    }

    /// Snapshot of the registered provider handles.
    pub async fn providers(&self) -> Vec<Arc<MetadataProviderHandle>> {
        self.providers.read().await.values().cloned().collect()
    }

    /// Number of registered providers.
    pub async fn provider_count(&self) -> usize {
        self.providers.read().await.len()
    }

    /// Fold queued change events into the refresh-required flag.
    async fn absorb_change_events(&self) {
        let mut rx = self.changes_rx.lock().await;
        while let Ok(change) = rx.try_recv() {
            debug!(
                tenant_id = %self.tenant_id,
                provider_id = %change.provider_id,
                "Provider change event received"
            );
            self.refresh_required.store(true, Ordering::Release);
        }
    }

    /// Mark the store as needing an index rebuild.
    pub fn set_refresh_required(&self) {
        self.refresh_required.store(true, Ordering::Release);
    }

    /// Whether a rebuild is pending (including undrained change events).
    pub async fn refresh_required(&self) -> bool {
        self.absorb_change_events().await;
        self.refresh_required.load(Ordering::Acquire)
    }

    /// Rebuild and publish the lookup index if required; no-op otherwise.
    ///
    /// This is the expensive settle operation the scheduler avoids calling
    /// for unchanged tenants. The new index is built from the current
    /// provider handles while readers keep resolving against the old one,
    /// then published with a single swap.
    pub async fn refresh_if_required(&self) {
        self.absorb_change_events().await;
        if !self.refresh_required.swap(false, Ordering::AcqRel) {
            return;
        }

        let new_index = {
            let providers = self.providers.read().await;
            MetadataIndex::build(&providers)
        };
        let entity_count = new_index.entities.len();

        *self.index.write().await = Arc::new(new_index);
        debug!(
            tenant_id = %self.tenant_id,
            entities = entity_count,
            "Published rebuilt metadata index"
        );
    }

    async fn index_snapshot(&self) -> Arc<MetadataIndex> {
        self.index.read().await.clone()
    }

    fn filter_valid(
        &self,
        descriptor: Arc<EntityDescriptor>,
    ) -> Option<Arc<EntityDescriptor>> {
        if self.require_valid.load(Ordering::Acquire) && !descriptor.is_valid_at(Utc::now()) {
            None
        } else {
            Some(descriptor)
        }
    }

    /// Resolve an entity descriptor by entity ID.
    pub async fn get_entity_descriptor(
        &self,
        entity_id: &str,
    ) -> FederationResult<Arc<EntityDescriptor>> {
        self.index_snapshot()
            .await
            .entities
            .get(entity_id)
            .cloned()
            .and_then(|d| self.filter_valid(d))
            .ok_or_else(|| FederationError::not_found("EntityDescriptor", entity_id))
    }

    /// Resolve an entity descriptor by the SHA-256 hash of its entity ID.
    pub async fn get_entity_descriptor_by_hash(
        &self,
        hash: &[u8],
    ) -> FederationResult<Arc<EntityDescriptor>> {
        let index = self.index_snapshot().await;
        let entity_id = hash
            .try_into()
            .ok()
            .and_then(|h: [u8; 32]| index.hashes.get(&h))
            .ok_or_else(|| FederationError::not_found("EntityDescriptor", hex::encode(hash)))?;
        index
            .entities
            .get(entity_id)
            .cloned()
            .and_then(|d| self.filter_valid(d))
            .ok_or_else(|| FederationError::not_found("EntityDescriptor", entity_id.clone()))
    }

    /// Resolve an entity ID from its alias.
    pub async fn entity_id_for_alias(&self, alias: &str) -> FederationResult<String> {
        self.index_snapshot()
            .await
            .aliases
            .get(alias)
            .cloned()
            .ok_or_else(|| FederationError::not_found("EntityAlias", alias))
    }

    /// All role descriptors of `kind` declared by the entity.
    pub async fn get_roles(
        &self,
        entity_id: &str,
        kind: RoleKind,
    ) -> FederationResult<Vec<RoleDescriptor>> {
        let descriptor = self.get_entity_descriptor(entity_id).await?;
        let roles: Vec<RoleDescriptor> = descriptor.roles_of_kind(kind).cloned().collect();
        if roles.is_empty() {
            return Err(FederationError::not_found("RoleDescriptor", entity_id));
        }
        Ok(roles)
    }

    /// The role descriptor of `kind` supporting `protocol`.
    pub async fn get_role(
        &self,
        entity_id: &str,
        kind: RoleKind,
        protocol: &str,
    ) -> FederationResult<RoleDescriptor> {
        let descriptor = self.get_entity_descriptor(entity_id).await?;
        let role = descriptor
            .roles_of_kind(kind)
            .find(|r| r.supports_protocol(protocol))
            .cloned()
            .ok_or_else(|| FederationError::not_found("RoleDescriptor", entity_id));
        role
    }

    /// Entity IDs declaring an identity-provider role.
    pub async fn idp_names(&self) -> HashSet<String> {
        self.index_snapshot().await.idp_names.clone()
    }

    /// Entity IDs declaring a service-provider role.
    pub async fn sp_names(&self) -> HashSet<String> {
        self.index_snapshot().await.sp_names.clone()
    }

    /// Whether `entity_id` is a known, currently valid identity provider.
    pub async fn is_idp_valid(&self, entity_id: &str) -> bool {
        let index = self.index_snapshot().await;
        index.idp_names.contains(entity_id)
            && index
                .entities
                .get(entity_id)
                .cloned()
                .and_then(|d| self.filter_valid(d))
                .is_some()
    }

    /// Whether `entity_id` is a known, currently valid service provider.
    pub async fn is_sp_valid(&self, entity_id: &str) -> bool {
        let index = self.index_snapshot().await;
        index.sp_names.contains(entity_id)
            && index
                .entities
                .get(entity_id)
                .cloned()
                .and_then(|d| self.filter_valid(d))
                .is_some()
    }

    /// The configured default IdP, falling back to the lowest known IdP
    /// entity ID when none was configured.
    pub async fn default_idp(&self) -> FederationResult<String> {
        if let Some(configured) = self.default_idp.read().await.clone() {
            return Ok(configured);
        }
        self.index_snapshot()
            .await
            .idp_names
            .iter()
            .min()
            .cloned()
            .ok_or_else(|| FederationError::not_found("IdentityProvider", "default"))
    }

    pub async fn set_default_idp(&self, entity_id: impl Into<String>) {
        *self.default_idp.write().await = Some(entity_id.into());
    }

    pub async fn hosted_sp_name(&self) -> Option<String> {
        self.hosted_sp_name.read().await.clone()
    }

    pub async fn set_hosted_sp_name(&self, name: impl Into<String>) {
        *self.hosted_sp_name.write().await = Some(name.into());
    }

    pub async fn default_extended_metadata(&self) -> ExtendedMetadata {
        self.default_extended.read().await.clone()
    }

    pub async fn set_default_extended_metadata(&self, extended: ExtendedMetadata) {
        *self.default_extended.write().await = extended;
    }

    pub async fn key_manager(&self) -> Option<Arc<KeyManager>> {
        self.key_manager.read().await.clone()
    }

    pub async fn set_key_manager(&self, key_manager: Arc<KeyManager>) {
        *self.key_manager.write().await = Some(key_manager);
    }

    /// When set, lookups and validity checks exclude descriptors whose
    /// validity window has passed.
    pub fn set_require_valid_metadata(&self, require: bool) {
        self.require_valid.store(require, Ordering::Release);
    }

    #[must_use]
    pub fn require_valid_metadata(&self) -> bool {
        self.require_valid.load(Ordering::Acquire)
    }

    /// Drop all providers and publish an empty index.
    pub async fn destroy(&self) {
        self.providers.write().await.clear();
        *self.index.write().await = Arc::new(MetadataIndex::default());
        self.refresh_required.store(false, Ordering::Release);
        debug!(tenant_id = %self.tenant_id, "Destroyed tenant metadata store");
    }
}

impl std::fmt::Debug for TenantMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantMetadataStore")
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{entity_id_hash, RoleDescriptor, SAML2_PROTOCOL};
    use chrono::Duration;

    fn entity(entity_id: &str, kind: RoleKind) -> EntityDescriptor {
        EntityDescriptor {
            entity_id: entity_id.to_string(),
            alias: None,
            roles: vec![RoleDescriptor {
                kind,
                protocols: vec![SAML2_PROTOCOL.to_string()],
                keys: vec![],
                endpoints: vec![],
            }],
            valid_until: None,
        }
    }

    fn handle(
        tenant_id: TenantId,
        provider_id: ProviderId,
        entities: Vec<EntityDescriptor>,
    ) -> MetadataProviderHandle {
        MetadataProviderHandle::new(provider_id, tenant_id, entities, None)
    }

    #[tokio::test]
    async fn test_lookup_reflects_refresh_not_registration() {
        let tenant_id = TenantId::new();
        let store = TenantMetadataStore::new(tenant_id);
        let idp = entity("https://idp.example.com", RoleKind::IdentityProvider);

        store
            .add_provider(handle(tenant_id, ProviderId::new(), vec![idp]))
            .await
            .unwrap();

        // Not yet folded into the published index.
        assert!(store
            .get_entity_descriptor("https://idp.example.com")
            .await
            .is_err());
        assert!(store.refresh_required().await);

        store.refresh_if_required().await;
        let descriptor = store
            .get_entity_descriptor("https://idp.example.com")
            .await
            .unwrap();
        assert_eq!(descriptor.entity_id, "https://idp.example.com");
        assert!(!store.refresh_required().await);
    }

    #[tokio::test]
    async fn test_add_provider_rejects_foreign_tenant() {
        let store = TenantMetadataStore::new(TenantId::new());
        let foreign = TenantId::new();
        let err = store
            .add_provider(handle(
                foreign,
                ProviderId::new(),
                vec![entity("https://idp.example.com", RoleKind::IdentityProvider)],
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FederationError::Registration(RegistrationError::ForeignTenant { .. })
        ));
    }

    #[tokio::test]
    async fn test_add_provider_rejects_duplicate_entity_id() {
        let tenant_id = TenantId::new();
        let store = TenantMetadataStore::new(tenant_id);
        store
            .add_provider(handle(
                tenant_id,
                ProviderId::new(),
                vec![entity("https://idp.example.com", RoleKind::IdentityProvider)],
            ))
            .await
            .unwrap();

        let err = store
            .add_provider(handle(
                tenant_id,
                ProviderId::new(),
                vec![entity("https://idp.example.com", RoleKind::IdentityProvider)],
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FederationError::Registration(RegistrationError::DuplicateEntityId(_))
        ));
    }

    #[tokio::test]
    async fn test_reregistering_same_provider_replaces_handle() {
        let tenant_id = TenantId::new();
        let provider_id = ProviderId::new();
        let store = TenantMetadataStore::new(tenant_id);

        store
            .add_provider(handle(
                tenant_id,
                provider_id,
                vec![entity("https://old.example.com", RoleKind::IdentityProvider)],
            ))
            .await
            .unwrap();
        store.refresh_if_required().await;

        store
            .add_provider(handle(
                tenant_id,
                provider_id,
                vec![entity("https://new.example.com", RoleKind::IdentityProvider)],
            ))
            .await
            .unwrap();
        store.refresh_if_required().await;

        assert!(store
            .get_entity_descriptor("https://new.example.com")
            .await
            .is_ok());
        let err = store
            .get_entity_descriptor("https://old.example.com")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.provider_count().await, 1);
    }

    #[tokio::test]
    async fn test_remove_provider_is_idempotent() {
        let tenant_id = TenantId::new();
        let provider_id = ProviderId::new();
        let store = TenantMetadataStore::new(tenant_id);
        store
            .add_provider(handle(
                tenant_id,
                provider_id,
                vec![entity("https://idp.example.com", RoleKind::IdentityProvider)],
            ))
            .await
            .unwrap();

        assert!(store.remove_provider(provider_id).await);
        assert!(!store.remove_provider(provider_id).await);

        store.refresh_if_required().await;
        assert!(store
            .get_entity_descriptor("https://idp.example.com")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_hash_and_alias_lookup() {
        let tenant_id = TenantId::new();
        let store = TenantMetadataStore::new(tenant_id);
        let mut idp = entity("https://idp.example.com", RoleKind::IdentityProvider);
        idp.alias = Some("corp-idp".to_string());
        store
            .add_provider(handle(tenant_id, ProviderId::new(), vec![idp]))
            .await
            .unwrap();
        store.refresh_if_required().await;

        let hash = entity_id_hash("https://idp.example.com");
        let by_hash = store.get_entity_descriptor_by_hash(&hash).await.unwrap();
        assert_eq!(by_hash.entity_id, "https://idp.example.com");

        assert_eq!(
            store.entity_id_for_alias("corp-idp").await.unwrap(),
            "https://idp.example.com"
        );
        assert!(store.entity_id_for_alias("unknown").await.is_err());
        assert!(store.get_entity_descriptor_by_hash(&[0u8; 4]).await.is_err());
    }

    #[tokio::test]
    async fn test_role_lookup() {
        let tenant_id = TenantId::new();
        let store = TenantMetadataStore::new(tenant_id);
        store
            .add_provider(handle(
                tenant_id,
                ProviderId::new(),
                vec![entity("https://sp.example.com", RoleKind::ServiceProvider)],
            ))
            .await
            .unwrap();
        store.refresh_if_required().await;

        let roles = store
            .get_roles("https://sp.example.com", RoleKind::ServiceProvider)
            .await
            .unwrap();
        assert_eq!(roles.len(), 1);

        let role = store
            .get_role("https://sp.example.com", RoleKind::ServiceProvider, SAML2_PROTOCOL)
            .await
            .unwrap();
        assert_eq!(role.kind, RoleKind::ServiceProvider);

        // Wrong kind and wrong protocol both miss.
        assert!(store
            .get_roles("https://sp.example.com", RoleKind::IdentityProvider)
            .await
            .is_err());
        assert!(store
            .get_role("https://sp.example.com", RoleKind::ServiceProvider, "urn:other")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_validity_checks() {
        let tenant_id = TenantId::new();
        let store = TenantMetadataStore::new(tenant_id);
        let mut expired = entity("https://expired.example.com", RoleKind::IdentityProvider);
        expired.valid_until = Some(Utc::now() - Duration::minutes(5));
        let fresh = entity("https://idp.example.com", RoleKind::IdentityProvider);
        store
            .add_provider(handle(tenant_id, ProviderId::new(), vec![expired, fresh]))
            .await
            .unwrap();
        store.refresh_if_required().await;

        // Without the filter, presence is enough.
        assert!(store.is_idp_valid("https://expired.example.com").await);

        store.set_require_valid_metadata(true);
        assert!(!store.is_idp_valid("https://expired.example.com").await);
        assert!(store.is_idp_valid("https://idp.example.com").await);
        assert!(!store.is_sp_valid("https://idp.example.com").await);
        assert!(store
            .get_entity_descriptor("https://expired.example.com")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_default_idp_falls_back_to_known_idp() {
        let tenant_id = TenantId::new();
        let store = TenantMetadataStore::new(tenant_id);
        assert!(store.default_idp().await.is_err());

        store
            .add_provider(handle(
                tenant_id,
                ProviderId::new(),
                vec![entity("https://idp.example.com", RoleKind::IdentityProvider)],
            ))
            .await
            .unwrap();
        store.refresh_if_required().await;
        assert_eq!(store.default_idp().await.unwrap(), "https://idp.example.com");

        store.set_default_idp("https://preferred.example.com").await;
        assert_eq!(
            store.default_idp().await.unwrap(),
            "https://preferred.example.com"
        );
    }

    #[tokio::test]
    async fn test_change_listener_marks_refresh_required() {
        let store = TenantMetadataStore::new(TenantId::new());
        assert!(!store.refresh_required().await);

        let listener = store.change_listener();
        listener.provider_changed(ProviderId::new());
        assert!(store.refresh_required().await);
    }

    #[tokio::test]
    async fn test_destroy_clears_everything() {
        let tenant_id = TenantId::new();
        let store = TenantMetadataStore::new(tenant_id);
        store
            .add_provider(handle(
                tenant_id,
                ProviderId::new(),
                vec![entity("https://idp.example.com", RoleKind::IdentityProvider)],
            ))
            .await
            .unwrap();
        store.refresh_if_required().await;

        store.destroy().await;
        assert_eq!(store.provider_count().await, 0);
        assert!(store
            .get_entity_descriptor("https://idp.example.com")
            .await
            .is_err());
        assert!(store.idp_names().await.is_empty());
    }
}
