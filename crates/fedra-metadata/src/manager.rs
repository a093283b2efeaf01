//! Federation metadata manager facade.
//!
//! The single externally-visible metadata contract. Every tenant-scoped
//! operation takes an explicit [`TenantContext`] and forwards to that
//! tenant's store via the registry; there is no ambient "current tenant"
//! resolution anywhere, so a missing tenant is unrepresentable rather
//! than implementation-defined.
//!
//! Provider mutations through the facade settle the store's index
//! immediately; bulk registrations performed by the scheduler settle once
//! per changed tenant instead.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use fedra_core::{ProviderId, TenantContext};

use crate::config::RefreshConfig;
use crate::descriptor::{EntityDescriptor, RoleDescriptor, RoleKind};
use crate::directory::{ProviderDirectory, TenantDirectory};
use crate::error::{FederationError, FederationResult};
use crate::keys::KeyManager;
use crate::provider::{MetadataParser, MetadataProviderHandle};
use crate::registry::TenantRegistry;
use crate::scheduler::{PassStats, RefreshScheduler};
use crate::store::TenantMetadataStore;

type ReadyHook = Box<dyn FnOnce(&FederationMetadataManager) + Send>;

/// Builder for [`FederationMetadataManager`].
pub struct FederationMetadataManagerBuilder {
    tenants: Arc<dyn TenantDirectory>,
    providers: Arc<dyn ProviderDirectory>,
    parser: Arc<dyn MetadataParser>,
    config: RefreshConfig,
    key_manager: Option<Arc<KeyManager>>,
    on_ready: Option<ReadyHook>,
}

impl FederationMetadataManagerBuilder {
    /// Set the refresh configuration.
    #[must_use]
    pub fn config(mut self, config: RefreshConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the process-wide key manager applied to every store.
    #[must_use]
    pub fn key_manager(mut self, key_manager: Arc<KeyManager>) -> Self {
        self.key_manager = Some(key_manager);
        self
    }

    /// Register a hook invoked once [`start`](FederationMetadataManager::start)
    /// has completed its bootstrap pass, so collaborators can register the
    /// manager as the active metadata source.
    #[must_use]
    pub fn on_ready(mut self, hook: impl FnOnce(&FederationMetadataManager) + Send + 'static) -> Self {
        self.on_ready = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn build(self) -> FederationMetadataManager {
        let registry = Arc::new(TenantRegistry::new());
        let scheduler = Arc::new(RefreshScheduler::new(
            registry.clone(),
            self.tenants,
            self.providers,
            self.parser,
            self.config,
        ));
        FederationMetadataManager {
            registry,
            scheduler,
            task: Mutex::new(None),
            pending_key_manager: Mutex::new(self.key_manager),
            on_ready: Mutex::new(self.on_ready),
            destroyed: AtomicBool::new(false),
        }
    }
}

/// Tenant-routing facade over the registry, store, and scheduler.
pub struct FederationMetadataManager {
    registry: Arc<TenantRegistry>,
    scheduler: Arc<RefreshScheduler>,
    task: Mutex<Option<JoinHandle<()>>>,
    pending_key_manager: Mutex<Option<Arc<KeyManager>>>,
    on_ready: Mutex<Option<ReadyHook>>,
    destroyed: AtomicBool,
}

impl FederationMetadataManager {
    /// Start building a manager from its three collaborators.
    #[must_use]
    pub fn builder(
        tenants: Arc<dyn TenantDirectory>,
        providers: Arc<dyn ProviderDirectory>,
        parser: Arc<dyn MetadataParser>,
    ) -> FederationMetadataManagerBuilder {
        FederationMetadataManagerBuilder {
            tenants,
            providers,
            parser,
            config: RefreshConfig::default(),
            key_manager: None,
            on_ready: None,
        }
    }

    /// Bootstrap and begin background refreshing.
    ///
    /// Runs one full refresh pass synchronously before the periodic loop
    /// starts, so the registry never serves requests from a
    /// never-initialized state; a bootstrap failure is returned to the
    /// caller and nothing is spawned. Idempotent once started.
    pub async fn start(&self) -> FederationResult<()> {
        self.ensure_active()?;
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        if let Some(km) = self.pending_key_manager.lock().await.take() {
            self.registry.set_key_manager(km).await;
        }

        self.scheduler.run_pass().await?;

        let scheduler = self.scheduler.clone();
        *task = Some(tokio::spawn(async move { scheduler.run().await }));
        drop(task);
        info!("Federation metadata manager started");

        if let Some(hook) = self.on_ready.lock().await.take() {
            hook(self);
        }
        Ok(())
    }

    /// Stop the scheduler, wait for it, and tear down every store.
    ///
    /// Idempotent. In-flight reader calls finish against the stores they
    /// already resolved; subsequent calls get [`FederationError::Terminated`].
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.scheduler.shutdown();
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
        self.registry.destroy_all().await;
        info!("Federation metadata manager destroyed");
    }

    fn ensure_active(&self) -> FederationResult<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(FederationError::Terminated);
        }
        Ok(())
    }

    /// The tenant registry. Exposed for embedders wiring their own
    /// periphery around the manager.
    #[must_use]
    pub fn registry(&self) -> &Arc<TenantRegistry> {
        &self.registry
    }

    /// Watermark of the last successful refresh pass.
    pub async fn watermark(&self) -> chrono::DateTime<chrono::Utc> {
        self.scheduler.watermark().await
    }

    async fn store_for(&self, ctx: TenantContext) -> FederationResult<Arc<TenantMetadataStore>> {
        self.ensure_active()?;
        Ok(self.registry.get_or_create(ctx.tenant_id()).await)
    }

    /// Resolve an entity descriptor by entity ID.
    pub async fn get_entity_descriptor(
        &self,
        ctx: TenantContext,
        entity_id: &str,
    ) -> FederationResult<Arc<EntityDescriptor>> {
        self.store_for(ctx).await?.get_entity_descriptor(entity_id).await
    }

    /// Resolve an entity descriptor by the SHA-256 hash of its entity ID.
    pub async fn get_entity_descriptor_by_hash(
        &self,
        ctx: TenantContext,
        hash: &[u8],
    ) -> FederationResult<Arc<EntityDescriptor>> {
        self.store_for(ctx)
            .await?
            .get_entity_descriptor_by_hash(hash)
            .await
    }

    /// Resolve an entity ID from its alias.
    pub async fn entity_id_for_alias(
        &self,
        ctx: TenantContext,
        alias: &str,
    ) -> FederationResult<String> {
        self.store_for(ctx).await?.entity_id_for_alias(alias).await
    }

    /// All role descriptors of `kind` declared by the entity.
    pub async fn get_roles(
        &self,
        ctx: TenantContext,
        entity_id: &str,
        kind: RoleKind,
    ) -> FederationResult<Vec<RoleDescriptor>> {
        self.store_for(ctx).await?.get_roles(entity_id, kind).await
    }

    /// The role descriptor of `kind` supporting `protocol`.
    pub async fn get_role(
        &self,
        ctx: TenantContext,
        entity_id: &str,
        kind: RoleKind,
        protocol: &str,
    ) -> FederationResult<RoleDescriptor> {
        self.store_for(ctx)
            .await?
            .get_role(entity_id, kind, protocol)
            .await
    }

    /// Whether the entity is a known, valid identity provider for the
    /// tenant. A destroyed manager reports every entity invalid.
    pub async fn is_idp_valid(&self, ctx: TenantContext, entity_id: &str) -> bool {
        match self.store_for(ctx).await {
            Ok(store) => store.is_idp_valid(entity_id).await,
            Err(_) => false,
        }
    }

    /// Whether the entity is a known, valid service provider for the
    /// tenant. A destroyed manager reports every entity invalid.
    pub async fn is_sp_valid(&self, ctx: TenantContext, entity_id: &str) -> bool {
        match self.store_for(ctx).await {
            Ok(store) => store.is_sp_valid(entity_id).await,
            Err(_) => false,
        }
    }

    /// Known IdP entity IDs for the tenant.
    pub async fn idp_names(&self, ctx: TenantContext) -> FederationResult<HashSet<String>> {
        Ok(self.store_for(ctx).await?.idp_names().await)
    }

    /// Known SP entity IDs for the tenant.
    pub async fn sp_names(&self, ctx: TenantContext) -> FederationResult<HashSet<String>> {
        Ok(self.store_for(ctx).await?.sp_names().await)
    }

    /// Register a provider handle and settle the tenant's index so the
    /// addition is immediately visible.
    pub async fn add_provider(
        &self,
        ctx: TenantContext,
        handle: MetadataProviderHandle,
    ) -> FederationResult<()> {
        let store = self.store_for(ctx).await?;
        store.add_provider(handle).await?;
        store.refresh_if_required().await;
        Ok(())
    }

    /// Unregister a provider (idempotent) and settle the tenant's index.
    pub async fn remove_provider(
        &self,
        ctx: TenantContext,
        provider_id: ProviderId,
    ) -> FederationResult<bool> {
        let store = self.store_for(ctx).await?;
        let removed = store.remove_provider(provider_id).await;
        if removed {
            store.refresh_if_required().await;
        }
        Ok(removed)
    }

    /// The tenant's default IdP.
    pub async fn default_idp(&self, ctx: TenantContext) -> FederationResult<String> {
        self.store_for(ctx).await?.default_idp().await
    }

    pub async fn set_default_idp(
        &self,
        ctx: TenantContext,
        entity_id: impl Into<String>,
    ) -> FederationResult<()> {
        self.store_for(ctx).await?.set_default_idp(entity_id).await;
        Ok(())
    }

    pub async fn hosted_sp_name(&self, ctx: TenantContext) -> FederationResult<Option<String>> {
        Ok(self.store_for(ctx).await?.hosted_sp_name().await)
    }

    pub async fn set_hosted_sp_name(
        &self,
        ctx: TenantContext,
        name: impl Into<String>,
    ) -> FederationResult<()> {
        self.store_for(ctx).await?.set_hosted_sp_name(name).await;
        Ok(())
    }

    /// Toggle the tenant's validity filter.
    pub async fn set_require_valid_metadata(
        &self,
        ctx: TenantContext,
        require: bool,
    ) -> FederationResult<()> {
        self.store_for(ctx)
            .await?
            .set_require_valid_metadata(require);
        Ok(())
    }

    /// Replace the process-wide key manager on all existing and future
    /// stores.
    pub async fn set_key_manager(&self, key_manager: Arc<KeyManager>) -> FederationResult<()> {
        self.ensure_active()?;
        self.registry.set_key_manager(key_manager).await;
        Ok(())
    }

    /// Reconfigure the refresh interval, observed from the next tick.
    pub async fn set_refresh_interval(&self, interval: Duration) -> FederationResult<()> {
        self.ensure_active()?;
        self.scheduler.set_interval(interval).await;
        Ok(())
    }

    /// Force a refresh pass outside the schedule.
    pub async fn run_refresh_pass(&self) -> FederationResult<PassStats> {
        self.ensure_active()?;
        self.scheduler.run_pass().await
    }
}

impl std::fmt::Debug for FederationMetadataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationMetadataManager")
            .field("destroyed", &self.destroyed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
