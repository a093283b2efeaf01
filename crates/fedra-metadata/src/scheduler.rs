//! Background metadata refresh scheduler.
//!
//! Once per interval, scans every known tenant, pulls the provider
//! configuration records that changed since the last successful pass,
//! re-registers only those into the owning tenant's store, and settles the
//! store's index once per changed tenant. A pass that fails at the
//! directory level is abandoned without advancing the watermark, so the
//! next tick retries the same changed set (at-least-once, never
//! at-most-once).

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, error, info, instrument};

use fedra_core::{ProviderId, TenantId};

use crate::config::{RefreshConfig, MIN_REFRESH_INTERVAL};
use crate::directory::{ProviderDirectory, TenantDirectory};
use crate::error::{DirectoryError, FederationResult};
use crate::provider::{MetadataParser, ProviderKind};
use crate::registry::TenantRegistry;

/// Counters for one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Tenants enumerated this pass.
    pub tenants_scanned: usize,
    /// Provider handles successfully registered.
    pub providers_registered: usize,
    /// Records whose definition failed to parse (retried next pass).
    pub parse_failures: usize,
    /// Handles rejected by a store (skipped, not retried).
    pub registration_failures: usize,
}

/// Keeps every tenant's store eventually consistent with its configuration
/// source.
pub struct RefreshScheduler {
    registry: Arc<TenantRegistry>,
    tenants: Arc<dyn TenantDirectory>,
    providers: Arc<dyn ProviderDirectory>,
    parser: Arc<dyn MetadataParser>,
    interval: RwLock<Duration>,
    /// Instant the last fully successful pass started. Records modified
    /// strictly after this are "new" on the next pass.
    watermark: RwLock<DateTime<Utc>>,
    /// Records whose parse failed; re-attempted every pass regardless of
    /// timestamp until they parse (retry-until-fixed).
    retry: Mutex<HashSet<(TenantId, ProviderId)>>,
    shutdown: AtomicBool,
    shutdown_notify: Notify,
}

impl RefreshScheduler {
    #[must_use]
    pub fn new(
        registry: Arc<TenantRegistry>,
        tenants: Arc<dyn TenantDirectory>,
        providers: Arc<dyn ProviderDirectory>,
        parser: Arc<dyn MetadataParser>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            registry,
            tenants,
            providers,
            parser,
            interval: RwLock::new(config.effective_interval()),
            watermark: RwLock::new(DateTime::<Utc>::UNIX_EPOCH),
            retry: Mutex::new(HashSet::new()),
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        }
    }

    /// The watermark of the last fully successful pass.
    pub async fn watermark(&self) -> DateTime<Utc> {
        *self.watermark.read().await
    }

    /// Current interval between passes.
    pub async fn interval(&self) -> Duration {
        *self.interval.read().await
    }

    /// Reconfigure the interval, observed from the next tick onwards.
    /// Clamped to [`MIN_REFRESH_INTERVAL`].
    pub async fn set_interval(&self, interval: Duration) {
        let clamped = interval.max(MIN_REFRESH_INTERVAL);
        *self.interval.write().await = clamped;
        debug!(interval_secs = clamped.as_secs(), "Refresh interval updated");
    }

    /// Request that no further passes start. An in-flight pass finishes.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.shutdown_notify.notify_one();
    }

    /// Whether shutdown was requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Run one full refresh pass over all tenants.
    ///
    /// Parse and registration failures are contained to the record they
    /// occurred on; a directory failure lets the remaining tenants finish
    /// but fails the pass, leaving the watermark untouched.
    #[instrument(skip(self))]
    pub async fn run_pass(&self) -> FederationResult<PassStats> {
        let pass_start = Utc::now();
        let watermark = *self.watermark.read().await;
        let mut stats = PassStats::default();
        let mut first_failure: Option<String> = None;

        let tenant_ids = self.tenants.list_tenants().await?;
        for tenant_id in tenant_ids {
            stats.tenants_scanned += 1;
            let records = match self.providers.list_provider_configs(tenant_id).await {
                Ok(records) => records,
                Err(e) => {
                    error!(
                        tenant_id = %tenant_id,
                        error = %e,
                        "Unable to list provider configs; pass will be retried"
                    );
                    first_failure.get_or_insert(e.to_string());
                    continue;
                }
            };

            let store = self.registry.get_or_create(tenant_id).await;
            let mut changed = false;
            for record in records {
                if record.kind != ProviderKind::Federation {
                    continue;
                }
                let retry_key = (tenant_id, record.id);
                let retrying = self.retry.lock().await.contains(&retry_key);
                if record.last_modified <= watermark && !retrying {
                    continue;
                }

                match self.parser.parse(&record).await {
                    Ok(handle) => {
                        self.retry.lock().await.remove(&retry_key);
                        match store.add_provider(handle).await {
                            Ok(()) => {
                                stats.providers_registered += 1;
                                changed = true;
                            }
                            Err(e) => {
                                stats.registration_failures += 1;
                                error!(
                                    tenant_id = %tenant_id,
                                    provider_id = %record.id,
                                    error = %e,
                                    "Store rejected metadata provider"
                                );
                            }
                        }
                    }
                    Err(e) => {
                        stats.parse_failures += 1;
                        self.retry.lock().await.insert(retry_key);
                        error!(
                            tenant_id = %tenant_id,
                            provider_id = %record.id,
                            error = %e,
                            "Unable to load provider"
                        );
                    }
                }
            }

            if changed {
                store.refresh_if_required().await;
            }
        }

        if let Some(failure) = first_failure {
            return Err(DirectoryError::Unavailable(failure).into());
        }

        *self.watermark.write().await = pass_start;
        info!(
            tenants = stats.tenants_scanned,
            registered = stats.providers_registered,
            parse_failures = stats.parse_failures,
            registration_failures = stats.registration_failures,
            "Completed metadata refresh pass"
        );
        Ok(stats)
    }

    /// Tick loop. Runs until [`shutdown`](Self::shutdown); pass failures
    /// are logged and swallowed, leaving the watermark for the next tick.
    pub async fn run(&self) {
        let interval_secs = self.interval.read().await.as_secs();
        info!(
            interval_secs = interval_secs,
            "Starting metadata refresh scheduler"
        );
        loop {
            if self.is_shutdown() {
                break;
            }
            let interval = *self.interval.read().await;
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.shutdown_notify.notified() => {}
            }
            if self.is_shutdown() {
                break;
            }
            if let Err(e) = self.run_pass().await {
                error!(error = %e, "Metadata refresh pass failed");
            }
        }
        info!("Metadata refresh scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{InMemoryProviderDirectory, InMemoryTenantDirectory};
    use crate::provider::JsonMetadataParser;

    fn scheduler() -> (
        Arc<RefreshScheduler>,
        Arc<TenantRegistry>,
        Arc<InMemoryTenantDirectory>,
    ) {
        let registry = Arc::new(TenantRegistry::new());
        let tenants = Arc::new(InMemoryTenantDirectory::new());
        let providers = Arc::new(InMemoryProviderDirectory::new());
        let scheduler = Arc::new(RefreshScheduler::new(
            registry.clone(),
            tenants.clone(),
            providers,
            Arc::new(JsonMetadataParser::new()),
            RefreshConfig::default(),
        ));
        (scheduler, registry, tenants)
    }

    #[tokio::test]
    async fn test_empty_pass_advances_watermark() {
        let (scheduler, _, _) = scheduler();
        let before = scheduler.watermark().await;
        assert_eq!(before, DateTime::<Utc>::UNIX_EPOCH);

        let stats = scheduler.run_pass().await.unwrap();
        assert_eq!(stats, PassStats::default());
        assert!(scheduler.watermark().await > before);
    }

    #[tokio::test]
    async fn test_pass_creates_store_for_each_tenant() {
        let (scheduler, registry, tenants) = scheduler();
        let tenant_id = TenantId::new();
        tenants.add_tenant(tenant_id).await;

        let stats = scheduler.run_pass().await.unwrap();
        assert_eq!(stats.tenants_scanned, 1);
        assert!(registry.get(tenant_id).await.is_some());
    }

    #[tokio::test]
    async fn test_set_interval_enforces_minimum() {
        let (scheduler, _, _) = scheduler();
        scheduler.set_interval(Duration::from_millis(1)).await;
        assert_eq!(scheduler.interval().await, MIN_REFRESH_INTERVAL);
    }

    #[tokio::test]
    async fn test_shutdown_stops_run_loop() {
        let (scheduler, _, _) = scheduler();
        scheduler.set_interval(Duration::from_secs(3600)).await;

        let task = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run().await })
        };
        scheduler.shutdown();
        // The notify permit wakes the sleeping loop immediately.
        task.await.unwrap();
        assert!(scheduler.is_shutdown());
    }
}
