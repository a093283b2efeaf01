//! Tenant and provider directory collaborators.
//!
//! The refresh scheduler enumerates tenants and their provider
//! configuration records through these traits. Ships an in-memory
//! implementation (tests, embedders) and a PostgreSQL-backed one for
//! deployments where the management plane persists records in the shared
//! database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use fedra_core::{ProviderId, TenantId};

use crate::error::DirectoryError;
use crate::provider::{ProviderConfigRecord, ProviderKind};

/// Enumerates the tenants known to the management plane.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// All currently known tenants.
    async fn list_tenants(&self) -> Result<Vec<TenantId>, DirectoryError>;
}

/// Enumerates a tenant's provider configuration records.
#[async_trait]
pub trait ProviderDirectory: Send + Sync {
    /// All provider configuration records for `tenant_id`, any kind.
    async fn list_provider_configs(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<ProviderConfigRecord>, DirectoryError>;
}

/// In-memory tenant directory.
#[derive(Debug, Default)]
pub struct InMemoryTenantDirectory {
    tenants: RwLock<Vec<TenantId>>,
}

impl InMemoryTenantDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant. Duplicate registrations are ignored.
    pub async fn add_tenant(&self, tenant_id: TenantId) {
        let mut tenants = self.tenants.write().await;
        if !tenants.contains(&tenant_id) {
            tenants.push(tenant_id);
        }
    }

    pub async fn remove_tenant(&self, tenant_id: TenantId) {
        self.tenants.write().await.retain(|t| *t != tenant_id);
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn list_tenants(&self) -> Result<Vec<TenantId>, DirectoryError> {
        Ok(self.tenants.read().await.clone())
    }
}

/// In-memory provider directory.
#[derive(Debug, Default)]
pub struct InMemoryProviderDirectory {
    records: RwLock<HashMap<TenantId, Vec<ProviderConfigRecord>>>,
}

impl InMemoryProviderDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record (matched by record ID within its tenant).
    pub async fn upsert_record(&self, record: ProviderConfigRecord) {
        let mut records = self.records.write().await;
        let tenant_records = records.entry(record.tenant_id).or_default();
        tenant_records.retain(|r| r.id != record.id);
        tenant_records.push(record);
    }

    pub async fn remove_record(&self, tenant_id: TenantId, provider_id: ProviderId) {
        if let Some(tenant_records) = self.records.write().await.get_mut(&tenant_id) {
            tenant_records.retain(|r| r.id != provider_id);
        }
    }
}

#[async_trait]
impl ProviderDirectory for InMemoryProviderDirectory {
    async fn list_provider_configs(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<ProviderConfigRecord>, DirectoryError> {
        Ok(self
            .records
            .read()
            .await
            .get(&tenant_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// PostgreSQL-backed tenant directory.
pub struct PgTenantDirectory {
    pool: PgPool,
}

impl PgTenantDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn list_tenants(&self) -> Result<Vec<TenantId>, DirectoryError> {
        let rows = sqlx::query(
            r"
            SELECT id FROM tenants
            ORDER BY created_at ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| TenantId::from_uuid(r.get::<Uuid, _>("id")))
            .collect())
    }
}

/// PostgreSQL-backed provider directory.
pub struct PgProviderDirectory {
    pool: PgPool,
}

impl PgProviderDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderDirectory for PgProviderDirectory {
    async fn list_provider_configs(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<ProviderConfigRecord>, DirectoryError> {
        let rows = sqlx::query(
            r"
            SELECT id, tenant_id, kind, definition, last_modified
            FROM federation_provider_configs
            WHERE tenant_id = $1
            ORDER BY last_modified ASC
            ",
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let kind_str: String = row.get("kind");
            let kind: ProviderKind = match kind_str.parse() {
                Ok(kind) => kind,
                Err(_) => {
                    // Kinds this registry does not model belong to sibling
                    // subsystems; skip them here.
                    debug!(
                        tenant_id = %tenant_id,
                        kind = %kind_str,
                        "Skipping provider config of unmodeled kind"
                    );
                    continue;
                }
            };
            records.push(ProviderConfigRecord {
                id: ProviderId::from_uuid(row.get::<Uuid, _>("id")),
                tenant_id: TenantId::from_uuid(row.get::<Uuid, _>("tenant_id")),
                kind,
                definition: row.get::<serde_json::Value, _>("definition"),
                last_modified: row.get::<DateTime<Utc>, _>("last_modified"),
            });
        }
        Ok(records)
    }
}
