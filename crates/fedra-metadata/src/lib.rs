//! # fedra-metadata
//!
//! Per-tenant SAML federation trust-metadata registry for the fedra
//! identity service.
//!
//! Each tenant owns an isolated [`TenantMetadataStore`] of parsed metadata
//! provider handles; the [`TenantRegistry`] creates stores lazily with
//! exactly one winner under concurrent first access; the
//! [`RefreshScheduler`] keeps every store eventually consistent with the
//! tenant/provider directories without blocking readers; and the
//! [`FederationMetadataManager`] facade routes every call by an explicit
//! [`TenantContext`](fedra_core::TenantContext).
//!
//! Metadata parsing, signature verification, and persistence of the
//! configuration records are collaborator concerns behind the
//! [`MetadataParser`], [`TenantDirectory`], and [`ProviderDirectory`]
//! traits.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fedra_core::{TenantContext, TenantId};
//! use fedra_metadata::{
//!     FederationMetadataManager, InMemoryProviderDirectory, InMemoryTenantDirectory,
//!     JsonMetadataParser,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = FederationMetadataManager::builder(
//!     Arc::new(InMemoryTenantDirectory::new()),
//!     Arc::new(InMemoryProviderDirectory::new()),
//!     Arc::new(JsonMetadataParser::new()),
//! )
//! .build();
//!
//! manager.start().await?;
//!
//! let ctx = TenantContext::new(TenantId::new());
//! let descriptor = manager
//!     .get_entity_descriptor(ctx, "https://idp.example.com")
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod descriptor;
pub mod directory;
pub mod error;
pub mod keys;
pub mod manager;
pub mod provider;
pub mod registry;
pub mod scheduler;
pub mod store;

pub use config::{RefreshConfig, RefreshConfigBuilder, DEFAULT_REFRESH_INTERVAL, MIN_REFRESH_INTERVAL};
pub use descriptor::{
    entity_id_hash, Endpoint, EntityDescriptor, ExtendedMetadata, KeyDescriptor, KeyUse,
    RoleDescriptor, RoleKind, SAML2_PROTOCOL,
};
pub use directory::{
    InMemoryProviderDirectory, InMemoryTenantDirectory, PgProviderDirectory, PgTenantDirectory,
    ProviderDirectory, TenantDirectory,
};
pub use error::{
    DirectoryError, FederationError, FederationResult, ParseError, RegistrationError,
};
pub use keys::{KeyEntry, KeyManager};
pub use manager::{FederationMetadataManager, FederationMetadataManagerBuilder};
pub use provider::{
    JsonMetadataParser, MetadataParser, MetadataProviderHandle, ProviderChange,
    ProviderChangeListener, ProviderConfigRecord, ProviderKind,
};
pub use registry::TenantRegistry;
pub use scheduler::{PassStats, RefreshScheduler};
pub use store::TenantMetadataStore;
