//! Provider configuration records, parsed handles, and the parser seam.
//!
//! A [`ProviderConfigRecord`] is what the provider directory persists: a
//! kind tag, a JSON definition blob, and a last-modified timestamp. The
//! [`MetadataParser`] collaborator turns federation records into
//! [`MetadataProviderHandle`]s, the opaque queryable artifacts the
//! per-tenant store registers. Out-of-band changes to a handle's source
//! (e.g. a remote metadata re-fetch) are signalled through a
//! [`ProviderChangeListener`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use fedra_core::{ProviderId, TenantId, TenantScoped};

use crate::descriptor::{EntityDescriptor, ExtendedMetadata};
use crate::error::ParseError;

/// Kind tag on a provider configuration record.
///
/// Only [`ProviderKind::Federation`] records are considered by the refresh
/// scheduler; other kinds belong to sibling subsystems and are ignored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// SAML federation endpoint definition.
    Federation,
    /// OIDC provider definition.
    Oidc,
    /// Social login provider definition.
    Social,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Federation => write!(f, "federation"),
            ProviderKind::Oidc => write!(f, "oidc"),
            ProviderKind::Social => write!(f, "social"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "federation" | "saml" => Ok(ProviderKind::Federation),
            "oidc" => Ok(ProviderKind::Oidc),
            "social" => Ok(ProviderKind::Social),
            _ => Err(format!("Unknown provider kind: {s}")),
        }
    }
}

/// Externally persisted definition of one federation endpoint.
///
/// Owned and mutated by the tenant/provider management plane; this core
/// only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfigRecord {
    /// Record identifier, stable across updates.
    pub id: ProviderId,
    /// Tenant that owns the record.
    pub tenant_id: TenantId,
    /// Kind tag.
    pub kind: ProviderKind,
    /// Serialized provider definition.
    pub definition: serde_json::Value,
    /// When the record was last modified.
    pub last_modified: DateTime<Utc>,
}

impl TenantScoped for ProviderConfigRecord {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Parsed, queryable in-memory representation of one provider's trust
/// metadata.
///
/// Owned by exactly one tenant's store once registered; never shared
/// across tenants.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataProviderHandle {
    id: ProviderId,
    tenant_id: TenantId,
    entities: Vec<EntityDescriptor>,
    extended: Option<ExtendedMetadata>,
}

impl MetadataProviderHandle {
    /// Build a handle from parsed entity descriptors.
    #[must_use]
    pub fn new(
        id: ProviderId,
        tenant_id: TenantId,
        entities: Vec<EntityDescriptor>,
        extended: Option<ExtendedMetadata>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            entities,
            extended,
        }
    }

    /// Identifier of the source configuration record.
    #[must_use]
    pub fn id(&self) -> ProviderId {
        self.id
    }

    /// Entity descriptors this provider exposes.
    #[must_use]
    pub fn entities(&self) -> &[EntityDescriptor] {
        &self.entities
    }

    /// Entity IDs this provider exposes.
    pub fn entity_ids(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.entity_id.as_str())
    }

    /// Provider-level extended metadata, if the definition carried any.
    #[must_use]
    pub fn extended_metadata(&self) -> Option<&ExtendedMetadata> {
        self.extended.as_ref()
    }
}

impl TenantScoped for MetadataProviderHandle {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Parses provider configuration records into metadata provider handles.
///
/// The implementation owns all XML/signature concerns; a failed parse is
/// reported as [`ParseError`] and never aborts a refresh pass.
#[async_trait]
pub trait MetadataParser: Send + Sync {
    /// Parse a federation record's definition blob.
    async fn parse(&self, record: &ProviderConfigRecord)
        -> Result<MetadataProviderHandle, ParseError>;
}

/// Wire shape of a federation provider definition blob.
#[derive(Debug, Deserialize)]
struct ProviderDefinition {
    entities: Vec<EntityDescriptor>,
    #[serde(default)]
    extended: Option<ExtendedMetadata>,
}

/// Reference parser for JSON provider definitions.
///
/// Expects `{"entities": [...], "extended": {...}?}` where each entry is an
/// [`EntityDescriptor`]. Production deployments substitute a SAML XML
/// parser behind the same trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMetadataParser;

impl JsonMetadataParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetadataParser for JsonMetadataParser {
    async fn parse(
        &self,
        record: &ProviderConfigRecord,
    ) -> Result<MetadataProviderHandle, ParseError> {
        if record.kind != ProviderKind::Federation {
            return Err(ParseError::UnsupportedKind(record.kind.to_string()));
        }

        let definition: ProviderDefinition = serde_json::from_value(record.definition.clone())
            .map_err(|e| ParseError::MalformedDefinition(e.to_string()))?;

        if definition.entities.is_empty() {
            return Err(ParseError::EmptyDefinition);
        }

        Ok(MetadataProviderHandle::new(
            record.id,
            record.tenant_id,
            definition.entities,
            definition.extended,
        ))
    }
}

/// A provider change event: the named provider's source material changed
/// out-of-band and the owning store should rebuild on its next settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderChange {
    /// The provider whose source changed.
    pub provider_id: ProviderId,
}

/// Sending half of a store's provider-change channel.
///
/// Handed to parsing collaborators so they can flag out-of-band changes
/// (e.g. a periodic remote metadata fetch completing) without holding any
/// reference into the store itself. Cheap to clone; events for a store
/// that has been dropped are silently discarded.
#[derive(Debug, Clone)]
pub struct ProviderChangeListener {
    tx: mpsc::UnboundedSender<ProviderChange>,
}

impl ProviderChangeListener {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ProviderChange>) -> Self {
        Self { tx }
    }

    /// Signal that the given provider's source material changed.
    pub fn provider_changed(&self, provider_id: ProviderId) {
        let _ = self.tx.send(ProviderChange { provider_id });
    }
}
