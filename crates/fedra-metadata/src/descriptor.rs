//! In-memory SAML metadata model.
//!
//! The parsed, queryable representation of one federation endpoint's trust
//! metadata: entity descriptors, their roles, and key material. Produced by
//! a [`MetadataParser`](crate::provider::MetadataParser) from a provider
//! definition blob; the registry core never touches XML itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SAML 2.0 protocol support enumeration URI.
pub const SAML2_PROTOCOL: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// The role an entity plays in a federation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    /// Asserting party (IDPSSODescriptor).
    IdentityProvider,
    /// Relying party (SPSSODescriptor).
    ServiceProvider,
}

impl std::fmt::Display for RoleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleKind::IdentityProvider => write!(f, "identity_provider"),
            RoleKind::ServiceProvider => write!(f, "service_provider"),
        }
    }
}

/// Intended use of a key within a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUse {
    Signing,
    Encryption,
}

/// One piece of key material attached to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDescriptor {
    /// What the key is for.
    #[serde(rename = "use")]
    pub key_use: KeyUse,
    /// X.509 certificate, PEM encoded.
    pub certificate_pem: String,
}

/// A protocol endpoint exposed by a role (SSO, SLO, ACS, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Binding URI (e.g. HTTP-Redirect, HTTP-POST).
    pub binding: String,
    /// Endpoint location URL.
    pub location: String,
}

/// One role descriptor within an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDescriptor {
    /// Which role this descriptor declares.
    pub kind: RoleKind,
    /// Supported protocol enumeration URIs.
    #[serde(default = "default_protocols")]
    pub protocols: Vec<String>,
    /// Key material for this role.
    #[serde(default)]
    pub keys: Vec<KeyDescriptor>,
    /// Protocol endpoints for this role.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

fn default_protocols() -> Vec<String> {
    vec![SAML2_PROTOCOL.to_string()]
}

impl RoleDescriptor {
    /// Whether this role declares support for the given protocol URI.
    #[must_use]
    pub fn supports_protocol(&self, protocol: &str) -> bool {
        self.protocols.iter().any(|p| p == protocol)
    }
}

/// A parsed entity descriptor: one federation participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// The entity ID (URI) this descriptor describes.
    pub entity_id: String,
    /// Optional short alias, resolvable via `entity_id_for_alias`.
    #[serde(default)]
    pub alias: Option<String>,
    /// Declared roles.
    #[serde(default)]
    pub roles: Vec<RoleDescriptor>,
    /// Descriptor expiry; `None` means no expiry declared.
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl EntityDescriptor {
    /// Whether the descriptor is within its validity window at `at`.
    #[must_use]
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        match self.valid_until {
            Some(until) => at <= until,
            None => true,
        }
    }

    /// Whether the entity declares the given role.
    #[must_use]
    pub fn has_role(&self, kind: RoleKind) -> bool {
        self.roles.iter().any(|r| r.kind == kind)
    }

    /// All roles of the given kind.
    pub fn roles_of_kind(&self, kind: RoleKind) -> impl Iterator<Item = &RoleDescriptor> {
        self.roles.iter().filter(move |r| r.kind == kind)
    }

    /// SHA-256 hash of the entity ID, used for hash-based lookups.
    #[must_use]
    pub fn entity_id_hash(&self) -> [u8; 32] {
        entity_id_hash(&self.entity_id)
    }
}

/// SHA-256 over the UTF-8 bytes of an entity ID.
#[must_use]
pub fn entity_id_hash(entity_id: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(entity_id.as_bytes());
    hasher.finalize().into()
}

/// Store-level defaults applied to entities that do not carry their own
/// extended metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedMetadata {
    /// Default alias for locally hosted entities.
    #[serde(default)]
    pub alias: Option<String>,
    /// Whether IdP discovery is enabled.
    #[serde(default)]
    pub idp_discovery_enabled: bool,
    /// Whether generated metadata should be signed.
    #[serde(default)]
    pub sign_metadata: bool,
    /// Whether logout requests must be signed.
    #[serde(default)]
    pub require_logout_request_signed: bool,
}
