//! Federation metadata error types

use fedra_core::TenantId;
use thiserror::Error;

/// Result type for federation metadata operations
pub type FederationResult<T> = Result<T, FederationError>;

/// Errors surfaced by the metadata registry.
#[derive(Debug, Error)]
pub enum FederationError {
    /// Malformed provider configuration record.
    ///
    /// The scheduler logs these, skips the record, and retries it on the
    /// next pass until the record parses.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// A store rejected a metadata provider handle.
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// Lookup miss. Returned to the caller, never logged as an error.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// The type of resource that was not found.
        resource: &'static str,
        /// Identifier the lookup used.
        id: String,
    },

    /// A tenant or provider directory collaborator failed.
    ///
    /// Aborts the refresh pass; the watermark is not advanced and the next
    /// tick retries the same changed set.
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Operation on a manager that has already been destroyed.
    #[error("Metadata manager has been destroyed")]
    Terminated,
}

impl FederationError {
    /// Construct a lookup-miss error.
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// Whether this error is a plain lookup miss.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Provider configuration record could not be parsed into a handle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The definition blob is not a valid provider definition.
    #[error("Malformed provider definition: {0}")]
    MalformedDefinition(String),

    /// The record's kind is not one this parser understands.
    #[error("Unsupported provider kind: {0}")]
    UnsupportedKind(String),

    /// The definition parsed but contains no entity descriptors.
    #[error("Provider definition contains no entity descriptors")]
    EmptyDefinition,
}

/// A store rejected a metadata provider handle at registration time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// Another provider in the same store already serves this entity ID.
    #[error("Entity ID already registered by another provider: {0}")]
    DuplicateEntityId(String),

    /// The handle belongs to a different tenant than the store.
    ///
    /// Trust material never crosses tenant boundaries; this rejection is
    /// what enforces it structurally.
    #[error("Provider belongs to tenant {actual}, store belongs to tenant {expected}")]
    ForeignTenant {
        /// The tenant that owns the store.
        expected: TenantId,
        /// The tenant that owns the handle.
        actual: TenantId,
    },

    /// The handle exposes no entity descriptors.
    #[error("Provider handle exposes no entity descriptors")]
    EmptyHandle,
}

/// Failure of a tenant or provider directory collaborator.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Database error from a SQL-backed directory.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Backend unreachable or otherwise unable to answer.
    #[error("Directory backend unavailable: {0}")]
    Unavailable(String),
}
