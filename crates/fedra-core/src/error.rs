//! Core Error Types
//!
//! The error vocabulary shared by fedra services. Domain crates define
//! richer taxonomies of their own and convert into these at the boundary.

use crate::ids::TenantId;
use serde::Serialize;
use thiserror::Error;

/// Standardized error type for fedra services.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreError {
    /// Requested resource was not found.
    ///
    /// A lookup miss, not a failure; callers decide whether it is fatal.
    #[error("{resource} not found{}", id.as_ref().map(|i| format!(": {i}")).unwrap_or_default())]
    NotFound {
        /// The type of resource that was not found (e.g. "EntityDescriptor").
        resource: String,
        /// Optional identifier of the resource.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Tenant isolation violation.
    ///
    /// An operation attempted to move data across tenant boundaries.
    /// This is a security error, never a recoverable condition.
    #[error("Tenant mismatch: expected {expected}, got {actual}")]
    TenantMismatch {
        /// The tenant that owns the target container.
        expected: TenantId,
        /// The tenant the offending data belongs to.
        actual: TenantId,
    },

    /// Input validation failure.
    #[error("Validation error on field '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Description of the validation failure.
        message: String,
    },
}

/// Type alias for Results using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
