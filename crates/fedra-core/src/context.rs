//! Explicit tenant context.
//!
//! fedra does not resolve the "current" tenant from any ambient state
//! (thread-locals, task-locals, globals). Callers construct a
//! [`TenantContext`] at the edge — from an authenticated request, a job
//! record, a CLI flag — and pass it through every tenant-scoped call.
//! A missing tenant is therefore a type error, not a runtime condition.

use crate::ids::TenantId;

/// The tenant on whose behalf an operation runs.
///
/// Thin, copyable wrapper over [`TenantId`]. Exists as its own type so that
/// signatures distinguish "the tenant performing this call" from tenant IDs
/// that are merely data (e.g. a record's owner field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    /// Create a context for the given tenant.
    #[must_use]
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    /// The tenant this context refers to.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

impl From<TenantId> for TenantContext {
    fn from(tenant_id: TenantId) -> Self {
        Self::new(tenant_id)
    }
}

impl From<TenantContext> for TenantId {
    fn from(ctx: TenantContext) -> Self {
        ctx.tenant_id
    }
}
