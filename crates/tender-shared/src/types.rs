//! Common types

use uuid::Uuid;

/// Tenant identifier. Every repository is constructed with exactly one of
/// these and scopes every query to it.
pub type TenantId = Uuid;

pub fn new_tenant_id() -> TenantId {
    Uuid::new_v4()
}
