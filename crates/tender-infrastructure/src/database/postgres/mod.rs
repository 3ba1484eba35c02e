//! PostgreSQL implementations (adapters)

pub mod tenant_scope;
pub mod tender_repo_impl;

pub use tenant_scope::{ChangeSet, Filter, OrderBy, PgTenantRepository, SqlValue, TenantRecord};
pub use tender_repo_impl::PgTenderRepository;
