//! Domain errors
//!
//! The repository layer only ever produces `Database` or "nothing matched"
//! signals; the service upgrades those into the typed errors below. Callers
//! are expected to re-fetch and retry on `Conflict`, fix input on
//! `Validation`, and treat not-found as terminal for that identifier.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    /// Entity absent or owned by another tenant. The two cases are
    /// indistinguishable on purpose so existence never leaks across tenants.
    #[error("Tender not found")]
    TenderNotFound,

    #[error("Budget line not found")]
    BudgetLineNotFound,

    /// The optimistic state check failed: the tender's state changed between
    /// read and write.
    #[error("Concurrent state change: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),
}
