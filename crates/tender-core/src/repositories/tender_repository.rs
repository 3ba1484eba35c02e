//! Tender repository trait (port)
//!
//! The adapter behind this trait is constructed for one tenant and applies
//! the tenant filter to every operation; nothing here can bypass it. The
//! adapter never raises business-rule errors — only `Database` failures and
//! "nothing matched" signals (`None` / `false`), which the service upgrades
//! into the typed domain errors.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    BudgetLine, BudgetLinePatch, BudgetLineView, Country, NewBudgetLine, NewTender,
    ParentSummary, ProcurementType, Tender, TenderPatch, TenderState,
};
use crate::error::DomainError;

/// Days ahead in which a child tender still in analysis counts as urgent and
/// surfaces in the root listing.
pub const URGENT_CHILD_WINDOW_DAYS: i64 = 5;

/// Optional filters for the tender listing.
#[derive(Debug, Clone, Default)]
pub struct TenderListFilter {
    pub state: Option<TenderState>,
    /// Case-insensitive substring match on the name.
    pub name: Option<String>,
    pub country: Option<Country>,
}

/// A tender with its lines and family, as the detail view needs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenderDetails {
    pub tender: Tender,
    /// Active and inactive lines, ordered by lot then line id.
    pub lines: Vec<BudgetLineView>,
    /// Child tenders, populated only for framework agreements / call-off
    /// lists.
    pub children: Vec<Tender>,
    /// Present when this tender hangs off a parent.
    pub parent: Option<ParentSummary>,
}

#[async_trait]
pub trait TenderRepository: Send + Sync {
    /// Root tenders matching the filters, plus child tenders in analysis
    /// whose submission date falls inside the urgency window. Deduped by id,
    /// ordered id descending.
    async fn list_tenders(&self, filter: &TenderListFilter) -> Result<Vec<Tender>, DomainError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Tender>, DomainError>;

    /// Insert a tender. State and procurement type are passed by the service
    /// (which owns the creation rules); the tenant id comes from the
    /// repository scope, never from the payload.
    async fn create(
        &self,
        new: &NewTender,
        state: TenderState,
        procurement: ProcurementType,
    ) -> Result<Tender, DomainError>;

    /// Tenant-filtered partial update. `None` when no row matched.
    async fn update(&self, id: i64, patch: &TenderPatch) -> Result<Option<Tender>, DomainError>;

    /// `false` when no row matched.
    async fn delete(&self, id: i64) -> Result<bool, DomainError>;

    async fn children_of(&self, parent_id: i64) -> Result<Vec<Tender>, DomainError>;

    async fn find_with_details(&self, id: i64) -> Result<Option<TenderDetails>, DomainError>;

    /// Exact-decimal aggregate sale value of the active lines, using the
    /// tender's pricing model.
    async fn active_budget_total(&self, tender_id: i64) -> Result<Decimal, DomainError>;

    /// Whether any active line lacks a catalog product reference.
    async fn has_unbound_active_lines(&self, tender_id: i64) -> Result<bool, DomainError>;

    async fn find_line(
        &self,
        tender_id: i64,
        line_id: i64,
    ) -> Result<Option<BudgetLineView>, DomainError>;

    /// Insert a line; tender id and tenant id are forced server-side.
    async fn add_line(
        &self,
        tender_id: i64,
        new: &NewBudgetLine,
    ) -> Result<BudgetLine, DomainError>;

    async fn update_line(
        &self,
        tender_id: i64,
        line_id: i64,
        patch: &BudgetLinePatch,
    ) -> Result<Option<BudgetLine>, DomainError>;

    async fn delete_line(&self, tender_id: i64, line_id: i64) -> Result<bool, DomainError>;

    /// Cascade step: remove every line of the tender.
    async fn delete_lines(&self, tender_id: i64) -> Result<(), DomainError>;

    /// Cascade step: remove execution records referencing the tender. The
    /// storage provides no cascade, so the service runs this before
    /// deleting the tender itself.
    async fn delete_execution_records(&self, tender_id: i64) -> Result<(), DomainError>;

    /// Framework agreements / call-off lists currently awarded — the ones a
    /// new child contract may attach to.
    async fn parent_candidates(&self) -> Result<Vec<Tender>, DomainError>;

    /// Conditional update: writes only if the row's state still equals
    /// `expected`. `None` means the state moved since it was read — the one
    /// optimistic-concurrency primitive in the system.
    async fn update_with_state_check(
        &self,
        id: i64,
        patch: &TenderPatch,
        expected: TenderState,
    ) -> Result<Option<Tender>, DomainError>;
}
