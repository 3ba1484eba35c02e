//! # Tender Core - Domain Module
//!
//! Domain entities for the tender tracker.

pub mod budget_line;
pub mod tender;

// Re-export all entities and enums
pub use budget_line::{
    active_budget_total, has_unbound_active_line, BudgetLine, BudgetLinePatch, BudgetLineView,
    NewBudgetLine, GENERAL_LOT,
};
pub use tender::{
    Country, LotConfig, NewTender, ParentSummary, PricingModel, ProcurementType, StatusChange,
    Tender, TenderPatch, TenderState, LUMP_SUM_TYPE_IDS,
};
