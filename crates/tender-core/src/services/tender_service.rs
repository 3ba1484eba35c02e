//! Tender lifecycle service
//!
//! Owns every business invariant around tender state and editability. The
//! repository has no notion of "allowed" — only this service does. Raises
//! domain errors, never transport errors, and never retries internally.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::domain::{
    BudgetLine, BudgetLinePatch, NewBudgetLine, NewTender, ProcurementType, StatusChange, Tender,
    TenderPatch, TenderState,
};
use crate::error::DomainError;
use crate::repositories::{TenderDetails, TenderListFilter, TenderRepository};

/// Result of a state-transition request. A no-op request (target equals the
/// current state) returns the unchanged record with an informational message
/// and performs no write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangeOutcome {
    pub tender: Tender,
    pub message: String,
}

/// Business rules for tenders and their budget lines. Multi-tenant via the
/// repository: the service is constructed per call with a repository already
/// scoped to the caller's tenant.
pub struct TenderService<R: TenderRepository> {
    repo: Arc<R>,
}

impl<R: TenderRepository> TenderService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    pub async fn list_tenders(
        &self,
        filter: &TenderListFilter,
    ) -> Result<Vec<Tender>, DomainError> {
        self.repo.list_tenders(filter).await
    }

    /// Detail view with lines, children and parent summary.
    pub async fn get_tender(&self, tender_id: i64) -> Result<TenderDetails, DomainError> {
        self.repo
            .find_with_details(tender_id)
            .await?
            .ok_or(DomainError::TenderNotFound)
    }

    /// Awarded framework agreements / call-off lists a new child contract
    /// may attach to.
    pub async fn get_parent_candidates(&self) -> Result<Vec<Tender>, DomainError> {
        self.repo.parent_candidates().await
    }

    /// Create a tender. The initial state is always `Analysis`, regardless
    /// of anything in the payload; a payload with a parent id is forced to
    /// the child-contract type even if it claims otherwise.
    pub async fn create_tender(&self, new: &NewTender) -> Result<Tender, DomainError> {
        new.validate()
            .map_err(|e| DomainError::Validation(e.to_string()))?;
        if let Some(budget) = new.max_budget {
            if budget.is_sign_negative() {
                return Err(DomainError::Validation(
                    "max_budget must not be negative".into(),
                ));
            }
        }

        let procurement = if new.parent_id.is_some() {
            ProcurementType::ChildContract
        } else {
            new.procurement.unwrap_or_default()
        };

        info!(name = %new.name, procurement = procurement.as_str(), "Creating tender");
        self.repo
            .create(new, TenderState::Analysis, procurement)
            .await
    }

    /// Update a tender. Once the tender is locked (submitted or beyond),
    /// changing a financial/date/country field — or the state itself — is
    /// rejected outright; the remaining informational fields go through.
    pub async fn update_tender(
        &self,
        tender_id: i64,
        patch: TenderPatch,
    ) -> Result<Tender, DomainError> {
        let current = self
            .repo
            .find_by_id(tender_id)
            .await?
            .ok_or(DomainError::TenderNotFound)?;

        if patch.is_empty() {
            return Ok(current);
        }

        let patch = if current.is_locked() {
            let blocked = patch.economic_fields();
            if !blocked.is_empty() {
                warn!(
                    tender_id,
                    state = current.state.as_str(),
                    ?blocked,
                    "Rejected update of frozen fields"
                );
                return Err(DomainError::Validation(format!(
                    "Financial fields, dates and country are frozen once the tender is \
                     submitted or beyond. Use the status-change operation for state moves. \
                     Blocked fields sent: {}",
                    blocked.join(", ")
                )));
            }
            patch.into_informational()
        } else {
            patch
        };

        if patch.is_empty() {
            return Ok(current);
        }

        self.repo
            .update(tender_id, &patch)
            .await?
            .ok_or(DomainError::TenderNotFound)
    }

    /// Delete a tender with its dependents. The storage offers no cascade,
    /// so dependents go first: execution records, then budget lines, then
    /// the tender itself.
    pub async fn delete_tender(&self, tender_id: i64) -> Result<(), DomainError> {
        if self.repo.find_by_id(tender_id).await?.is_none() {
            return Err(DomainError::TenderNotFound);
        }

        self.repo.delete_execution_records(tender_id).await?;
        self.repo.delete_lines(tender_id).await?;
        if !self.repo.delete(tender_id).await? {
            return Err(DomainError::TenderNotFound);
        }
        info!(tender_id, "Tender deleted with its lines and execution records");
        Ok(())
    }

    /// State machine entry point. Validates the per-target guards, applies
    /// the side effects, then writes conditionally against the state read at
    /// the start of the call. A concurrent transition surfaces as
    /// `Conflict`; the caller must re-fetch and retry.
    pub async fn change_tender_status(
        &self,
        tender_id: i64,
        change: &StatusChange,
    ) -> Result<StatusChangeOutcome, DomainError> {
        let tender = self
            .repo
            .find_by_id(tender_id)
            .await?
            .ok_or(DomainError::TenderNotFound)?;
        let current = tender.state;

        if change.target_state_id == current.id() {
            return Ok(StatusChangeOutcome {
                tender,
                message: "The tender is already in the requested state.".into(),
            });
        }

        let target = TenderState::from_id(change.target_state_id).ok_or_else(|| {
            DomainError::Validation(format!(
                "Unrecognized state id {}",
                change.target_state_id
            ))
        })?;

        let mut patch = TenderPatch {
            state: Some(target),
            ..TenderPatch::default()
        };

        match target {
            TenderState::Rejected => {
                let reason = required_text(change.rejection_reason.as_deref(), || {
                    "A rejection reason is required to reject a tender".into()
                })?;
                patch.description = Some(append_note(
                    &tender.description,
                    &format!("[REJECTED]: {}", reason),
                ));
            }
            TenderState::NotAwarded => {
                let reason = required_text(change.loss_reason.as_deref(), || {
                    "A loss reason is required to mark a tender as not awarded".into()
                })?;
                let winner = required_text(change.winning_competitor.as_deref(), || {
                    "The winning competitor is required to mark a tender as not awarded".into()
                })?;
                patch.description = Some(append_note(
                    &tender.description,
                    &format!("[LOST]: Reason: {} | Winner: {}", reason, winner),
                ));
            }
            TenderState::Submitted => {
                let total = self.repo.active_budget_total(tender_id).await?;
                if total <= Decimal::ZERO {
                    warn!(tender_id, %total, "Submission blocked: zero-value budget");
                    return Err(DomainError::Validation(
                        "Cannot submit at zero cost: the active budget lines must total \
                         more than zero."
                            .into(),
                    ));
                }
                if tender.submission_date.is_none() {
                    patch.submission_date = Some(chrono::Utc::now().date_naive());
                }
            }
            TenderState::Awarded => {
                let amount = change.award_amount.ok_or_else(|| {
                    DomainError::Validation(
                        "An award amount greater than zero is required to award a tender".into(),
                    )
                })?;
                if amount <= Decimal::ZERO {
                    return Err(DomainError::Validation(
                        "An award amount greater than zero is required to award a tender".into(),
                    ));
                }
                if self.repo.has_unbound_active_lines(tender_id).await? {
                    warn!(tender_id, "Award blocked: active lines without a catalog product");
                    return Err(DomainError::Validation(
                        "Every active budget line must reference a catalog product before \
                         the tender can be awarded."
                            .into(),
                    ));
                }
                patch.max_budget = Some(amount);
            }
            TenderState::Analysis | TenderState::Completed => {}
        }

        if change.award_date.is_some() {
            patch.award_date = change.award_date;
        }

        let updated = self
            .repo
            .update_with_state_check(tender_id, &patch, current)
            .await?
            .ok_or_else(|| {
                warn!(tender_id, expected = current.as_str(), "Lost the state race");
                DomainError::Conflict(
                    "The tender's state changed while this update was in flight. \
                     Reload and retry."
                        .into(),
                )
            })?;

        info!(
            tender_id,
            from = current.as_str(),
            to = target.as_str(),
            "Tender state changed"
        );
        Ok(StatusChangeOutcome {
            tender: updated,
            message: "State updated.".into(),
        })
    }

    /// Add a budget line. Rejected while the tender is locked: the budget
    /// freezes at submission.
    pub async fn add_line(
        &self,
        tender_id: i64,
        new: &NewBudgetLine,
    ) -> Result<BudgetLine, DomainError> {
        self.ensure_budget_editable(tender_id).await?;
        new.check().map_err(DomainError::Validation)?;
        self.repo.add_line(tender_id, new).await
    }

    pub async fn update_line(
        &self,
        tender_id: i64,
        line_id: i64,
        patch: &BudgetLinePatch,
    ) -> Result<BudgetLine, DomainError> {
        self.ensure_budget_editable(tender_id).await?;
        patch.check().map_err(DomainError::Validation)?;

        if patch.is_empty() {
            let view = self
                .repo
                .find_line(tender_id, line_id)
                .await?
                .ok_or(DomainError::BudgetLineNotFound)?;
            return Ok(view.line);
        }

        self.repo
            .update_line(tender_id, line_id, patch)
            .await?
            .ok_or(DomainError::BudgetLineNotFound)
    }

    pub async fn delete_line(&self, tender_id: i64, line_id: i64) -> Result<(), DomainError> {
        self.ensure_budget_editable(tender_id).await?;
        if !self.repo.delete_line(tender_id, line_id).await? {
            return Err(DomainError::BudgetLineNotFound);
        }
        Ok(())
    }

    async fn ensure_budget_editable(&self, tender_id: i64) -> Result<(), DomainError> {
        let tender = self
            .repo
            .find_by_id(tender_id)
            .await?
            .ok_or(DomainError::TenderNotFound)?;
        if tender.is_locked() {
            return Err(DomainError::Validation(
                "Budget lines cannot change once the tender is submitted or beyond.".into(),
            ));
        }
        Ok(())
    }
}

fn required_text(
    value: Option<&str>,
    message: impl FnOnce() -> String,
) -> Result<String, DomainError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(DomainError::Validation(message())),
    }
}

fn append_note(description: &str, note: &str) -> String {
    format!("{}\n{}", description, note).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_note_to_empty_description() {
        assert_eq!(append_note("", "[REJECTED]: late"), "[REJECTED]: late");
    }

    #[test]
    fn test_append_note_keeps_history() {
        let d = append_note("original notes", "[LOST]: Reason: price | Winner: Acme");
        assert_eq!(d, "original notes\n[LOST]: Reason: price | Winner: Acme");
    }

    #[test]
    fn test_required_text_rejects_blank() {
        assert!(required_text(Some("   "), || "missing".into()).is_err());
        assert!(required_text(None, || "missing".into()).is_err());
        assert_eq!(
            required_text(Some(" ok "), || "missing".into()).unwrap(),
            "ok"
        );
    }
}
