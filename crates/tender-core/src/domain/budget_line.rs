//! Budget line ("partida") entity and the budget aggregation policy

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tender_shared::TenantId;

use super::tender::PricingModel;

/// Lot a line lands in when the caller does not name one.
pub const GENERAL_LOT: &str = "General";

/// A priced line item in a tender's working budget. A line either references
/// a catalog product (`product_id`) or carries a free-text `product_name`;
/// a catalog reference is required on every active line before the tender
/// can be awarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetLine {
    pub id: i64,
    pub tender_id: i64,
    pub tenant_id: TenantId,

    pub lot: String,
    pub product_id: Option<i64>,
    pub product_name: Option<String>,

    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub unit_cost: Decimal,
    pub unit_price_cap: Decimal,

    /// Only active lines count toward the budget total and the award gate.
    pub active: bool,
}

/// A budget line joined with its catalog product display names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetLineView {
    #[serde(flatten)]
    pub line: BudgetLine,
    pub catalog_name: Option<String>,
    pub supplier_name: Option<String>,
}

/// Payload for adding a line. Tender id and tenant id are forced
/// server-side and are deliberately absent here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBudgetLine {
    pub lot: Option<String>,
    pub product_id: Option<i64>,
    pub product_name: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
    pub unit_price_cap: Option<Decimal>,
    pub active: Option<bool>,
}

impl NewBudgetLine {
    /// Quantity and prices must be non-negative.
    pub fn check(&self) -> Result<(), String> {
        check_non_negative("quantity", self.quantity)?;
        check_non_negative("unit_price", self.unit_price)?;
        check_non_negative("unit_cost", self.unit_cost)?;
        check_non_negative("unit_price_cap", self.unit_price_cap)?;
        Ok(())
    }
}

/// Partial update of a line; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetLinePatch {
    pub lot: Option<String>,
    pub product_id: Option<i64>,
    pub product_name: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
    pub unit_price_cap: Option<Decimal>,
    pub active: Option<bool>,
}

impl BudgetLinePatch {
    pub fn is_empty(&self) -> bool {
        self.lot.is_none()
            && self.product_id.is_none()
            && self.product_name.is_none()
            && self.quantity.is_none()
            && self.unit_price.is_none()
            && self.unit_cost.is_none()
            && self.unit_price_cap.is_none()
            && self.active.is_none()
    }

    pub fn check(&self) -> Result<(), String> {
        check_non_negative("quantity", self.quantity)?;
        check_non_negative("unit_price", self.unit_price)?;
        check_non_negative("unit_cost", self.unit_cost)?;
        check_non_negative("unit_price_cap", self.unit_price_cap)?;
        Ok(())
    }
}

fn check_non_negative(field: &str, value: Option<Decimal>) -> Result<(), String> {
    match value {
        Some(v) if v.is_sign_negative() => Err(format!("{} must not be negative", field)),
        _ => Ok(()),
    }
}

/// Aggregate sale value of the active lines. Lump-sum tenders sum unit sale
/// prices directly; everything else sums quantity × unit sale price. Exact
/// decimal arithmetic throughout: this total feeds the submission gate.
///
/// Lives here so the Postgres adapter and any test double apply the exact
/// same policy.
pub fn active_budget_total(pricing: PricingModel, lines: &[BudgetLine]) -> Decimal {
    lines
        .iter()
        .filter(|l| l.active)
        .map(|l| match pricing {
            PricingModel::LumpSum => l.unit_price,
            PricingModel::PerUnit => l.quantity * l.unit_price,
        })
        .sum()
}

/// True when any active line lacks a catalog product reference. Such a line
/// blocks the award transition.
pub fn has_unbound_active_line(lines: &[BudgetLine]) -> bool {
    lines.iter().any(|l| l.active && l.product_id.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn line(quantity: Decimal, unit_price: Decimal, active: bool) -> BudgetLine {
        BudgetLine {
            id: 1,
            tender_id: 1,
            tenant_id: Uuid::new_v4(),
            lot: GENERAL_LOT.to_string(),
            product_id: None,
            product_name: Some("loose item".into()),
            quantity,
            unit_price,
            unit_cost: Decimal::ZERO,
            unit_price_cap: Decimal::ZERO,
            active,
        }
    }

    #[test]
    fn test_per_unit_total_multiplies_quantity() {
        let lines = vec![
            line(dec!(2), dec!(10.50), true),
            line(dec!(3), dec!(0.10), true),
            line(dec!(100), dec!(99.99), false), // inactive, ignored
        ];
        let total = active_budget_total(PricingModel::PerUnit, &lines);
        assert_eq!(total, dec!(21.30));
    }

    #[test]
    fn test_lump_sum_total_ignores_quantity() {
        let lines = vec![
            line(dec!(7), dec!(10.50), true),
            line(dec!(99), dec!(0.10), true),
        ];
        let total = active_budget_total(PricingModel::LumpSum, &lines);
        assert_eq!(total, dec!(10.60));
    }

    #[test]
    fn test_two_decimal_inputs_have_no_drift() {
        // 0.1 + 0.2 style sums must stay exact
        let lines = vec![
            line(dec!(1), dec!(0.10), true),
            line(dec!(1), dec!(0.20), true),
        ];
        let total = active_budget_total(PricingModel::PerUnit, &lines);
        assert_eq!(total, dec!(0.30));
    }

    #[test]
    fn test_unbound_detection_skips_inactive() {
        let mut bound = line(dec!(1), dec!(1), true);
        bound.product_id = Some(42);
        let unbound_inactive = line(dec!(1), dec!(1), false);
        assert!(!has_unbound_active_line(&[bound.clone(), unbound_inactive]));

        let unbound_active = line(dec!(1), dec!(1), true);
        assert!(has_unbound_active_line(&[bound, unbound_active]));
    }

    #[test]
    fn test_negative_price_rejected() {
        let new = NewBudgetLine {
            unit_price: Some(dec!(-1)),
            ..NewBudgetLine::default()
        };
        assert!(new.check().is_err());
    }
}
