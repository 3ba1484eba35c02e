//! Postgres adapter for the tender repository port
//!
//! Row structs mirror the table layouts and convert into the domain
//! entities; all SQL runs through the tenant-scoped primitives in
//! [`tenant_scope`](super::tenant_scope), except the two joins and the
//! execution-record cascade, which bind the tenant id explicitly.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tender_shared::TenantId;
use tracing::error;
use uuid::Uuid;

use tender_core::domain::{
    active_budget_total, BudgetLine, BudgetLinePatch, BudgetLineView, Country, LotConfig,
    NewBudgetLine, NewTender, ParentSummary, PricingModel, ProcurementType, Tender, TenderPatch,
    TenderState, GENERAL_LOT,
};
use tender_core::error::DomainError;
use tender_core::repositories::{
    TenderDetails, TenderListFilter, TenderRepository, URGENT_CHILD_WINDOW_DAYS,
};

use super::tenant_scope::{ChangeSet, Filter, OrderBy, PgTenantRepository, SqlValue, TenantRecord};

const ID_DESC: OrderBy = OrderBy {
    column: "id",
    desc: true,
};

#[derive(Debug, sqlx::FromRow)]
struct TenderRow {
    id: i64,
    tenant_id: Uuid,
    name: String,
    country: String,
    file_number: String,
    description: String,
    source_url: Option<String>,
    docs_url: Option<String>,
    max_budget: Decimal,
    global_discount: Option<Decimal>,
    tender_type_id: Option<i32>,
    procurement: String,
    parent_id: Option<i64>,
    state_id: i16,
    submission_date: Option<NaiveDate>,
    award_date: Option<NaiveDate>,
    completion_date: Option<NaiveDate>,
    lots: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TenantRecord for TenderRow {
    const TABLE: &'static str = "tenders";
    const ID_COLUMN: &'static str = "id";
    const COLUMNS: &'static str = "id, tenant_id, name, country, file_number, description, \
         source_url, docs_url, max_budget, global_discount, tender_type_id, procurement, \
         parent_id, state_id, submission_date, award_date, completion_date, lots, created_at";
}

impl From<TenderRow> for Tender {
    fn from(row: TenderRow) -> Self {
        // Stored strings are constrained by CHECKs; unknown values from
        // older rows fall back rather than poisoning the whole listing.
        let lots: Vec<LotConfig> = serde_json::from_value(row.lots).unwrap_or_default();
        Tender {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            country: Country::from_str(&row.country).unwrap_or(Country::Spain),
            file_number: row.file_number,
            description: row.description,
            source_url: row.source_url,
            docs_url: row.docs_url,
            max_budget: row.max_budget,
            global_discount: row.global_discount,
            tender_type_id: row.tender_type_id,
            procurement: ProcurementType::from_str(&row.procurement).unwrap_or_default(),
            parent_id: row.parent_id,
            state: TenderState::from_id(row.state_id).unwrap_or(TenderState::Analysis),
            submission_date: row.submission_date,
            award_date: row.award_date,
            completion_date: row.completion_date,
            lots,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BudgetLineRow {
    id: i64,
    tender_id: i64,
    tenant_id: Uuid,
    lot: String,
    product_id: Option<i64>,
    product_name: Option<String>,
    quantity: Decimal,
    unit_price: Decimal,
    unit_cost: Decimal,
    unit_price_cap: Decimal,
    active: bool,
}

impl TenantRecord for BudgetLineRow {
    const TABLE: &'static str = "budget_lines";
    const ID_COLUMN: &'static str = "id";
    const COLUMNS: &'static str = "id, tender_id, tenant_id, lot, product_id, product_name, \
         quantity, unit_price, unit_cost, unit_price_cap, active";
}

impl From<BudgetLineRow> for BudgetLine {
    fn from(row: BudgetLineRow) -> Self {
        BudgetLine {
            id: row.id,
            tender_id: row.tender_id,
            tenant_id: row.tenant_id,
            lot: row.lot,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            unit_price: row.unit_price,
            unit_cost: row.unit_cost,
            unit_price_cap: row.unit_price_cap,
            active: row.active,
        }
    }
}

/// Line joined with catalog display names, for the detail view.
#[derive(Debug, sqlx::FromRow)]
struct BudgetLineViewRow {
    #[sqlx(flatten)]
    line: BudgetLineRow,
    catalog_name: Option<String>,
    supplier_name: Option<String>,
}

impl From<BudgetLineViewRow> for BudgetLineView {
    fn from(row: BudgetLineViewRow) -> Self {
        BudgetLineView {
            line: row.line.into(),
            catalog_name: row.catalog_name,
            supplier_name: row.supplier_name,
        }
    }
}

const LINE_VIEW_SQL: &str = "SELECT b.id, b.tender_id, b.tenant_id, b.lot, b.product_id, \
     b.product_name, b.quantity, b.unit_price, b.unit_cost, b.unit_price_cap, b.active, \
     c.name AS catalog_name, c.supplier_name \
     FROM budget_lines b \
     LEFT JOIN catalog_products c ON c.id = b.product_id AND c.tenant_id = b.tenant_id \
     WHERE b.tenant_id = $1 AND b.tender_id = $2";

/// Tender repository backed by Postgres, scoped to one tenant at
/// construction time.
pub struct PgTenderRepository {
    tenders: PgTenantRepository<TenderRow>,
    lines: PgTenantRepository<BudgetLineRow>,
    pool: PgPool,
    tenant_id: TenantId,
}

impl PgTenderRepository {
    pub fn new(pool: PgPool, tenant_id: TenantId) -> Self {
        Self {
            tenders: PgTenantRepository::new(pool.clone(), tenant_id),
            lines: PgTenantRepository::new(pool.clone(), tenant_id),
            pool,
            tenant_id,
        }
    }

    async fn line_views(&self, tender_id: i64) -> Result<Vec<BudgetLineView>, DomainError> {
        let sql = format!("{} ORDER BY b.lot ASC, b.id ASC", LINE_VIEW_SQL);
        let rows: Vec<BudgetLineViewRow> = sqlx::query_as(&sql)
            .bind(self.tenant_id)
            .bind(tender_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("line_views", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn active_lines(&self, tender_id: i64) -> Result<Vec<BudgetLine>, DomainError> {
        let rows = self
            .lines
            .list(
                &[
                    Filter::Eq("tender_id", SqlValue::BigInt(tender_id)),
                    Filter::Eq("active", SqlValue::Bool(true)),
                ],
                None,
            )
            .await
            .map_err(|e| db_error("active_lines", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn parent_summary(&self, parent_id: i64) -> Result<Option<ParentSummary>, DomainError> {
        let row = self
            .tenders
            .get(parent_id)
            .await
            .map_err(|e| db_error("parent_summary", e))?;
        Ok(row.map(|r| ParentSummary {
            id: r.id,
            name: r.name,
            file_number: r.file_number,
        }))
    }
}

fn db_error(op: &str, err: sqlx::Error) -> DomainError {
    error!(operation = op, error = %err, "database operation failed");
    DomainError::Database(err.to_string())
}

/// Shared filters (name / country) applied to both legs of the listing.
fn common_list_filters(filter: &TenderListFilter) -> Vec<Filter> {
    let mut filters = Vec::new();
    if let Some(name) = &filter.name {
        filters.push(Filter::Contains("name", name.clone()));
    }
    if let Some(country) = filter.country {
        filters.push(Filter::Eq("country", SqlValue::from(country.as_str())));
    }
    filters
}

/// Merge the root listing with the urgent children, dropping duplicates and
/// keeping id-descending order.
fn merge_listing(mut roots: Vec<Tender>, urgent_children: Vec<Tender>) -> Vec<Tender> {
    for child in urgent_children {
        if !roots.iter().any(|t| t.id == child.id) {
            roots.push(child);
        }
    }
    roots.sort_by(|a, b| b.id.cmp(&a.id));
    roots
}

fn new_tender_changes(
    new: &NewTender,
    state: TenderState,
    procurement: ProcurementType,
) -> ChangeSet {
    ChangeSet::new()
        .set("name", new.name.trim())
        .set("country", new.country.as_str())
        .set("file_number", new.file_number.clone().unwrap_or_default())
        .set("description", new.description.clone().unwrap_or_default())
        .set("source_url", new.source_url.clone())
        .set("docs_url", new.docs_url.clone())
        .set("max_budget", new.max_budget.unwrap_or(Decimal::ZERO))
        .set("tender_type_id", new.tender_type_id)
        .set("procurement", procurement.as_str())
        .set("parent_id", new.parent_id)
        .set("state_id", state.id())
        .set("submission_date", new.submission_date)
        .set("award_date", new.award_date)
        .set("completion_date", new.completion_date)
        .set("lots", serde_json::Value::Array(Vec::new()))
}

fn patch_changes(patch: &TenderPatch) -> ChangeSet {
    let mut changes = ChangeSet::new();
    if let Some(name) = &patch.name {
        changes = changes.set("name", name.trim());
    }
    if let Some(country) = patch.country {
        changes = changes.set("country", country.as_str());
    }
    if let Some(file_number) = &patch.file_number {
        changes = changes.set("file_number", file_number.clone());
    }
    if let Some(description) = &patch.description {
        changes = changes.set("description", description.clone());
    }
    if let Some(source_url) = &patch.source_url {
        changes = changes.set("source_url", Some(source_url.clone()));
    }
    if let Some(docs_url) = &patch.docs_url {
        changes = changes.set("docs_url", Some(docs_url.clone()));
    }
    if let Some(max_budget) = patch.max_budget {
        changes = changes.set("max_budget", max_budget);
    }
    if let Some(global_discount) = patch.global_discount {
        changes = changes.set("global_discount", Some(global_discount));
    }
    if let Some(tender_type_id) = patch.tender_type_id {
        changes = changes.set("tender_type_id", Some(tender_type_id));
    }
    if let Some(procurement) = patch.procurement {
        changes = changes.set("procurement", procurement.as_str());
    }
    if let Some(parent_id) = patch.parent_id {
        changes = changes.set("parent_id", Some(parent_id));
    }
    if let Some(state) = patch.state {
        changes = changes.set("state_id", state.id());
    }
    if let Some(submission_date) = patch.submission_date {
        changes = changes.set("submission_date", Some(submission_date));
    }
    if let Some(award_date) = patch.award_date {
        changes = changes.set("award_date", Some(award_date));
    }
    if let Some(completion_date) = patch.completion_date {
        changes = changes.set("completion_date", Some(completion_date));
    }
    if let Some(lots) = &patch.lots {
        let value = serde_json::to_value(lots).unwrap_or(serde_json::Value::Array(Vec::new()));
        changes = changes.set("lots", value);
    }
    changes
}

fn line_insert_changes(tender_id: i64, new: &NewBudgetLine) -> ChangeSet {
    ChangeSet::new()
        .set("tender_id", tender_id)
        .set(
            "lot",
            new.lot.clone().unwrap_or_else(|| GENERAL_LOT.to_string()),
        )
        .set("product_id", new.product_id)
        .set("product_name", new.product_name.clone())
        .set("quantity", new.quantity.unwrap_or(Decimal::ONE))
        .set("unit_price", new.unit_price.unwrap_or(Decimal::ZERO))
        .set("unit_cost", new.unit_cost.unwrap_or(Decimal::ZERO))
        .set("unit_price_cap", new.unit_price_cap.unwrap_or(Decimal::ZERO))
        .set("active", new.active.unwrap_or(true))
}

fn line_patch_changes(patch: &BudgetLinePatch) -> ChangeSet {
    let mut changes = ChangeSet::new();
    if let Some(lot) = &patch.lot {
        changes = changes.set("lot", lot.clone());
    }
    if let Some(product_id) = patch.product_id {
        changes = changes.set("product_id", Some(product_id));
    }
    if let Some(product_name) = &patch.product_name {
        changes = changes.set("product_name", Some(product_name.clone()));
    }
    if let Some(quantity) = patch.quantity {
        changes = changes.set("quantity", quantity);
    }
    if let Some(unit_price) = patch.unit_price {
        changes = changes.set("unit_price", unit_price);
    }
    if let Some(unit_cost) = patch.unit_cost {
        changes = changes.set("unit_cost", unit_cost);
    }
    if let Some(unit_price_cap) = patch.unit_price_cap {
        changes = changes.set("unit_price_cap", unit_price_cap);
    }
    if let Some(active) = patch.active {
        changes = changes.set("active", active);
    }
    changes
}

#[async_trait]
impl TenderRepository for PgTenderRepository {
    async fn list_tenders(&self, filter: &TenderListFilter) -> Result<Vec<Tender>, DomainError> {
        let mut root_filters = vec![Filter::IsNull("parent_id")];
        if let Some(state) = filter.state {
            root_filters.push(Filter::Eq("state_id", SqlValue::SmallInt(state.id())));
        }
        root_filters.extend(common_list_filters(filter));
        let roots = self
            .tenders
            .list(&root_filters, Some(ID_DESC))
            .await
            .map_err(|e| db_error("list_tenders", e))?;
        let roots: Vec<Tender> = roots.into_iter().map(Into::into).collect();

        // Children in analysis with a submission date inside the urgency
        // window surface beside the roots, unless the caller filtered to a
        // different state.
        let wants_analysis = filter
            .state
            .map(|s| s == TenderState::Analysis)
            .unwrap_or(true);
        if !wants_analysis {
            return Ok(roots);
        }

        let today = Utc::now().date_naive();
        let horizon = today + Duration::days(URGENT_CHILD_WINDOW_DAYS);
        let mut child_filters = vec![
            Filter::NotNull("parent_id"),
            Filter::Eq("state_id", SqlValue::SmallInt(TenderState::Analysis.id())),
            Filter::Gte("submission_date", SqlValue::Date(today)),
            Filter::Lte("submission_date", SqlValue::Date(horizon)),
        ];
        child_filters.extend(common_list_filters(filter));
        let children = self
            .tenders
            .list(&child_filters, Some(ID_DESC))
            .await
            .map_err(|e| db_error("list_tenders", e))?;

        Ok(merge_listing(
            roots,
            children.into_iter().map(Into::into).collect(),
        ))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Tender>, DomainError> {
        let row = self
            .tenders
            .get(id)
            .await
            .map_err(|e| db_error("find_by_id", e))?;
        Ok(row.map(Into::into))
    }

    async fn create(
        &self,
        new: &NewTender,
        state: TenderState,
        procurement: ProcurementType,
    ) -> Result<Tender, DomainError> {
        let changes = new_tender_changes(new, state, procurement);
        let row = self
            .tenders
            .create(&changes)
            .await
            .map_err(|e| db_error("create", e))?;
        Ok(row.into())
    }

    async fn update(&self, id: i64, patch: &TenderPatch) -> Result<Option<Tender>, DomainError> {
        let row = self
            .tenders
            .update(id, &patch_changes(patch))
            .await
            .map_err(|e| db_error("update", e))?;
        Ok(row.map(Into::into))
    }

    async fn delete(&self, id: i64) -> Result<bool, DomainError> {
        self.tenders
            .delete(id)
            .await
            .map_err(|e| db_error("delete", e))
    }

    async fn children_of(&self, parent_id: i64) -> Result<Vec<Tender>, DomainError> {
        let rows = self
            .tenders
            .list(
                &[Filter::Eq("parent_id", SqlValue::BigInt(parent_id))],
                Some(ID_DESC),
            )
            .await
            .map_err(|e| db_error("children_of", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_with_details(&self, id: i64) -> Result<Option<TenderDetails>, DomainError> {
        let Some(tender) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        let lines = self.line_views(id).await?;
        let children = if tender.procurement.can_have_children() {
            self.children_of(id).await?
        } else {
            Vec::new()
        };
        let parent = match tender.parent_id {
            Some(parent_id) => self.parent_summary(parent_id).await?,
            None => None,
        };
        Ok(Some(TenderDetails {
            tender,
            lines,
            children,
            parent,
        }))
    }

    async fn active_budget_total(&self, tender_id: i64) -> Result<Decimal, DomainError> {
        let pricing = self
            .find_by_id(tender_id)
            .await?
            .map(|t| t.pricing_model())
            .unwrap_or(PricingModel::PerUnit);
        let lines = self.active_lines(tender_id).await?;
        Ok(active_budget_total(pricing, &lines))
    }

    async fn has_unbound_active_lines(&self, tender_id: i64) -> Result<bool, DomainError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM budget_lines \
             WHERE tenant_id = $1 AND tender_id = $2 AND active AND product_id IS NULL",
        )
        .bind(self.tenant_id)
        .bind(tender_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("has_unbound_active_lines", e))?;
        Ok(count > 0)
    }

    async fn find_line(
        &self,
        tender_id: i64,
        line_id: i64,
    ) -> Result<Option<BudgetLineView>, DomainError> {
        let sql = format!("{} AND b.id = $3 LIMIT 1", LINE_VIEW_SQL);
        let row: Option<BudgetLineViewRow> = sqlx::query_as(&sql)
            .bind(self.tenant_id)
            .bind(tender_id)
            .bind(line_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find_line", e))?;
        Ok(row.map(Into::into))
    }

    async fn add_line(
        &self,
        tender_id: i64,
        new: &NewBudgetLine,
    ) -> Result<BudgetLine, DomainError> {
        let row = self
            .lines
            .create(&line_insert_changes(tender_id, new))
            .await
            .map_err(|e| db_error("add_line", e))?;
        Ok(row.into())
    }

    async fn update_line(
        &self,
        tender_id: i64,
        line_id: i64,
        patch: &BudgetLinePatch,
    ) -> Result<Option<BudgetLine>, DomainError> {
        let row = self
            .lines
            .update_guarded(
                line_id,
                &line_patch_changes(patch),
                &[Filter::Eq("tender_id", SqlValue::BigInt(tender_id))],
            )
            .await
            .map_err(|e| db_error("update_line", e))?;
        Ok(row.map(Into::into))
    }

    async fn delete_line(&self, tender_id: i64, line_id: i64) -> Result<bool, DomainError> {
        let deleted = self
            .lines
            .delete_matching(&[
                Filter::Eq("id", SqlValue::BigInt(line_id)),
                Filter::Eq("tender_id", SqlValue::BigInt(tender_id)),
            ])
            .await
            .map_err(|e| db_error("delete_line", e))?;
        Ok(deleted > 0)
    }

    async fn delete_lines(&self, tender_id: i64) -> Result<(), DomainError> {
        self.lines
            .delete_matching(&[Filter::Eq("tender_id", SqlValue::BigInt(tender_id))])
            .await
            .map_err(|e| db_error("delete_lines", e))?;
        Ok(())
    }

    async fn delete_execution_records(&self, tender_id: i64) -> Result<(), DomainError> {
        // No FK cascade on this table; run as an explicit step before the
        // tender row goes away.
        sqlx::query("DELETE FROM execution_records WHERE tenant_id = $1 AND tender_id = $2")
            .bind(self.tenant_id)
            .bind(tender_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete_execution_records", e))?;
        Ok(())
    }

    async fn parent_candidates(&self) -> Result<Vec<Tender>, DomainError> {
        let rows = self
            .tenders
            .list(
                &[
                    Filter::AnyText(
                        "procurement",
                        vec![
                            ProcurementType::FrameworkAgreement.as_str().to_string(),
                            ProcurementType::CallOffList.as_str().to_string(),
                        ],
                    ),
                    Filter::Eq("state_id", SqlValue::SmallInt(TenderState::Awarded.id())),
                ],
                Some(ID_DESC),
            )
            .await
            .map_err(|e| db_error("parent_candidates", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_with_state_check(
        &self,
        id: i64,
        patch: &TenderPatch,
        expected: TenderState,
    ) -> Result<Option<Tender>, DomainError> {
        let row = self
            .tenders
            .update_guarded(
                id,
                &patch_changes(patch),
                &[Filter::Eq("state_id", SqlValue::SmallInt(expected.id()))],
            )
            .await
            .map_err(|e| db_error("update_with_state_check", e))?;
        Ok(row.map(Into::into))
    }
}
