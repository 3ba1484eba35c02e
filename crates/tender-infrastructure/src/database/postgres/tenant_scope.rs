//! Generic tenant-scoped persistence primitives
//!
//! Every domain repository in this crate is built on [`PgTenantRepository`],
//! which is constructed with a tenant id and routes all SQL through private
//! builders that unconditionally push the tenant predicate. There is no
//! public method that skips the filter, and [`ChangeSet`] silently discards
//! any caller-supplied tenant column, so a cross-tenant read or write cannot
//! be expressed at all.

use std::marker::PhantomData;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tender_shared::TenantId;
use uuid::Uuid;

/// Column that scopes every table to a tenant.
pub const TENANT_COLUMN: &str = "tenant_id";

/// A row type the generic repository can manage.
pub trait TenantRecord: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin {
    const TABLE: &'static str;
    const ID_COLUMN: &'static str;
    /// Full select list, used verbatim in SELECT and RETURNING clauses.
    const COLUMNS: &'static str;
}

/// An owned value bound into dynamically composed SQL.
#[derive(Debug, Clone)]
pub enum SqlValue {
    Text(String),
    OptText(Option<String>),
    BigInt(i64),
    OptBigInt(Option<i64>),
    Int(i32),
    OptInt(Option<i32>),
    SmallInt(i16),
    Bool(bool),
    Decimal(Decimal),
    OptDecimal(Option<Decimal>),
    Date(NaiveDate),
    OptDate(Option<NaiveDate>),
    Json(serde_json::Value),
    Uuid(Uuid),
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}
impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}
impl From<Option<String>> for SqlValue {
    fn from(v: Option<String>) -> Self {
        SqlValue::OptText(v)
    }
}
impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::BigInt(v)
    }
}
impl From<Option<i64>> for SqlValue {
    fn from(v: Option<i64>) -> Self {
        SqlValue::OptBigInt(v)
    }
}
impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v)
    }
}
impl From<Option<i32>> for SqlValue {
    fn from(v: Option<i32>) -> Self {
        SqlValue::OptInt(v)
    }
}
impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::SmallInt(v)
    }
}
impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}
impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}
impl From<Option<Decimal>> for SqlValue {
    fn from(v: Option<Decimal>) -> Self {
        SqlValue::OptDecimal(v)
    }
}
impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}
impl From<Option<NaiveDate>> for SqlValue {
    fn from(v: Option<NaiveDate>) -> Self {
        SqlValue::OptDate(v)
    }
}
impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        SqlValue::Json(v)
    }
}
impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

fn bind_value(qb: &mut QueryBuilder<'_, Postgres>, value: &SqlValue) {
    match value.clone() {
        SqlValue::Text(v) => qb.push_bind(v),
        SqlValue::OptText(v) => qb.push_bind(v),
        SqlValue::BigInt(v) => qb.push_bind(v),
        SqlValue::OptBigInt(v) => qb.push_bind(v),
        SqlValue::Int(v) => qb.push_bind(v),
        SqlValue::OptInt(v) => qb.push_bind(v),
        SqlValue::SmallInt(v) => qb.push_bind(v),
        SqlValue::Bool(v) => qb.push_bind(v),
        SqlValue::Decimal(v) => qb.push_bind(v),
        SqlValue::OptDecimal(v) => qb.push_bind(v),
        SqlValue::Date(v) => qb.push_bind(v),
        SqlValue::OptDate(v) => qb.push_bind(v),
        SqlValue::Json(v) => qb.push_bind(v),
        SqlValue::Uuid(v) => qb.push_bind(v),
    };
}

/// Ordered set of column writes for INSERT / UPDATE.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    entries: Vec<(&'static str, SqlValue)>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a column write. The tenant column is dropped on the floor:
    /// only the repository scope decides which tenant rows belong to.
    pub fn set(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        if column == TENANT_COLUMN {
            return self;
        }
        self.entries.push((column, value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn columns(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(c, _)| *c).collect()
    }
}

/// Additional predicates for list/delete, always ANDed onto the tenant
/// filter.
#[derive(Debug, Clone)]
pub enum Filter {
    Eq(&'static str, SqlValue),
    /// Case-insensitive substring match.
    Contains(&'static str, String),
    IsNull(&'static str),
    NotNull(&'static str),
    Gte(&'static str, SqlValue),
    Lte(&'static str, SqlValue),
    /// `column = ANY($values)`
    AnyText(&'static str, Vec<String>),
}

#[derive(Debug, Clone, Copy)]
pub struct OrderBy {
    pub column: &'static str,
    pub desc: bool,
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::Eq(col, value) => {
            qb.push(" AND ").push(*col).push(" = ");
            bind_value(qb, value);
        }
        Filter::Contains(col, needle) => {
            qb.push(" AND ").push(*col).push(" ILIKE ");
            qb.push_bind(format!("%{}%", needle.trim()));
        }
        Filter::IsNull(col) => {
            qb.push(" AND ").push(*col).push(" IS NULL");
        }
        Filter::NotNull(col) => {
            qb.push(" AND ").push(*col).push(" IS NOT NULL");
        }
        Filter::Gte(col, value) => {
            qb.push(" AND ").push(*col).push(" >= ");
            bind_value(qb, value);
        }
        Filter::Lte(col, value) => {
            qb.push(" AND ").push(*col).push(" <= ");
            bind_value(qb, value);
        }
        Filter::AnyText(col, values) => {
            qb.push(" AND ").push(*col).push(" = ANY(");
            qb.push_bind(values.clone());
            qb.push(")");
        }
    }
}

/// Tenant-scoped CRUD over one table. Generic so every domain repository
/// (tenders, budget lines) reuses the same scoped primitives.
pub struct PgTenantRepository<E: TenantRecord> {
    pool: PgPool,
    tenant_id: TenantId,
    _record: PhantomData<E>,
}

impl<E: TenantRecord> PgTenantRepository<E> {
    pub fn new(pool: PgPool, tenant_id: TenantId) -> Self {
        Self {
            pool,
            tenant_id,
            _record: PhantomData,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// SELECT with the tenant predicate already in place. Every read path
    /// starts here.
    fn select_builder(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {} FROM {} WHERE {} = ",
            E::COLUMNS,
            E::TABLE,
            TENANT_COLUMN
        ));
        qb.push_bind(self.tenant_id);
        qb
    }

    pub async fn list(
        &self,
        filters: &[Filter],
        order: Option<OrderBy>,
    ) -> Result<Vec<E>, sqlx::Error> {
        let mut qb = self.select_builder();
        for filter in filters {
            push_filter(&mut qb, filter);
        }
        if let Some(order) = order {
            qb.push(" ORDER BY ")
                .push(order.column)
                .push(if order.desc { " DESC" } else { " ASC" });
        }
        qb.build_query_as::<E>().fetch_all(&self.pool).await
    }

    pub async fn get(&self, id: i64) -> Result<Option<E>, sqlx::Error> {
        let mut qb = self.select_builder();
        qb.push(" AND ").push(E::ID_COLUMN).push(" = ").push_bind(id);
        qb.push(" LIMIT 1");
        qb.build_query_as::<E>().fetch_optional(&self.pool).await
    }

    /// INSERT. The tenant id always comes from the repository scope; the
    /// change set has already dropped any tenant column the caller tried to
    /// smuggle in.
    pub async fn create(&self, changes: &ChangeSet) -> Result<E, sqlx::Error> {
        let mut qb = QueryBuilder::new(format!("INSERT INTO {} ({}", E::TABLE, TENANT_COLUMN));
        for (column, _) in &changes.entries {
            qb.push(", ").push(*column);
        }
        qb.push(") VALUES (");
        qb.push_bind(self.tenant_id);
        for (_, value) in &changes.entries {
            qb.push(", ");
            bind_value(&mut qb, value);
        }
        qb.push(") RETURNING ").push(E::COLUMNS);
        qb.build_query_as::<E>().fetch_one(&self.pool).await
    }

    /// Tenant-filtered UPDATE; `None` when no row matched (absent id or a
    /// row owned by another tenant — indistinguishable by design).
    pub async fn update(&self, id: i64, changes: &ChangeSet) -> Result<Option<E>, sqlx::Error> {
        self.update_guarded(id, changes, &[]).await
    }

    /// UPDATE with extra guard predicates, e.g. a conditional state check.
    /// Zero affected rows surface as `None`.
    pub async fn update_guarded(
        &self,
        id: i64,
        changes: &ChangeSet,
        guards: &[Filter],
    ) -> Result<Option<E>, sqlx::Error> {
        if changes.is_empty() {
            return self.get(id).await;
        }
        let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", E::TABLE));
        let mut first = true;
        for (column, value) in &changes.entries {
            if !first {
                qb.push(", ");
            }
            first = false;
            qb.push(*column).push(" = ");
            bind_value(&mut qb, value);
        }
        qb.push(" WHERE ").push(TENANT_COLUMN).push(" = ");
        qb.push_bind(self.tenant_id);
        qb.push(" AND ").push(E::ID_COLUMN).push(" = ").push_bind(id);
        for guard in guards {
            push_filter(&mut qb, guard);
        }
        qb.push(" RETURNING ").push(E::COLUMNS);
        qb.build_query_as::<E>().fetch_optional(&self.pool).await
    }

    /// `false` when no row matched.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let deleted = self.delete_matching(&[eq_id::<E>(id)]).await?;
        Ok(deleted > 0)
    }

    pub async fn delete_matching(&self, filters: &[Filter]) -> Result<u64, sqlx::Error> {
        let mut qb = QueryBuilder::new(format!(
            "DELETE FROM {} WHERE {} = ",
            E::TABLE,
            TENANT_COLUMN
        ));
        qb.push_bind(self.tenant_id);
        for filter in filters {
            push_filter(&mut qb, filter);
        }
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn eq_id<E: TenantRecord>(id: i64) -> Filter {
    Filter::Eq(E::ID_COLUMN, SqlValue::BigInt(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(sqlx::FromRow)]
    struct SampleRow {
        #[allow(dead_code)]
        id: i64,
    }

    impl TenantRecord for SampleRow {
        const TABLE: &'static str = "samples";
        const ID_COLUMN: &'static str = "id";
        const COLUMNS: &'static str = "id, tenant_id, name";
    }

    #[test]
    fn test_changeset_discards_tenant_column() {
        let changes = ChangeSet::new()
            .set("name", "x")
            .set(TENANT_COLUMN, Uuid::new_v4())
            .set("active", true);
        assert_eq!(changes.columns(), vec!["name", "active"]);
    }

    #[tokio::test]
    async fn test_select_builder_always_filters_by_tenant() {
        let pool = PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        let repo: PgTenantRepository<SampleRow> = PgTenantRepository::new(pool, Uuid::new_v4());
        let sql = repo.select_builder().into_sql();
        assert!(sql.starts_with("SELECT id, tenant_id, name FROM samples WHERE tenant_id = "));
    }

    #[tokio::test]
    async fn test_filters_compose_after_the_tenant_predicate() {
        let pool = PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        let repo: PgTenantRepository<SampleRow> = PgTenantRepository::new(pool, Uuid::new_v4());
        let mut qb = repo.select_builder();
        push_filter(&mut qb, &Filter::IsNull("parent_id"));
        push_filter(&mut qb, &Filter::Contains("name", " road ".to_string()));
        let sql = qb.into_sql();
        assert!(sql.contains("tenant_id = $1"));
        assert!(sql.contains("AND parent_id IS NULL"));
        assert!(sql.contains("AND name ILIKE $2"));
    }

    #[test]
    fn test_insert_binds_tenant_first() {
        // mirror of `create` without executing
        let changes = ChangeSet::new().set("name", "x");
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} ({}",
            SampleRow::TABLE,
            TENANT_COLUMN
        ));
        for (column, _) in &changes.entries {
            qb.push(", ").push(*column);
        }
        qb.push(") VALUES (");
        qb.push_bind(Uuid::new_v4());
        for (_, value) in &changes.entries {
            qb.push(", ");
            bind_value(&mut qb, value);
        }
        qb.push(") RETURNING ").push(SampleRow::COLUMNS);
        let sql = qb.into_sql();
        assert_eq!(
            sql,
            "INSERT INTO samples (tenant_id, name) VALUES ($1, $2) RETURNING id, tenant_id, name"
        );
    }
}
