//! Tender entity, lifecycle states and write shapes

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tender_shared::TenantId;
use validator::Validate;

/// Country a tender is published in (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Country {
    Spain,
    Portugal,
}

impl Country {
    pub fn as_str(&self) -> &'static str {
        match self {
            Country::Spain => "spain",
            Country::Portugal => "portugal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "spain" => Some(Country::Spain),
            "portugal" => Some(Country::Portugal),
            _ => None,
        }
    }
}

/// Procurement type. Framework agreements and call-off lists can act as
/// parents; a child contract always carries a parent tender id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcurementType {
    Ordinary,
    FrameworkAgreement,
    CallOffList,
    ChildContract,
}

impl ProcurementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcurementType::Ordinary => "ordinary",
            ProcurementType::FrameworkAgreement => "framework_agreement",
            ProcurementType::CallOffList => "call_off_list",
            ProcurementType::ChildContract => "child_contract",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ordinary" => Some(ProcurementType::Ordinary),
            "framework_agreement" => Some(ProcurementType::FrameworkAgreement),
            "call_off_list" => Some(ProcurementType::CallOffList),
            "child_contract" => Some(ProcurementType::ChildContract),
            _ => None,
        }
    }

    pub fn can_have_children(&self) -> bool {
        matches!(
            self,
            ProcurementType::FrameworkAgreement | ProcurementType::CallOffList
        )
    }
}

impl Default for ProcurementType {
    fn default() -> Self {
        ProcurementType::Ordinary
    }
}

/// Lifecycle state. The numeric ids match the states table and are part of
/// the external contract, so they are fixed here rather than derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderState {
    Rejected,
    Analysis,
    Submitted,
    Awarded,
    NotAwarded,
    Completed,
}

impl TenderState {
    pub fn id(&self) -> i16 {
        match self {
            TenderState::Rejected => 2,
            TenderState::Analysis => 3,
            TenderState::Submitted => 4,
            TenderState::Awarded => 5,
            TenderState::NotAwarded => 6,
            TenderState::Completed => 7,
        }
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            2 => Some(TenderState::Rejected),
            3 => Some(TenderState::Analysis),
            4 => Some(TenderState::Submitted),
            5 => Some(TenderState::Awarded),
            6 => Some(TenderState::NotAwarded),
            7 => Some(TenderState::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TenderState::Rejected => "rejected",
            TenderState::Analysis => "analysis",
            TenderState::Submitted => "submitted",
            TenderState::Awarded => "awarded",
            TenderState::NotAwarded => "not_awarded",
            TenderState::Completed => "completed",
        }
    }

    /// Once a tender has been submitted, the financial fields and the budget
    /// lines are frozen; only informational fields stay editable.
    pub fn locks_editing(&self) -> bool {
        matches!(
            self,
            TenderState::Submitted
                | TenderState::Awarded
                | TenderState::NotAwarded
                | TenderState::Completed
        )
    }
}

/// Tender type ids whose budget total ignores quantities (sum of unit sale
/// prices only). The id set comes from the classification table and must not
/// drift.
pub const LUMP_SUM_TYPE_IDS: [i32; 2] = [2, 4];

/// How active budget lines aggregate into the tender total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingModel {
    /// Σ quantity × unit sale price
    PerUnit,
    /// Σ unit sale price
    LumpSum,
}

impl PricingModel {
    pub fn from_type_id(type_id: Option<i32>) -> Self {
        match type_id {
            Some(id) if LUMP_SUM_TYPE_IDS.contains(&id) => PricingModel::LumpSum,
            _ => PricingModel::PerUnit,
        }
    }
}

/// One lot in the tender's lot configuration (stored as JSON)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotConfig {
    pub name: String,
    pub won: bool,
}

/// Tender entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tender {
    pub id: i64,
    pub tenant_id: TenantId,

    pub name: String,
    pub country: Country,
    pub file_number: String,
    pub description: String,
    pub source_url: Option<String>,
    pub docs_url: Option<String>,

    /// Maximum budget while bidding; overwritten with the award amount once
    /// the tender is awarded.
    pub max_budget: Decimal,
    pub global_discount: Option<Decimal>,

    /// Pricing classification id; {2, 4} aggregate without quantities.
    pub tender_type_id: Option<i32>,
    pub procurement: ProcurementType,
    pub parent_id: Option<i64>,

    pub state: TenderState,
    pub submission_date: Option<NaiveDate>,
    pub award_date: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,

    pub lots: Vec<LotConfig>,
    pub created_at: DateTime<Utc>,
}

impl Tender {
    pub fn pricing_model(&self) -> PricingModel {
        PricingModel::from_type_id(self.tender_type_id)
    }

    pub fn is_locked(&self) -> bool {
        self.state.locks_editing()
    }
}

/// Minimal parent view attached to a child tender's detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentSummary {
    pub id: i64,
    pub name: String,
    pub file_number: String,
}

/// Payload for creating a tender. The initial state is forced by the
/// service, never taken from the caller; there is no state field here to
/// even try.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewTender {
    #[validate(length(min = 2, max = 200, message = "Tender name must be between 2 and 200 characters"))]
    pub name: String,

    pub country: Country,

    #[validate(length(max = 100, message = "File number too long"))]
    pub file_number: Option<String>,

    #[validate(length(max = 4000, message = "Description too long"))]
    pub description: Option<String>,

    #[validate(url(message = "Invalid source URL"))]
    pub source_url: Option<String>,

    #[validate(url(message = "Invalid docs URL"))]
    pub docs_url: Option<String>,

    pub max_budget: Option<Decimal>,
    pub tender_type_id: Option<i32>,
    pub procurement: Option<ProcurementType>,
    pub parent_id: Option<i64>,

    pub submission_date: Option<NaiveDate>,
    pub award_date: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
}

/// Partial update. `None` means "leave unchanged"; an empty patch is a pure
/// read. Tenant id is not a field here at all: the repository scope owns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenderPatch {
    pub name: Option<String>,
    pub country: Option<Country>,
    pub file_number: Option<String>,
    pub description: Option<String>,
    pub source_url: Option<String>,
    pub docs_url: Option<String>,
    pub max_budget: Option<Decimal>,
    pub global_discount: Option<Decimal>,
    pub tender_type_id: Option<i32>,
    pub procurement: Option<ProcurementType>,
    pub parent_id: Option<i64>,
    pub state: Option<TenderState>,
    pub submission_date: Option<NaiveDate>,
    pub award_date: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    pub lots: Option<Vec<LotConfig>>,
}

impl TenderPatch {
    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// Names of the fields this patch would change.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push("name");
        }
        if self.country.is_some() {
            fields.push("country");
        }
        if self.file_number.is_some() {
            fields.push("file_number");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        if self.source_url.is_some() {
            fields.push("source_url");
        }
        if self.docs_url.is_some() {
            fields.push("docs_url");
        }
        if self.max_budget.is_some() {
            fields.push("max_budget");
        }
        if self.global_discount.is_some() {
            fields.push("global_discount");
        }
        if self.tender_type_id.is_some() {
            fields.push("tender_type_id");
        }
        if self.procurement.is_some() {
            fields.push("procurement");
        }
        if self.parent_id.is_some() {
            fields.push("parent_id");
        }
        if self.state.is_some() {
            fields.push("state");
        }
        if self.submission_date.is_some() {
            fields.push("submission_date");
        }
        if self.award_date.is_some() {
            fields.push("award_date");
        }
        if self.completion_date.is_some() {
            fields.push("completion_date");
        }
        if self.lots.is_some() {
            fields.push("lots");
        }
        fields
    }

    /// Financial / date / country fields that are frozen once the tender is
    /// locked. The state id itself is included: state only moves via the
    /// dedicated transition operation.
    pub fn economic_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.max_budget.is_some() {
            fields.push("max_budget");
        }
        if self.global_discount.is_some() {
            fields.push("global_discount");
        }
        if self.state.is_some() {
            fields.push("state");
        }
        if self.submission_date.is_some() {
            fields.push("submission_date");
        }
        if self.award_date.is_some() {
            fields.push("award_date");
        }
        if self.completion_date.is_some() {
            fields.push("completion_date");
        }
        if self.country.is_some() {
            fields.push("country");
        }
        fields
    }

    /// Restrict the patch to the fields that stay editable on a locked
    /// tender. Anything else is dropped.
    pub fn into_informational(self) -> TenderPatch {
        TenderPatch {
            name: self.name,
            file_number: self.file_number,
            description: self.description,
            source_url: self.source_url,
            docs_url: self.docs_url,
            tender_type_id: self.tender_type_id,
            lots: self.lots,
            ..TenderPatch::default()
        }
    }
}

/// Payload for the state transition operation. Which fields are required
/// depends on the target state; the service enforces that.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusChange {
    /// Raw target state id; unrecognized ids fail validation.
    pub target_state_id: i16,
    pub rejection_reason: Option<String>,
    pub loss_reason: Option<String>,
    pub winning_competitor: Option<String>,
    pub award_amount: Option<Decimal>,
    pub award_date: Option<NaiveDate>,
}
