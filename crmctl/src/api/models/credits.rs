//! API models for balances, the ledger, packages and auto-recharge.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::pagination::Pagination;
use crate::{
    config::CreditPackage,
    db::models::{
        auto_recharge::{AttemptDBResponse, AttemptStatus, AutoRechargeSettingsDBResponse, RechargeTrigger},
        credits::{CreditReconciliationDBResponse, CreditTransactionDBResponse, CreditTransactionType},
    },
    types::{AttemptId, OrganizationId, TransactionId, UserId},
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    #[schema(value_type = String, format = "uuid")]
    pub organization_id: OrganizationId,
    #[schema(value_type = String)]
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditTransactionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: TransactionId,
    pub transaction_type: CreditTransactionType,
    /// Signed: negative for debits
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[schema(value_type = String)]
    pub balance_after: Decimal,
    pub description: Option<String>,
    pub reference: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl From<CreditTransactionDBResponse> for CreditTransactionResponse {
    fn from(db: CreditTransactionDBResponse) -> Self {
        Self {
            id: db.id,
            transaction_type: db.transaction_type,
            amount: db.amount,
            balance_after: db.balance_after,
            description: db.description,
            reference: db.reference,
            created_by: db.created_by,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListTransactionsQuery {
    pub transaction_type: Option<CreditTransactionType>,

    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditPackageResponse {
    pub id: String,
    pub name: String,
    #[schema(value_type = String)]
    pub credits: Decimal,
    pub price_cents: i64,
    pub currency: String,
}

impl From<&CreditPackage> for CreditPackageResponse {
    fn from(package: &CreditPackage) -> Self {
        Self {
            id: package.id.clone(),
            name: package.name.clone(),
            credits: package.credits,
            price_cents: package.price_cents,
            currency: package.currency.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PurchaseRequest {
    pub package_id: String,
    pub payment_method_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Charge settled and the credits are on the balance
    Completed,
    /// Charge accepted; credits follow with the payment webhook
    Processing,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PurchaseResponse {
    pub charge_id: String,
    pub status: PurchaseStatus,
    pub package: CreditPackageResponse,
    #[schema(value_type = String)]
    pub balance: Decimal,
    pub transaction: Option<CreditTransactionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AutoRechargeSettingsResponse {
    pub enabled: bool,
    #[schema(value_type = String)]
    pub minimum_balance: Decimal,
    pub package_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
    pub last_error: Option<String>,
    /// Most recent charge attempts, newest first
    pub recent_attempts: Vec<RechargeAttemptResponse>,
}

impl AutoRechargeSettingsResponse {
    pub fn new(settings: AutoRechargeSettingsDBResponse, attempts: Vec<AttemptDBResponse>) -> Self {
        Self {
            enabled: settings.enabled,
            minimum_balance: settings.minimum_balance,
            package_id: settings.package_id,
            payment_method_id: settings.payment_method_id,
            last_triggered_at: settings.last_triggered_at,
            last_status: settings.last_status,
            last_error: settings.last_error,
            recent_attempts: attempts.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AutoRechargeSettingsUpdate {
    pub enabled: bool,
    #[schema(value_type = String)]
    pub minimum_balance: Decimal,
    pub package_id: Option<String>,
    pub payment_method_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RechargeAttemptResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: AttemptId,
    pub trigger: RechargeTrigger,
    pub package_id: String,
    pub amount_cents: i64,
    #[schema(value_type = String)]
    pub credits: Decimal,
    #[schema(value_type = String)]
    pub balance_before: Decimal,
    pub status: AttemptStatus,
    pub payment_reference: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<AttemptDBResponse> for RechargeAttemptResponse {
    fn from(db: AttemptDBResponse) -> Self {
        Self {
            id: db.id,
            trigger: db.trigger,
            package_id: db.package_id,
            amount_cents: db.amount_cents,
            credits: db.credits,
            balance_before: db.balance_before,
            status: db.status,
            payment_reference: db.payment_reference,
            error: db.error,
            created_at: db.created_at,
            completed_at: db.completed_at,
        }
    }
}

/// Direction of a manual balance adjustment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Grant,
    Removal,
}

impl From<AdjustmentKind> for CreditTransactionType {
    fn from(kind: AdjustmentKind) -> Self {
        match kind {
            AdjustmentKind::Grant => CreditTransactionType::AdminGrant,
            AdjustmentKind::Removal => CreditTransactionType::AdminRemoval,
        }
    }
}

/// Super-admin credit grant or removal
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AdminCreditAdjustment {
    pub kind: AdjustmentKind,
    /// Positive amount; `kind` decides the sign
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub description: Option<String>,
    /// Optional idempotency key; repeating it returns 409
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReconciliationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub organization_id: OrganizationId,
    #[schema(value_type = String)]
    pub stored_balance: Decimal,
    #[schema(value_type = String)]
    pub ledger_sum: Decimal,
    pub transaction_count: i64,
    pub consistent: bool,
}

impl From<CreditReconciliationDBResponse> for ReconciliationResponse {
    fn from(db: CreditReconciliationDBResponse) -> Self {
        Self {
            organization_id: db.organization_id,
            consistent: db.stored_balance == db.ledger_sum,
            stored_balance: db.stored_balance,
            ledger_sum: db.ledger_sum,
            transaction_count: db.transaction_count,
        }
    }
}
