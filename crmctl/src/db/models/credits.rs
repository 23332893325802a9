//! Database models for the credit ledger.

use crate::types::{OrganizationId, TransactionId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Decimal places stored by the ledger's NUMERIC columns
pub const CREDIT_SCALE: u32 = 4;

/// Credit transaction type enum stored as TEXT in database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CreditTransactionType {
    Purchase,
    AutoRecharge,
    AdminGrant,
    SignupBonus,
    Refund,
    AdminRemoval,
    Usage,
}

impl CreditTransactionType {
    /// Whether transactions of this type add credits to the balance
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            CreditTransactionType::Purchase
                | CreditTransactionType::AutoRecharge
                | CreditTransactionType::AdminGrant
                | CreditTransactionType::SignupBonus
                | CreditTransactionType::Refund
        )
    }

    /// Apply this type's sign to a positive amount
    pub fn signed(&self, amount: Decimal) -> Decimal {
        if self.is_credit() { amount } else { -amount }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CreditTransactionType::Purchase => "purchase",
            CreditTransactionType::AutoRecharge => "auto_recharge",
            CreditTransactionType::AdminGrant => "admin_grant",
            CreditTransactionType::SignupBonus => "signup_bonus",
            CreditTransactionType::Refund => "refund",
            CreditTransactionType::AdminRemoval => "admin_removal",
            CreditTransactionType::Usage => "usage",
        }
    }
}

/// Database request for a ledger write. `amount` is always positive; the type decides the sign.
#[derive(Debug, Clone)]
pub struct CreditTransactionCreateDBRequest {
    pub organization_id: OrganizationId,
    pub transaction_type: CreditTransactionType,
    pub amount: Decimal,
    pub description: Option<String>,
    /// Idempotency key, unique per organization when present
    pub reference: Option<String>,
    pub created_by: Option<UserId>,
}

impl CreditTransactionCreateDBRequest {
    pub fn new(organization_id: OrganizationId, transaction_type: CreditTransactionType, amount: Decimal) -> Self {
        Self {
            organization_id,
            transaction_type,
            amount,
            description: None,
            reference: None,
            created_by: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn created_by(mut self, user_id: UserId) -> Self {
        self.created_by = Some(user_id);
        self
    }
}

/// Database response for a credit transaction. `amount` is signed.
#[derive(Debug, Clone, FromRow)]
pub struct CreditTransactionDBResponse {
    pub id: TransactionId,
    pub organization_id: OrganizationId,
    pub transaction_type: CreditTransactionType,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Stored balance next to the signed sum of the log
#[derive(Debug, Clone, FromRow)]
pub struct CreditReconciliationDBResponse {
    pub organization_id: OrganizationId,
    pub stored_balance: Decimal,
    pub ledger_sum: Decimal,
    pub transaction_count: i64,
}
