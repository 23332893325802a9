//! Database models for auto-recharge settings and the attempt journal.

use crate::types::{AttemptId, OrganizationId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, FromRow)]
pub struct AutoRechargeSettingsDBResponse {
    pub organization_id: OrganizationId,
    pub enabled: bool,
    pub minimum_balance: Decimal,
    pub package_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl AutoRechargeSettingsDBResponse {
    /// Settings for an organization that never saved any
    pub fn disabled(organization_id: OrganizationId) -> Self {
        Self {
            organization_id,
            enabled: false,
            minimum_balance: Decimal::ZERO,
            package_id: None,
            payment_method_id: None,
            last_triggered_at: None,
            last_status: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AutoRechargeSettingsUpsertDBRequest {
    pub enabled: bool,
    pub minimum_balance: Decimal,
    pub package_id: Option<String>,
    pub payment_method_id: Option<String>,
}

/// What started a recharge check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RechargeTrigger {
    Manual,
    Cron,
    Scheduler,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct AttemptCreateDBRequest {
    pub organization_id: OrganizationId,
    pub trigger: RechargeTrigger,
    pub package_id: String,
    pub amount_cents: i64,
    pub credits: Decimal,
    pub balance_before: Decimal,
}

#[derive(Debug, Clone, FromRow)]
pub struct AttemptDBResponse {
    pub id: AttemptId,
    pub organization_id: OrganizationId,
    pub trigger: RechargeTrigger,
    pub package_id: String,
    pub amount_cents: i64,
    pub credits: Decimal,
    pub balance_before: Decimal,
    pub status: AttemptStatus,
    pub payment_reference: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
