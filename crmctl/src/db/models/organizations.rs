//! Database models for organizations (tenants) and their memberships.

use crate::types::{OrganizationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Review state shared by organizations and documents, stored as TEXT
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    RequiresInfo,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::RequiresInfo => "requires_info",
        }
    }
}

/// Tenant role of a member, ordered from least to most privileged
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Member,
    Admin,
    Owner,
}

#[derive(Debug, Clone)]
pub struct OrganizationCreateDBRequest {
    pub name: String,
    pub schema_name: String,
    pub industry: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
}

/// Profile fields a tenant admin may change. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrganizationUpdateDBRequest {
    pub name: Option<String>,
    pub industry: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub timezone: Option<String>,
}

/// External account ids linked to an organization. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrganizationIntegrationsUpdate {
    pub payment_customer_id: Option<String>,
    pub telephony_account_id: Option<String>,
    pub sms_from_number: Option<String>,
    pub voice_account_id: Option<String>,
    pub email_domain_id: Option<String>,
    pub email_domain: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct OrganizationDBResponse {
    pub id: OrganizationId,
    pub name: String,
    pub schema_name: String,
    pub approval_status: ApprovalStatus,
    pub approval_note: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub industry: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub timezone: Option<String>,
    pub payment_customer_id: Option<String>,
    pub telephony_account_id: Option<String>,
    pub sms_from_number: Option<String>,
    pub voice_account_id: Option<String>,
    pub email_domain_id: Option<String>,
    pub email_domain: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A membership joined with the member's user row
#[derive(Debug, Clone, FromRow)]
pub struct MemberDBResponse {
    pub organization_id: OrganizationId,
    pub user_id: UserId,
    pub role: MemberRole,
    pub email: String,
    pub display_name: Option<String>,
    pub joined_at: DateTime<Utc>,
}
