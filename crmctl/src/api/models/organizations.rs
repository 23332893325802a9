//! API models for the caller's organization, its members and integrations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    db::models::organizations::{
        ApprovalStatus, MemberDBResponse, MemberRole, OrganizationDBResponse, OrganizationUpdateDBRequest,
    },
    tenant_cleanup::CleanupReport,
    types::{OrganizationId, UserId},
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrganizationResponse {
    #[schema(value_type = String, format = "uuid")]
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
    /// Whether a payment-provider customer exists for this organization
    pub has_billing_account: bool,
    pub integrations: OrganizationIntegrations,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Linked vendor accounts
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrganizationIntegrations {
    pub telephony_account_id: Option<String>,
    pub sms_from_number: Option<String>,
    pub voice_account_id: Option<String>,
    pub email_domain: Option<String>,
}

impl From<OrganizationDBResponse> for OrganizationResponse {
    fn from(db: OrganizationDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            schema_name: db.schema_name,
            approval_status: db.approval_status,
            approval_note: db.approval_note,
            approved_at: db.approved_at,
            industry: db.industry,
            phone: db.phone,
            website: db.website,
            address: db.address,
            timezone: db.timezone,
            has_billing_account: db.payment_customer_id.is_some(),
            integrations: OrganizationIntegrations {
                telephony_account_id: db.telephony_account_id,
                sms_from_number: db.sms_from_number,
                voice_account_id: db.voice_account_id,
                email_domain: db.email_domain,
            },
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Editable profile fields. Anything else in the body is ignored.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct OrganizationUpdate {
    pub name: Option<String>,
    pub industry: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub timezone: Option<String>,
}

impl From<OrganizationUpdate> for OrganizationUpdateDBRequest {
    fn from(update: OrganizationUpdate) -> Self {
        Self {
            name: update.name.map(|n| n.trim().to_string()),
            industry: update.industry,
            phone: update.phone,
            website: update.website,
            address: update.address,
            timezone: update.timezone,
        }
    }
}

/// The owner must repeat the organization name to delete it
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OrganizationDeleteRequest {
    pub confirmation: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrganizationDeleteResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: OrganizationId,
    /// Number of former members whose accounts were removed with the organization
    pub removed_users: u64,
    /// Outcome of removing vendor resources; failures are left in place
    pub cleanup: CleanupReport,
}

/// Which vendor accounts to provision for the organization
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct IntegrationsProvisionRequest {
    /// Create a telephony subaccount for SMS
    #[serde(default)]
    pub telephony: bool,
    /// Create the voice-AI organization that holds the tenant's assistants
    #[serde(default)]
    pub voice: bool,
    /// Register a sending domain with the email provider
    pub email_domain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemberResponse {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

impl From<MemberDBResponse> for MemberResponse {
    fn from(db: MemberDBResponse) -> Self {
        Self {
            user_id: db.user_id,
            email: db.email,
            display_name: db.display_name,
            role: db.role,
            joined_at: db.joined_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MemberRoleUpdate {
    pub role: MemberRole,
}
