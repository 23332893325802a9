//! API models for team invitations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    db::models::{invitations::InvitationDBResponse, organizations::MemberRole},
    types::{InvitationId, OrganizationId, UserId},
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct InvitationCreate {
    pub email: String,
    #[serde(default = "default_role")]
    pub role: MemberRole,
}

fn default_role() -> MemberRole {
    MemberRole::Member
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvitationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: InvitationId,
    pub email: String,
    pub role: MemberRole,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub invited_by: Option<UserId>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<InvitationDBResponse> for InvitationResponse {
    fn from(db: InvitationDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email,
            role: db.role,
            invited_by: db.invited_by,
            expires_at: db.expires_at,
            created_at: db.created_at,
        }
    }
}

/// Returned once at creation; the token itself is never stored
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvitationCreatedResponse {
    #[serde(flatten)]
    pub invitation: InvitationResponse,
    /// Link that accepts the invitation, also sent by email
    pub accept_url: String,
    /// Whether the invitation email was delivered
    pub email_sent: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AcceptInvitationRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AcceptInvitationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub organization_id: OrganizationId,
    pub organization_name: String,
    pub role: MemberRole,
}
