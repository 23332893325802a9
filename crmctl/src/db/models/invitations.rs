use crate::db::models::organizations::MemberRole;
use crate::types::{InvitationId, OrganizationId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct InvitationCreateDBRequest {
    pub organization_id: OrganizationId,
    pub email: String,
    pub role: MemberRole,
    pub token_hash: String,
    pub invited_by: UserId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct InvitationDBResponse {
    pub id: InvitationId,
    pub organization_id: OrganizationId,
    pub email: String,
    pub role: MemberRole,
    pub token_hash: String,
    pub invited_by: Option<UserId>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl InvitationDBResponse {
    /// Open invitations can still be accepted or revoked.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.accepted_at.is_none() && self.revoked_at.is_none() && self.expires_at > now
    }
}
