use crate::db::{
    errors::Result,
    models::invitations::{InvitationCreateDBRequest, InvitationDBResponse},
};
use crate::types::{InvitationId, OrganizationId};
use sqlx::PgConnection;
use tracing::instrument;

const INVITATION_COLUMNS: &str =
    "id, organization_id, email, role, token_hash, invited_by, expires_at, accepted_at, revoked_at, created_at";

pub struct Invitations<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Invitations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(email = %request.email), err)]
    pub async fn create(&mut self, request: &InvitationCreateDBRequest) -> Result<InvitationDBResponse> {
        let invitation = sqlx::query_as::<_, InvitationDBResponse>(&format!(
            "INSERT INTO invitations (organization_id, email, role, token_hash, invited_by, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {INVITATION_COLUMNS}"
        ))
        .bind(request.organization_id)
        .bind(request.email.trim())
        .bind(request.role)
        .bind(&request.token_hash)
        .bind(request.invited_by)
        .bind(request.expires_at)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(invitation)
    }

    /// Invitations that were neither accepted nor revoked, newest first
    pub async fn list_open(&mut self, organization_id: OrganizationId) -> Result<Vec<InvitationDBResponse>> {
        let invitations = sqlx::query_as::<_, InvitationDBResponse>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations
             WHERE organization_id = $1 AND accepted_at IS NULL AND revoked_at IS NULL
             ORDER BY created_at DESC"
        ))
        .bind(organization_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(invitations)
    }

    /// Lock the invitation row for acceptance
    pub async fn get_by_token_hash_for_update(&mut self, token_hash: &str) -> Result<Option<InvitationDBResponse>> {
        let invitation = sqlx::query_as::<_, InvitationDBResponse>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE token_hash = $1 FOR UPDATE"
        ))
        .bind(token_hash)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(invitation)
    }

    pub async fn mark_accepted(&mut self, id: InvitationId) -> Result<()> {
        sqlx::query("UPDATE invitations SET accepted_at = NOW() WHERE id = $1 AND accepted_at IS NULL")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    /// Revoke an open invitation. Returns false when nothing open matched.
    #[instrument(skip(self), err)]
    pub async fn revoke(&mut self, organization_id: OrganizationId, id: InvitationId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE invitations SET revoked_at = NOW()
             WHERE id = $1 AND organization_id = $2 AND accepted_at IS NULL AND revoked_at IS NULL",
        )
        .bind(id)
        .bind(organization_id)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke open invitations that have passed their expiry so the email can be invited again
    pub async fn revoke_expired_for_email(&mut self, organization_id: OrganizationId, email: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE invitations SET revoked_at = NOW()
             WHERE organization_id = $1 AND LOWER(email) = LOWER($2)
               AND accepted_at IS NULL AND revoked_at IS NULL AND expires_at <= NOW()",
        )
        .bind(organization_id)
        .bind(email.trim())
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected())
    }
}
