//! Repositories for the communication log and voice agents.

use crate::db::{
    errors::Result,
    models::communications::{Channel, CommunicationCreateDBRequest, CommunicationDBResponse, CommunicationStatus, VoiceAgentDBResponse},
};
use crate::types::{CommunicationId, OrganizationId, UserId, VoiceAgentId};
use sqlx::PgConnection;
use tracing::instrument;

const COMMUNICATION_COLUMNS: &str = "id, organization_id, channel, recipient, subject, status, credits_charged, external_id, \
     duration_seconds, error, created_by, created_at";
const VOICE_AGENT_COLUMNS: &str = "id, organization_id, external_id, name, created_by, created_at";

#[derive(Debug, Clone)]
pub struct CommunicationFilter {
    pub organization_id: OrganizationId,
    pub channel: Option<Channel>,
    pub skip: i64,
    pub limit: i64,
}

pub struct Communications<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Communications<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(channel = ?request.channel), err)]
    pub async fn create(&mut self, request: &CommunicationCreateDBRequest) -> Result<CommunicationDBResponse> {
        let communication = sqlx::query_as::<_, CommunicationDBResponse>(&format!(
            "INSERT INTO communications
                (organization_id, channel, recipient, subject, status, credits_charged, external_id, duration_seconds, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COMMUNICATION_COLUMNS}"
        ))
        .bind(request.organization_id)
        .bind(request.channel)
        .bind(&request.recipient)
        .bind(&request.subject)
        .bind(request.status)
        .bind(request.credits_charged)
        .bind(&request.external_id)
        .bind(request.duration_seconds)
        .bind(request.created_by)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(communication)
    }

    pub async fn mark_sent(&mut self, id: CommunicationId, external_id: &str) -> Result<CommunicationDBResponse> {
        let communication = sqlx::query_as::<_, CommunicationDBResponse>(&format!(
            "UPDATE communications SET status = $2, external_id = $3 WHERE id = $1 RETURNING {COMMUNICATION_COLUMNS}"
        ))
        .bind(id)
        .bind(CommunicationStatus::Sent)
        .bind(external_id)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(communication)
    }

    /// Failed sends keep their row with zero charge after the debit is refunded
    pub async fn mark_failed(&mut self, id: CommunicationId, error: &str) -> Result<CommunicationDBResponse> {
        let communication = sqlx::query_as::<_, CommunicationDBResponse>(&format!(
            "UPDATE communications SET status = $2, error = $3, credits_charged = 0 WHERE id = $1 RETURNING {COMMUNICATION_COLUMNS}"
        ))
        .bind(id)
        .bind(CommunicationStatus::Failed)
        .bind(error)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(communication)
    }

    pub async fn list(&mut self, filter: &CommunicationFilter) -> Result<Vec<CommunicationDBResponse>> {
        let communications = sqlx::query_as::<_, CommunicationDBResponse>(&format!(
            "SELECT {COMMUNICATION_COLUMNS} FROM communications
             WHERE organization_id = $1 AND ($2::text IS NULL OR channel = $2)
             ORDER BY created_at DESC, id
             OFFSET $3 LIMIT $4"
        ))
        .bind(filter.organization_id)
        .bind(filter.channel)
        .bind(filter.skip)
        .bind(filter.limit)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(communications)
    }

    pub async fn count(&mut self, filter: &CommunicationFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM communications WHERE organization_id = $1 AND ($2::text IS NULL OR channel = $2)",
        )
        .bind(filter.organization_id)
        .bind(filter.channel)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }
}

pub struct VoiceAgents<'c> {
    db: &'c mut PgConnection,
}

impl<'c> VoiceAgents<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &mut self,
        organization_id: OrganizationId,
        external_id: &str,
        name: &str,
        created_by: UserId,
    ) -> Result<VoiceAgentDBResponse> {
        let agent = sqlx::query_as::<_, VoiceAgentDBResponse>(&format!(
            "INSERT INTO voice_agents (organization_id, external_id, name, created_by)
             VALUES ($1, $2, $3, $4)
             RETURNING {VOICE_AGENT_COLUMNS}"
        ))
        .bind(organization_id)
        .bind(external_id)
        .bind(name)
        .bind(created_by)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(agent)
    }

    pub async fn list(&mut self, organization_id: OrganizationId) -> Result<Vec<VoiceAgentDBResponse>> {
        let agents = sqlx::query_as::<_, VoiceAgentDBResponse>(&format!(
            "SELECT {VOICE_AGENT_COLUMNS} FROM voice_agents WHERE organization_id = $1 ORDER BY created_at DESC"
        ))
        .bind(organization_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(agents)
    }

    pub async fn get_by_id(&mut self, organization_id: OrganizationId, id: VoiceAgentId) -> Result<Option<VoiceAgentDBResponse>> {
        let agent = sqlx::query_as::<_, VoiceAgentDBResponse>(&format!(
            "SELECT {VOICE_AGENT_COLUMNS} FROM voice_agents WHERE id = $1 AND organization_id = $2"
        ))
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(agent)
    }

    /// Resolve the tenant that owns a vendor assistant id
    pub async fn get_by_external_id(&mut self, external_id: &str) -> Result<Option<VoiceAgentDBResponse>> {
        let agent = sqlx::query_as::<_, VoiceAgentDBResponse>(&format!(
            "SELECT {VOICE_AGENT_COLUMNS} FROM voice_agents WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(agent)
    }

    pub async fn delete(&mut self, organization_id: OrganizationId, id: VoiceAgentId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM voice_agents WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(organization_id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
