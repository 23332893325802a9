use crate::db::{
    errors::Result,
    models::approvals::{ApprovalEventCreateDBRequest, ApprovalEventDBResponse},
};
use crate::types::OrganizationId;
use sqlx::PgConnection;

const EVENT_COLUMNS: &str = "id, organization_id, subject_type, subject_id, status, note, reviewer_id, created_at";

pub struct Approvals<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Approvals<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    pub async fn record(&mut self, request: &ApprovalEventCreateDBRequest) -> Result<ApprovalEventDBResponse> {
        let event = sqlx::query_as::<_, ApprovalEventDBResponse>(&format!(
            "INSERT INTO approval_events (organization_id, subject_type, subject_id, status, note, reviewer_id)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(request.organization_id)
        .bind(request.subject_type)
        .bind(request.subject_id)
        .bind(request.status)
        .bind(&request.note)
        .bind(request.reviewer_id)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(event)
    }

    pub async fn list_for_organization(&mut self, organization_id: OrganizationId) -> Result<Vec<ApprovalEventDBResponse>> {
        let events = sqlx::query_as::<_, ApprovalEventDBResponse>(&format!(
            "SELECT {EVENT_COLUMNS} FROM approval_events WHERE organization_id = $1 ORDER BY created_at DESC, id"
        ))
        .bind(organization_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(events)
    }
}
