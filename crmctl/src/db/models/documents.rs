use crate::db::models::organizations::ApprovalStatus;
use crate::types::{DocumentId, OrganizationId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct DocumentCreateDBRequest {
    pub id: DocumentId,
    pub organization_id: OrganizationId,
    pub document_type: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub uploaded_by: UserId,
}

#[derive(Debug, Clone, FromRow)]
pub struct DocumentDBResponse {
    pub id: DocumentId,
    pub organization_id: OrganizationId,
    pub document_type: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub status: ApprovalStatus,
    pub review_note: Option<String>,
    pub uploaded_by: Option<UserId>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
