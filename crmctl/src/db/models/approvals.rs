use crate::db::models::organizations::ApprovalStatus;
use crate::types::{OrganizationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// What a review decision was about
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalSubject {
    Organization,
    Document,
}

#[derive(Debug, Clone)]
pub struct ApprovalEventCreateDBRequest {
    pub organization_id: OrganizationId,
    pub subject_type: ApprovalSubject,
    pub subject_id: Uuid,
    pub status: ApprovalStatus,
    pub note: Option<String>,
    pub reviewer_id: UserId,
}

#[derive(Debug, Clone, FromRow)]
pub struct ApprovalEventDBResponse {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub subject_type: ApprovalSubject,
    pub subject_id: Uuid,
    pub status: ApprovalStatus,
    pub note: Option<String>,
    pub reviewer_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}
