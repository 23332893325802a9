//! API models for verification documents and their review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::pagination::Pagination;
use crate::{
    db::models::{documents::DocumentDBResponse, organizations::ApprovalStatus},
    types::{DocumentId, OrganizationId, UserId},
};

/// Document metadata; the blob itself is never returned through the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DocumentResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: DocumentId,
    #[schema(value_type = String, format = "uuid")]
    pub organization_id: OrganizationId,
    pub document_type: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub status: ApprovalStatus,
    pub review_note: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub uploaded_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<DocumentDBResponse> for DocumentResponse {
    fn from(db: DocumentDBResponse) -> Self {
        Self {
            id: db.id,
            organization_id: db.organization_id,
            document_type: db.document_type,
            filename: db.filename,
            content_type: db.content_type,
            size_bytes: db.size_bytes,
            status: db.status,
            review_note: db.review_note,
            uploaded_by: db.uploaded_by,
            reviewed_at: db.reviewed_at,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListDocumentsQuery {
    /// Only documents in this review state
    pub status: Option<ApprovalStatus>,

    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
}

/// A super-admin decision on an organization or a document
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub status: ApprovalStatus,
    pub note: Option<String>,
}
