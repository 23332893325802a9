//! Super-admin views across tenants.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{
    documents::DocumentResponse,
    organizations::{MemberResponse, OrganizationResponse},
    pagination::Pagination,
};
use crate::{
    db::models::{
        approvals::{ApprovalEventDBResponse, ApprovalSubject},
        organizations::ApprovalStatus,
    },
    types::UserId,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListOrganizationsQuery {
    pub approval_status: Option<ApprovalStatus>,
    /// Case-insensitive match on the organization name
    pub search: Option<String>,

    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdminOrganizationDetail {
    #[serde(flatten)]
    pub organization: OrganizationResponse,
    #[schema(value_type = String)]
    pub balance: Decimal,
    pub members: Vec<MemberResponse>,
    pub documents: Vec<DocumentResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApprovalEventResponse {
    pub id: Uuid,
    pub subject_type: ApprovalSubject,
    pub subject_id: Uuid,
    pub status: ApprovalStatus,
    pub note: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub reviewer_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl From<ApprovalEventDBResponse> for ApprovalEventResponse {
    fn from(db: ApprovalEventDBResponse) -> Self {
        Self {
            id: db.id,
            subject_type: db.subject_type,
            subject_id: db.subject_id,
            status: db.status,
            note: db.note,
            reviewer_id: db.reviewer_id,
            created_at: db.created_at,
        }
    }
}
