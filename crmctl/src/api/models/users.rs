//! API request/response models for users and the authenticated caller.

use crate::db::models::organizations::{MemberDBResponse, MemberRole};
use crate::db::models::users::UserDBResponse;
use crate::errors::{Error, Result};
use crate::types::{OrganizationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The authenticated caller, with their tenant membership resolved from the database
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub is_super_admin: bool,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub organization_id: Option<OrganizationId>,
    pub role: Option<MemberRole>,
}

impl CurrentUser {
    pub fn new(user: &UserDBResponse, membership: Option<&MemberDBResponse>) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            is_super_admin: user.is_super_admin,
            organization_id: membership.map(|m| m.organization_id),
            role: membership.map(|m| m.role),
        }
    }

    /// The caller's organization, or 403 when they do not belong to one
    pub fn require_organization(&self) -> Result<OrganizationId> {
        self.organization_id.ok_or_else(|| Error::Forbidden {
            message: "You are not a member of an organization".to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub is_super_admin: bool,
    pub auth_source: String,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email,
            display_name: db.display_name,
            is_super_admin: db.is_super_admin,
            auth_source: db.auth_source,
            last_login: db.last_login,
            created_at: db.created_at,
        }
    }
}

/// `GET /api/users/current`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUserResponse {
    #[serde(flatten)]
    pub user: CurrentUser,
    /// Name of the caller's organization, if any
    pub organization_name: Option<String>,
}
