//! API models for CRM customers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::pagination::Pagination;
use crate::{
    db::models::customers::{CustomerDBResponse, CustomerStatus, CustomerUpdateDBRequest},
    types::{CustomerId, UserId},
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CustomerCreate {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    #[serde(default)]
    pub status: CustomerStatus,
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CustomerUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub status: Option<CustomerStatus>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl From<CustomerUpdate> for CustomerUpdateDBRequest {
    fn from(update: CustomerUpdate) -> Self {
        Self {
            name: update.name,
            email: update.email,
            phone: update.phone,
            company: update.company,
            status: update.status,
            notes: update.notes,
            tags: update.tags,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: CustomerId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub status: CustomerStatus,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CustomerDBResponse> for CustomerResponse {
    fn from(db: CustomerDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            email: db.email,
            phone: db.phone,
            company: db.company,
            status: db.status,
            notes: db.notes,
            tags: db.tags,
            created_by: db.created_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListCustomersQuery {
    pub status: Option<CustomerStatus>,
    /// Case-insensitive match on name, email, phone or company
    pub search: Option<String>,
    pub tag: Option<String>,

    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
}
