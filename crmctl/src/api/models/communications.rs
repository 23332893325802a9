use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::pagination::Pagination;
use crate::{
    db::models::communications::{Channel, CommunicationDBResponse, CommunicationStatus},
    types::{CommunicationId, UserId},
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SendSmsRequest {
    /// E.164 phone number
    pub to: String,
    pub body: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SendEmailRequest {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommunicationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: CommunicationId,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub status: CommunicationStatus,
    #[schema(value_type = String)]
    pub credits_charged: Decimal,
    pub external_id: Option<String>,
    pub duration_seconds: Option<i32>,
    pub error: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl From<CommunicationDBResponse> for CommunicationResponse {
    fn from(db: CommunicationDBResponse) -> Self {
        Self {
            id: db.id,
            channel: db.channel,
            recipient: db.recipient,
            subject: db.subject,
            status: db.status,
            credits_charged: db.credits_charged,
            external_id: db.external_id,
            duration_seconds: db.duration_seconds,
            error: db.error,
            created_by: db.created_by,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListCommunicationsQuery {
    pub channel: Option<Channel>,

    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
}
