//! Database models for the communication log and voice agents.

use crate::types::{CommunicationId, OrganizationId, UserId, VoiceAgentId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Sms,
    Email,
    Call,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStatus {
    Pending,
    Sent,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct CommunicationCreateDBRequest {
    pub organization_id: OrganizationId,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub status: CommunicationStatus,
    pub credits_charged: Decimal,
    pub external_id: Option<String>,
    pub duration_seconds: Option<i32>,
    pub created_by: Option<UserId>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CommunicationDBResponse {
    pub id: CommunicationId,
    pub organization_id: OrganizationId,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub status: CommunicationStatus,
    pub credits_charged: Decimal,
    pub external_id: Option<String>,
    pub duration_seconds: Option<i32>,
    pub error: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct VoiceAgentDBResponse {
    pub id: VoiceAgentId,
    pub organization_id: OrganizationId,
    pub external_id: String,
    pub name: String,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}
