//! Voice agents and the voice provider's end-of-call webhook payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    db::models::communications::VoiceAgentDBResponse,
    types::{UserId, VoiceAgentId},
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VoiceAgentCreate {
    pub name: String,
    /// What the agent says when a call connects
    pub first_message: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VoiceAgentResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: VoiceAgentId,
    pub name: String,
    /// The assistant id at the voice provider
    pub external_id: String,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl From<VoiceAgentDBResponse> for VoiceAgentResponse {
    fn from(db: VoiceAgentDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            external_id: db.external_id,
            created_by: db.created_by,
            created_at: db.created_at,
        }
    }
}

/// Envelope the voice provider posts to the server URL
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VoiceWebhook {
    pub message: VoiceWebhookMessage,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoiceWebhookMessage {
    /// Only `end-of-call-report` is acted on
    #[serde(rename = "type")]
    pub message_type: String,
    pub call: Option<VoiceCall>,
    pub duration_seconds: Option<f64>,
    pub ended_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoiceCall {
    pub id: String,
    pub assistant_id: Option<String>,
    pub customer: Option<VoiceCallCustomer>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VoiceCallCustomer {
    pub number: Option<String>,
}

pub const END_OF_CALL_REPORT: &str = "end-of-call-report";
