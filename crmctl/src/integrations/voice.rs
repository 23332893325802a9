//! Vapi client for voice assistants.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{AssistantRequest, Result, VoiceProvider, base_url, send_idempotent_delete, send_json};
use crate::config::VoiceConfig;

const SERVICE: &str = "Voice";

pub struct VapiClient {
    api_key: String,
    api_base: String,
    client: reqwest::Client,
}

impl VapiClient {
    pub fn new(config: &VoiceConfig, client: reqwest::Client) -> Self {
        Self {
            api_key: config.api_key.clone(),
            api_base: base_url(&config.api_base),
            client,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: String,
}

#[async_trait]
impl VoiceProvider for VapiClient {
    async fn create_organization(&self, name: &str, organization_id: &str) -> Result<String> {
        let org: CreatedResponse = send_json(
            SERVICE,
            self.client
                .post(format!("{}/org", self.api_base))
                .bearer_auth(&self.api_key)
                .json(&json!({
                    "name": name,
                    "metadata": { "organization_id": organization_id },
                })),
        )
        .await?;
        Ok(org.id)
    }

    async fn delete_organization(&self, id: &str) -> Result<()> {
        send_idempotent_delete(
            SERVICE,
            self.client
                .delete(format!("{}/org/{}", self.api_base, id))
                .bearer_auth(&self.api_key),
        )
        .await
    }

    async fn create_assistant(&self, request: &AssistantRequest) -> Result<String> {
        let mut body = json!({
            "name": request.name,
            "metadata": { "organization_id": request.organization_id },
        });
        if let Some(first_message) = &request.first_message {
            body["firstMessage"] = json!(first_message);
        }
        if let Some(prompt) = &request.system_prompt {
            body["model"] = json!({
                "provider": "openai",
                "model": "gpt-4o",
                "messages": [{ "role": "system", "content": prompt }],
            });
        }

        let assistant: CreatedResponse = send_json(
            SERVICE,
            self.client
                .post(format!("{}/assistant", self.api_base))
                .bearer_auth(&self.api_key)
                .json(&body),
        )
        .await?;
        Ok(assistant.id)
    }

    async fn delete_assistant(&self, id: &str) -> Result<()> {
        send_idempotent_delete(
            SERVICE,
            self.client
                .delete(format!("{}/assistant/{}", self.api_base, id))
                .bearer_auth(&self.api_key),
        )
        .await
    }
}
