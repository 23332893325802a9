//! Resend client for tenant sending domains and outbound email.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{EmailDeliveryProvider, EmailDomain, OutboundEmail, Result, base_url, send_idempotent_delete, send_json};
use crate::config::EmailDeliveryConfig;

const SERVICE: &str = "Email delivery";

pub struct ResendClient {
    api_key: String,
    default_from: String,
    api_base: String,
    client: reqwest::Client,
}

impl ResendClient {
    pub fn new(config: &EmailDeliveryConfig, client: reqwest::Client) -> Self {
        Self {
            api_key: config.api_key.clone(),
            default_from: config.default_from.clone(),
            api_base: base_url(&config.api_base),
            client,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DomainResponse {
    id: String,
    name: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmailResponse {
    id: String,
}

#[async_trait]
impl EmailDeliveryProvider for ResendClient {
    async fn create_domain(&self, name: &str) -> Result<EmailDomain> {
        let domain: DomainResponse = send_json(
            SERVICE,
            self.client
                .post(format!("{}/domains", self.api_base))
                .bearer_auth(&self.api_key)
                .json(&json!({ "name": name })),
        )
        .await?;
        Ok(EmailDomain {
            id: domain.id,
            name: domain.name,
            status: domain.status,
        })
    }

    async fn delete_domain(&self, id: &str) -> Result<()> {
        send_idempotent_delete(
            SERVICE,
            self.client
                .delete(format!("{}/domains/{}", self.api_base, id))
                .bearer_auth(&self.api_key),
        )
        .await
    }

    async fn send_email(&self, email: &OutboundEmail) -> Result<String> {
        let mut body = json!({
            "from": email.from,
            "to": [email.to],
            "subject": email.subject,
            "text": email.text,
        });
        if let Some(html) = &email.html {
            body["html"] = json!(html);
        }

        let response: EmailResponse = send_json(
            SERVICE,
            self.client
                .post(format!("{}/emails", self.api_base))
                .bearer_auth(&self.api_key)
                .json(&body),
        )
        .await?;
        Ok(response.id)
    }

    fn default_from(&self) -> &str {
        &self.default_from
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::IntegrationError;
    use url::Url;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ResendClient {
        ResendClient::new(
            &EmailDeliveryConfig {
                api_key: "re_key".to_string(),
                default_from: "crm@example.com".to_string(),
                api_base: Url::parse(&server.uri()).unwrap(),
            },
            crate::test_utils::http_client(),
        )
    }

    #[tokio::test]
    async fn test_send_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(body_partial_json(json!({"to": ["jane@example.com"], "subject": "Hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "email_1"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server)
            .send_email(&OutboundEmail {
                from: "crm@example.com".to_string(),
                to: "jane@example.com".to_string(),
                subject: "Hello".to_string(),
                text: "Hi Jane".to_string(),
                html: None,
            })
            .await
            .unwrap();
        assert_eq!(id, "email_1");
    }

    #[tokio::test]
    async fn test_create_domain_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/domains"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server).create_domain("mail.example.com").await.unwrap_err();
        assert!(matches!(err, IntegrationError::Api { .. }));
    }
}
