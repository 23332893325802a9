//! Clients for the communication vendors a tenant is provisioned on.
//!
//! Each vendor sits behind a trait so handlers and tenant cleanup can be exercised with
//! mock servers. A vendor whose config section is absent has no client in
//! [`crate::AppState`], and the endpoints that need it answer 503.

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

pub mod email_delivery;
pub mod telephony;
pub mod voice;

pub use email_delivery::ResendClient;
pub use telephony::TwilioClient;
pub use voice::VapiClient;

pub type Result<T> = std::result::Result<T, IntegrationError>;

#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("{0} is not configured")]
    NotConfigured(String),

    /// The vendor refused the request (4xx)
    #[error("{service} rejected the request: {message}")]
    Rejected { service: String, message: String },

    /// The vendor failed (5xx or unreadable response)
    #[error("{service} API error: {message}")]
    Api { service: String, message: String },

    #[error("{service} request failed: {source}")]
    Transport {
        service: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A telephony account provisioned for a tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelephonyAccount {
    pub sid: String,
    pub friendly_name: String,
}

#[derive(Debug, Clone)]
pub struct SmsMessage {
    /// Subaccount to send from; the parent account when absent
    pub account_sid: Option<String>,
    pub from: String,
    pub to: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct AssistantRequest {
    pub name: String,
    pub first_message: Option<String>,
    pub system_prompt: Option<String>,
    pub organization_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailDomain {
    pub id: String,
    pub name: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

#[async_trait]
pub trait TelephonyProvider: Send + Sync {
    async fn create_subaccount(&self, friendly_name: &str) -> Result<TelephonyAccount>;

    /// Close a subaccount; closing an unknown account succeeds
    async fn close_subaccount(&self, sid: &str) -> Result<()>;

    /// Send an SMS and return the vendor message id
    async fn send_sms(&self, message: &SmsMessage) -> Result<String>;

    fn default_from_number(&self) -> &str;
}

#[async_trait]
pub trait VoiceProvider: Send + Sync {
    /// Create the vendor-side organization that holds a tenant's assistants
    async fn create_organization(&self, name: &str, organization_id: &str) -> Result<String>;

    /// Delete a vendor-side organization; deleting an unknown one succeeds
    async fn delete_organization(&self, id: &str) -> Result<()>;

    /// Create an assistant and return its vendor id
    async fn create_assistant(&self, request: &AssistantRequest) -> Result<String>;

    /// Delete an assistant; deleting an unknown assistant succeeds
    async fn delete_assistant(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait EmailDeliveryProvider: Send + Sync {
    async fn create_domain(&self, name: &str) -> Result<EmailDomain>;

    /// Remove a sending domain; removing an unknown domain succeeds
    async fn delete_domain(&self, id: &str) -> Result<()>;

    /// Send an email and return the vendor message id
    async fn send_email(&self, email: &OutboundEmail) -> Result<String>;

    fn default_from(&self) -> &str;
}

/// Send a request and decode the JSON body, classifying failures by status
pub(crate) async fn send_json<T: DeserializeOwned>(service: &str, request: RequestBuilder) -> Result<T> {
    let response = request.send().await.map_err(|source| IntegrationError::Transport {
        service: service.to_string(),
        source,
    })?;
    let status = response.status();

    if status.is_success() {
        return response.json::<T>().await.map_err(|e| IntegrationError::Api {
            service: service.to_string(),
            message: format!("Unexpected response body: {e}"),
        });
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(service, status, body))
}

/// Send a delete-style request where a 404 means the resource is already gone
pub(crate) async fn send_idempotent_delete(service: &str, request: RequestBuilder) -> Result<()> {
    let response = request.send().await.map_err(|source| IntegrationError::Transport {
        service: service.to_string(),
        source,
    })?;
    let status = response.status();

    if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(service, status, body))
}

fn classify_failure(service: &str, status: reqwest::StatusCode, body: String) -> IntegrationError {
    tracing::warn!(service, status = %status, "Vendor request failed");
    let message = extract_message(&body).unwrap_or_else(|| format!("HTTP {status}"));
    if status.is_client_error() {
        IntegrationError::Rejected {
            service: service.to_string(),
            message,
        }
    } else {
        IntegrationError::Api {
            service: service.to_string(),
            message,
        }
    }
}

/// Vendors put the human readable error under `message` or `error.message`
fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("error").and_then(|e| e.get("message")))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

pub(crate) fn base_url(url: &url::Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}
