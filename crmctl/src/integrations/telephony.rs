//! Twilio client: tenant subaccounts and SMS.

use async_trait::async_trait;
use serde::Deserialize;

use super::{Result, SmsMessage, TelephonyAccount, TelephonyProvider, base_url, send_idempotent_delete, send_json};
use crate::config::TelephonyConfig;

const SERVICE: &str = "Telephony";

pub struct TwilioClient {
    account_sid: String,
    auth_token: String,
    default_from_number: String,
    api_base: String,
    client: reqwest::Client,
}

impl TwilioClient {
    pub fn new(config: &TelephonyConfig, client: reqwest::Client) -> Self {
        Self {
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            default_from_number: config.default_from_number.clone(),
            api_base: base_url(&config.api_base),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/2010-04-01/{}", self.api_base, path)
    }
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    sid: String,
    friendly_name: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
}

#[async_trait]
impl TelephonyProvider for TwilioClient {
    async fn create_subaccount(&self, friendly_name: &str) -> Result<TelephonyAccount> {
        let account: AccountResponse = send_json(
            SERVICE,
            self.client
                .post(self.url("Accounts.json"))
                .basic_auth(&self.account_sid, Some(&self.auth_token))
                .form(&[("FriendlyName", friendly_name)]),
        )
        .await?;
        tracing::info!(sid = %account.sid, "Created telephony subaccount");
        Ok(TelephonyAccount {
            sid: account.sid,
            friendly_name: account.friendly_name,
        })
    }

    async fn close_subaccount(&self, sid: &str) -> Result<()> {
        send_idempotent_delete(
            SERVICE,
            self.client
                .post(self.url(&format!("Accounts/{sid}.json")))
                .basic_auth(&self.account_sid, Some(&self.auth_token))
                .form(&[("Status", "closed")]),
        )
        .await
    }

    async fn send_sms(&self, message: &SmsMessage) -> Result<String> {
        let account = message.account_sid.as_deref().unwrap_or(&self.account_sid);
        let response: MessageResponse = send_json(
            SERVICE,
            self.client
                .post(self.url(&format!("Accounts/{account}/Messages.json")))
                .basic_auth(&self.account_sid, Some(&self.auth_token))
                .form(&[("To", message.to.as_str()), ("From", message.from.as_str()), ("Body", message.body.as_str())]),
        )
        .await?;
        Ok(response.sid)
    }

    fn default_from_number(&self) -> &str {
        &self.default_from_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::IntegrationError;
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> TwilioClient {
        TwilioClient::new(
            &TelephonyConfig {
                account_sid: "AC_parent".to_string(),
                auth_token: "token".to_string(),
                default_from_number: "+15550000000".to_string(),
                api_base: Url::parse(&server.uri()).unwrap(),
            },
            crate::test_utils::http_client(),
        )
    }

    #[tokio::test]
    async fn test_send_sms_from_subaccount() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC_sub/Messages.json"))
            .and(body_string_contains("To=%2B15551234567"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sid": "SM123", "status": "queued"})))
            .expect(1)
            .mount(&server)
            .await;

        let sid = client(&server)
            .send_sms(&SmsMessage {
                account_sid: Some("AC_sub".to_string()),
                from: "+15550000000".to_string(),
                to: "+15551234567".to_string(),
                body: "hello".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(sid, "SM123");
    }

    #[tokio::test]
    async fn test_invalid_number_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC_parent/Messages.json"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"code": 21211, "message": "Invalid 'To' Phone Number"})))
            .mount(&server)
            .await;

        let err = client(&server)
            .send_sms(&SmsMessage {
                account_sid: None,
                from: "+15550000000".to_string(),
                to: "nope".to_string(),
                body: "hello".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_close_missing_subaccount_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC_gone.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        client(&server).close_subaccount("AC_gone").await.unwrap();
    }
}
