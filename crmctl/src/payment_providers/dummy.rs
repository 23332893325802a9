//! Dummy payment provider implementation
//!
//! This provider approves every charge locally without talking to any external service.
//! Useful for testing and development purposes. Charge ids are derived from the
//! idempotency key, so retries return the same charge.

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    config::DummyConfig,
    payment_providers::{
        Charge, ChargeRequest, ChargeStatus, PaymentError, PaymentMethod, PaymentProvider, Result, SetupIntent, WebhookEvent,
    },
    types::OrganizationId,
    webhooks::signing::verify_shared_secret,
};

const SIGNATURE_HEADER: &str = "x-dummy-signature";

/// The card every dummy customer has on file
pub const DUMMY_PAYMENT_METHOD: &str = "pm_dummy_visa";

/// Dummy payment provider that approves charges instantly
#[derive(Debug, Default)]
pub struct DummyProvider {
    decline_suffix: Option<String>,
    webhook_secret: Option<String>,
    charges: AtomicUsize,
}

impl From<DummyConfig> for DummyProvider {
    fn from(config: DummyConfig) -> Self {
        Self {
            decline_suffix: config.decline_suffix,
            webhook_secret: config.webhook_secret,
            charges: AtomicUsize::new(0),
        }
    }
}

impl DummyProvider {
    /// Number of charges accepted so far
    pub fn charge_count(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Deserialize)]
struct DummyWebhookBody {
    #[serde(rename = "type")]
    event_type: String,
    charge_id: String,
    organization_id: Option<OrganizationId>,
    package_id: Option<String>,
    source: Option<String>,
}

#[async_trait]
impl PaymentProvider for DummyProvider {
    async fn create_customer(&self, organization_id: OrganizationId, _name: &str, _email: &str) -> Result<String> {
        Ok(format!("dummy_cus_{}", organization_id.simple()))
    }

    async fn create_setup_intent(&self, customer_id: &str) -> Result<SetupIntent> {
        let id = format!("dummy_seti_{}", uuid::Uuid::new_v4().simple());
        tracing::info!("Dummy provider created setup intent {} for {}", id, customer_id);
        Ok(SetupIntent {
            client_secret: format!("{id}_secret"),
            id,
        })
    }

    async fn list_payment_methods(&self, _customer_id: &str) -> Result<Vec<PaymentMethod>> {
        Ok(vec![PaymentMethod {
            id: DUMMY_PAYMENT_METHOD.to_string(),
            brand: Some("visa".to_string()),
            last4: Some("4242".to_string()),
            exp_month: Some(12),
            exp_year: Some(2099),
        }])
    }

    async fn detach_payment_method(&self, _payment_method_id: &str) -> Result<()> {
        Ok(())
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<Charge> {
        if request.amount_cents <= 0 {
            return Err(PaymentError::InvalidData("Charge amount must be positive".to_string()));
        }
        if let Some(suffix) = &self.decline_suffix
            && request.payment_method_id.ends_with(suffix.as_str())
        {
            tracing::info!("Dummy provider declining charge on {}", request.payment_method_id);
            return Err(PaymentError::Declined("card_declined".to_string()));
        }

        self.charges.fetch_add(1, Ordering::SeqCst);
        Ok(Charge {
            id: format!("dummy_ch_{}", request.idempotency_key),
            status: ChargeStatus::Succeeded,
            amount_cents: request.amount_cents,
        })
    }

    async fn validate_webhook(&self, headers: &HeaderMap, body: &str) -> Result<Option<WebhookEvent>> {
        // Webhooks are only accepted when a secret is configured
        let Some(secret) = &self.webhook_secret else {
            return Ok(None);
        };
        let presented = headers.get(SIGNATURE_HEADER).and_then(|h| h.to_str().ok());
        if !verify_shared_secret(presented, secret) {
            return Err(PaymentError::InvalidSignature);
        }

        let body: DummyWebhookBody =
            serde_json::from_str(body).map_err(|e| PaymentError::InvalidData(format!("Malformed webhook payload: {e}")))?;

        Ok(Some(match body.event_type.as_str() {
            "payment.succeeded" => WebhookEvent::PaymentSucceeded {
                charge_id: body.charge_id,
                organization_id: body
                    .organization_id
                    .ok_or_else(|| PaymentError::InvalidData("Missing organization_id".to_string()))?,
                package_id: body
                    .package_id
                    .ok_or_else(|| PaymentError::InvalidData("Missing package_id".to_string()))?,
                source: body.source,
            },
            "payment.failed" => WebhookEvent::PaymentFailed {
                charge_id: body.charge_id,
                organization_id: body.organization_id,
                reason: None,
            },
            other => WebhookEvent::Ignored {
                event_type: other.to_string(),
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn request(payment_method_id: &str, key: &str) -> ChargeRequest {
        ChargeRequest {
            customer_id: "dummy_cus_1".to_string(),
            payment_method_id: payment_method_id.to_string(),
            amount_cents: 2500,
            currency: "usd".to_string(),
            idempotency_key: key.to_string(),
            description: "test".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_charge_is_deterministic_per_key() {
        let provider = DummyProvider::default();
        let first = provider.charge(&request(DUMMY_PAYMENT_METHOD, "k1")).await.unwrap();
        let again = provider.charge(&request(DUMMY_PAYMENT_METHOD, "k1")).await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(first.status, ChargeStatus::Succeeded);
        assert_eq!(provider.charge_count(), 2);
    }

    #[tokio::test]
    async fn test_decline_suffix() {
        let provider = DummyProvider::from(DummyConfig {
            decline_suffix: Some("_declined".to_string()),
            webhook_secret: None,
        });
        let err = provider.charge(&request("pm_card_declined", "k2")).await.unwrap_err();
        assert!(matches!(err, PaymentError::Declined(_)));
        assert_eq!(provider.charge_count(), 0);
    }

    #[tokio::test]
    async fn test_webhook_not_supported_without_secret() {
        let provider = DummyProvider::default();
        let result = provider.validate_webhook(&HeaderMap::new(), "{}").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_webhook_requires_matching_secret() {
        let provider = DummyProvider::from(DummyConfig {
            decline_suffix: None,
            webhook_secret: Some("hook-secret".to_string()),
        });
        let organization_id = uuid::Uuid::new_v4();
        let body = serde_json::json!({
            "type": "payment.succeeded",
            "charge_id": "dummy_ch_1",
            "organization_id": organization_id,
            "package_id": "starter"
        })
        .to_string();

        let err = provider.validate_webhook(&HeaderMap::new(), &body).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature));

        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, "hook-secret".parse().unwrap());
        let event = provider.validate_webhook(&headers, &body).await.unwrap();
        assert!(matches!(event, Some(WebhookEvent::PaymentSucceeded { organization_id: id, .. }) if id == organization_id));
    }
}
