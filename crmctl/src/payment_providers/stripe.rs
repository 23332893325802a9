//! Stripe payment provider implementation

use async_trait::async_trait;
use axum::http::HeaderMap;
use std::collections::HashMap;
use std::time::Duration;
use stripe::{Client, IdempotencyKey, RequestStrategy, StripeError, StripeRequest};
use stripe_core::{
    customer::{CreateCustomer, ListPaymentMethodsCustomer},
    payment_intent::{CreatePaymentIntent, CreatePaymentIntentOffSession},
    setup_intent::{CreateSetupIntent, CreateSetupIntentUsage},
};
use stripe_payment::payment_method::DetachPaymentMethod;
use stripe_shared::{ApiErrorsType, PaymentIntentStatus};
use stripe_types::Currency;
use stripe_webhook::{EventObject, Webhook};

use crate::{
    config::StripeConfig,
    payment_providers::{
        Charge, ChargeRequest, ChargeStatus, METADATA_ORGANIZATION_ID, METADATA_PACKAGE_ID, METADATA_SOURCE, PaymentError,
        PaymentMethod, PaymentProvider, Result, SetupIntent, WebhookEvent,
    },
    types::OrganizationId,
};

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Stripe payment provider
pub struct StripeProvider {
    webhook_secret: String,
    webhook_tolerance: Duration,
    client: Client,
}

impl StripeProvider {
    /// Create a new Stripe provider
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: Client::new(&config.api_key),
            webhook_secret: config.webhook_secret,
            webhook_tolerance: config.webhook_tolerance,
        }
    }
}

/// Translate a Stripe API error into the provider-neutral error
fn map_stripe_error(err: StripeError) -> PaymentError {
    match err {
        StripeError::Stripe(api_error, status) => {
            tracing::warn!(status, error_type = ?api_error.type_, code = ?api_error.code, "Stripe returned an error");
            let message = api_error.message.clone().unwrap_or_else(|| format!("HTTP {status}"));
            match api_error.type_ {
                ApiErrorsType::CardError => PaymentError::Declined(api_error.decline_code.clone().unwrap_or(message)),
                ApiErrorsType::InvalidRequestError => PaymentError::InvalidData(message),
                _ => PaymentError::ProviderApi(message),
            }
        }
        other => {
            tracing::error!("Stripe request failed: {:?}", other);
            PaymentError::ProviderApi(other.to_string())
        }
    }
}

/// Only settled or settling intents count as a charge; anything else needs the customer
fn charge_status(intent_id: &str, status: &PaymentIntentStatus) -> Result<ChargeStatus> {
    match status {
        PaymentIntentStatus::Succeeded => Ok(ChargeStatus::Succeeded),
        PaymentIntentStatus::Processing => Ok(ChargeStatus::Processing),
        other => {
            tracing::warn!("Payment intent {} ended in status {}", intent_id, other.as_str());
            Err(PaymentError::Declined(format!("payment requires action ({})", other.as_str())))
        }
    }
}

/// Reject signatures whose `t=` lies outside the tolerance window before handing the
/// header to the Stripe verifier.
fn check_signature_age(header: &str, tolerance: Duration, now: i64) -> Result<()> {
    let timestamp = header
        .split(',')
        .find_map(|part| part.trim().strip_prefix("t="))
        .and_then(|value| value.parse::<i64>().ok())
        .ok_or(PaymentError::InvalidSignature)?;

    if now.abs_diff(timestamp) > tolerance.as_secs() {
        tracing::warn!("Rejected Stripe webhook with stale timestamp");
        return Err(PaymentError::InvalidSignature);
    }
    Ok(())
}

/// The parts of a payment intent a webhook needs
struct IntentEvent {
    id: String,
    metadata: HashMap<String, String>,
    failure: Option<String>,
}

fn payment_succeeded(intent: IntentEvent) -> Result<WebhookEvent> {
    let organization_id = intent
        .metadata
        .get(METADATA_ORGANIZATION_ID)
        .and_then(|id| id.parse::<OrganizationId>().ok())
        .ok_or_else(|| PaymentError::InvalidData("Payment intent has no organization metadata".to_string()))?;
    let package_id = intent
        .metadata
        .get(METADATA_PACKAGE_ID)
        .cloned()
        .ok_or_else(|| PaymentError::InvalidData("Payment intent has no package metadata".to_string()))?;
    Ok(WebhookEvent::PaymentSucceeded {
        charge_id: intent.id,
        organization_id,
        package_id,
        source: intent.metadata.get(METADATA_SOURCE).cloned(),
    })
}

fn payment_failed(intent: IntentEvent) -> WebhookEvent {
    WebhookEvent::PaymentFailed {
        organization_id: intent
            .metadata
            .get(METADATA_ORGANIZATION_ID)
            .and_then(|id| id.parse::<OrganizationId>().ok()),
        charge_id: intent.id,
        reason: intent.failure,
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_customer(&self, organization_id: OrganizationId, name: &str, email: &str) -> Result<String> {
        let metadata = HashMap::from([(METADATA_ORGANIZATION_ID.to_string(), organization_id.to_string())]);
        let customer = CreateCustomer::new()
            .name(name)
            .email(email)
            .metadata(metadata)
            .send(&self.client)
            .await
            .map_err(map_stripe_error)?;

        tracing::info!("Created Stripe customer {} for organization {}", customer.id, organization_id);
        Ok(customer.id.to_string())
    }

    async fn create_setup_intent(&self, customer_id: &str) -> Result<SetupIntent> {
        let intent = CreateSetupIntent::new()
            .customer(customer_id)
            .usage(CreateSetupIntentUsage::OffSession)
            .send(&self.client)
            .await
            .map_err(map_stripe_error)?;

        let client_secret = intent.client_secret.ok_or_else(|| {
            tracing::error!("Setup intent {} missing client secret", intent.id);
            PaymentError::ProviderApi("Setup intent missing client secret".to_string())
        })?;
        Ok(SetupIntent {
            id: intent.id.to_string(),
            client_secret,
        })
    }

    async fn list_payment_methods(&self, customer_id: &str) -> Result<Vec<PaymentMethod>> {
        let list = ListPaymentMethodsCustomer::new(customer_id)
            .send(&self.client)
            .await
            .map_err(map_stripe_error)?;

        Ok(list
            .data
            .into_iter()
            .map(|pm| {
                let card = pm.card;
                PaymentMethod {
                    id: pm.id.to_string(),
                    brand: card.as_ref().map(|c| c.brand.clone()),
                    last4: card.as_ref().map(|c| c.last4.clone()),
                    exp_month: card.as_ref().and_then(|c| u32::try_from(c.exp_month).ok()),
                    exp_year: card.as_ref().and_then(|c| u32::try_from(c.exp_year).ok()),
                }
            })
            .collect())
    }

    async fn detach_payment_method(&self, payment_method_id: &str) -> Result<()> {
        DetachPaymentMethod::new(payment_method_id)
            .send(&self.client)
            .await
            .map_err(map_stripe_error)?;
        Ok(())
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<Charge> {
        let currency: Currency = request
            .currency
            .parse()
            .map_err(|_| PaymentError::InvalidData(format!("Unknown currency {}", request.currency)))?;
        let idempotency_key = IdempotencyKey::new(request.idempotency_key.as_str())
            .map_err(|e| PaymentError::InvalidData(format!("Invalid idempotency key: {e}")))?;
        let metadata: HashMap<String, String> = request.metadata.clone().into_iter().collect();

        let intent = CreatePaymentIntent::new(request.amount_cents, currency)
            .customer(request.customer_id.as_str())
            .payment_method(request.payment_method_id.as_str())
            .off_session(CreatePaymentIntentOffSession::Bool(true))
            .confirm(true)
            .description(request.description.as_str())
            .metadata(metadata)
            .customize()
            .request_strategy(RequestStrategy::Idempotent(idempotency_key))
            .send(&self.client)
            .await
            .map_err(map_stripe_error)?;

        let intent_id = intent.id.to_string();
        let status = charge_status(&intent_id, &intent.status)?;
        tracing::info!("Payment intent {} {:?} for {} cents", intent_id, status, intent.amount);
        Ok(Charge {
            id: intent_id,
            status,
            amount_cents: intent.amount,
        })
    }

    async fn validate_webhook(&self, headers: &HeaderMap, body: &str) -> Result<Option<WebhookEvent>> {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|h| h.to_str().ok()).ok_or_else(|| {
            tracing::warn!("Missing or unreadable stripe-signature header");
            PaymentError::InvalidSignature
        })?;
        check_signature_age(signature, self.webhook_tolerance, chrono::Utc::now().timestamp())?;

        let event = Webhook::construct_event(body, signature, &self.webhook_secret).map_err(|e| {
            tracing::warn!("Rejected Stripe webhook: {}", e);
            PaymentError::InvalidSignature
        })?;
        tracing::trace!("Validated Stripe webhook event: {:?}", event.type_);

        let webhook_event = match event.data.object {
            EventObject::PaymentIntentSucceeded(intent) => payment_succeeded(IntentEvent {
                id: intent.id.to_string(),
                metadata: intent.metadata,
                failure: None,
            })?,
            EventObject::PaymentIntentPaymentFailed(intent) => payment_failed(IntentEvent {
                id: intent.id.to_string(),
                metadata: intent.metadata,
                failure: intent.last_payment_error.and_then(|e| e.message),
            }),
            _ => WebhookEvent::Ignored {
                event_type: event.type_.as_str().to_string(),
            },
        };
        Ok(Some(webhook_event))
    }
}
