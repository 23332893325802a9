//! Inbound vendor webhooks. These routes are unauthenticated; each verifies its own
//! signature or shared secret before touching any state.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use rust_decimal::Decimal;

use crate::{
    AppState,
    api::models::voice::{END_OF_CALL_REPORT, VoiceWebhook},
    billing,
    db::{
        handlers::{Communications, Credits, VoiceAgents},
        models::{
            communications::{Channel, CommunicationCreateDBRequest, CommunicationStatus},
            credits::{CreditTransactionCreateDBRequest, CreditTransactionType},
        },
    },
    errors::{Error, Result},
    payment_providers::PaymentError,
    webhooks::verify_shared_secret,
};

/// Header carrying the voice vendor's shared secret
pub const VOICE_SECRET_HEADER: &str = "x-vapi-secret";

/// Credits for a call: every started minute is billed
pub fn call_cost(duration_seconds: f64, cost_per_minute: Decimal) -> Decimal {
    if duration_seconds <= 0.0 {
        return Decimal::ZERO;
    }
    Decimal::from((duration_seconds / 60.0).ceil() as i64) * cost_per_minute
}

/// Payment provider events (charge settled / failed)
#[utoipa::path(
    post,
    path = "/webhooks/payments",
    tag = "webhooks",
    summary = "Payment provider webhook",
    request_body(content = String, description = "Raw event payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Event applied or already applied"),
        (status = 400, description = "Bad signature or payload"),
        (status = 503, description = "Payments not configured"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn payment_webhook(State(state): State<AppState>, headers: HeaderMap, body: String) -> Result<StatusCode> {
    let provider = state.require_payments()?;

    let Some(event) = provider.validate_webhook(&headers, &body).await? else {
        return Err(Error::BadRequest {
            message: "Webhooks are not enabled for this payment provider".to_string(),
        });
    };

    match billing::process_webhook_event(&state.db, &state.config.credits, &event).await {
        Ok(()) | Err(PaymentError::AlreadyProcessed) => Ok(StatusCode::OK),
        Err(e) => Err(e.into()),
    }
}

/// Voice vendor call reports. Only `end-of-call-report` messages are acted on: the call is
/// billed per started minute and logged. Replays of the same call are no-ops.
#[utoipa::path(
    post,
    path = "/webhooks/voice",
    tag = "webhooks",
    summary = "Voice call webhook",
    request_body = VoiceWebhook,
    responses(
        (status = 200, description = "Report processed or ignored"),
        (status = 401, description = "Wrong shared secret"),
        (status = 503, description = "Voice not configured"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn voice_webhook(State(state): State<AppState>, headers: HeaderMap, Json(payload): Json<VoiceWebhook>) -> Result<StatusCode> {
    let config = state.config.integrations.voice.as_ref().ok_or_else(|| Error::NotConfigured {
        feature: "Voice".to_string(),
    })?;
    let presented = headers.get(VOICE_SECRET_HEADER).and_then(|h| h.to_str().ok());
    if !verify_shared_secret(presented, &config.webhook_secret) {
        return Err(Error::Unauthenticated {
            message: Some("Invalid webhook secret".to_string()),
        });
    }

    let message = payload.message;
    if message.message_type != END_OF_CALL_REPORT {
        tracing::debug!("Ignoring voice webhook message {}", message.message_type);
        return Ok(StatusCode::OK);
    }
    let Some(call) = message.call else {
        return Err(Error::BadRequest {
            message: "End-of-call report without a call".to_string(),
        });
    };
    let Some(assistant_id) = call.assistant_id.as_deref() else {
        tracing::warn!(call_id = %call.id, "End-of-call report without an assistant");
        return Ok(StatusCode::OK);
    };

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let Some(agent) = VoiceAgents::new(&mut tx).get_by_external_id(assistant_id).await? else {
        tracing::warn!(call_id = %call.id, assistant_id, "Call report for unknown assistant");
        return Ok(StatusCode::OK);
    };
    let organization_id = agent.organization_id;

    let reference = format!("call:{}", call.id);
    if Credits::new(&mut tx).find_by_reference(organization_id, &reference).await?.is_some() {
        tracing::debug!(call_id = %call.id, "Call already billed");
        return Ok(StatusCode::OK);
    }

    let duration = message.duration_seconds.unwrap_or(0.0);
    let cost = call_cost(duration, state.config.credits.voice_cost_per_minute);
    let mut charged = Decimal::ZERO;
    if cost > Decimal::ZERO {
        let debit = CreditTransactionCreateDBRequest::new(organization_id, CreditTransactionType::Usage, cost)
            .with_description(format!("Voice call ({}s)", duration.round()))
            .with_reference(&reference);
        // A savepoint keeps the transaction usable when the debit is refused
        let mut savepoint = sqlx::Connection::begin(&mut *tx).await.map_err(|e| Error::Database(e.into()))?;
        match Credits::new(&mut savepoint).create_transaction(&debit).await {
            Ok(_) => {
                savepoint.commit().await.map_err(|e| Error::Database(e.into()))?;
                charged = cost;
            }
            Err(e) if e.is_insufficient_credits() => {
                savepoint.rollback().await.map_err(|e| Error::Database(e.into()))?;
                tracing::warn!(organization_id = %organization_id, call_id = %call.id, %cost, "Insufficient credits to bill call");
            }
            Err(e) if e.is_duplicate_reference() => {
                // A concurrent delivery of the same report committed first
                tracing::debug!(call_id = %call.id, "Call already billed");
                return Ok(StatusCode::OK);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Communications::new(&mut tx)
        .create(&CommunicationCreateDBRequest {
            organization_id,
            channel: Channel::Call,
            recipient: call.customer.and_then(|c| c.number).unwrap_or_else(|| "unknown".to_string()),
            subject: message.ended_reason,
            status: CommunicationStatus::Completed,
            credits_charged: charged,
            external_id: Some(call.id.clone()),
            duration_seconds: Some(duration.round() as i32),
            created_by: None,
        })
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    tracing::info!(organization_id = %organization_id, call_id = %call.id, %charged, "Billed voice call");
    Ok(StatusCode::OK)
}
