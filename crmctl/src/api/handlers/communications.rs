//! Outbound SMS and email, billed against the credit ledger.
//!
//! A send debits the ledger and logs a pending communication in one transaction before
//! the vendor is called. When the vendor fails the debit is refunded and the entry is
//! marked failed, so the balance only ever pays for delivered messages.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;

use crate::{
    AppState,
    api::{
        handlers::organization::{fetch_organization, require_approved},
        models::{
            communications::{CommunicationResponse, ListCommunicationsQuery, SendEmailRequest, SendSmsRequest},
            pagination::PaginatedResponse,
        },
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Communications, Credits, communications::CommunicationFilter},
        models::{
            communications::{Channel, CommunicationCreateDBRequest, CommunicationDBResponse, CommunicationStatus},
            credits::{CreditTransactionCreateDBRequest, CreditTransactionType},
        },
    },
    errors::{Error, Result},
    integrations::{OutboundEmail, SmsMessage},
    types::{OrganizationId, UserId},
};

fn require_field(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::BadRequest {
            message: format!("{field} is required"),
        });
    }
    Ok(value.to_string())
}

struct Outbound {
    organization_id: OrganizationId,
    channel: Channel,
    recipient: String,
    subject: Option<String>,
    cost: Decimal,
    sender: UserId,
}

/// Log the message as pending and debit its cost. Fails with 402 when the balance is too low.
async fn reserve(state: &AppState, outbound: Outbound) -> Result<CommunicationDBResponse> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let communication = Communications::new(&mut tx)
        .create(&CommunicationCreateDBRequest {
            organization_id: outbound.organization_id,
            channel: outbound.channel,
            recipient: outbound.recipient,
            subject: outbound.subject,
            status: CommunicationStatus::Pending,
            credits_charged: outbound.cost,
            external_id: None,
            duration_seconds: None,
            created_by: Some(outbound.sender),
        })
        .await?;

    if outbound.cost > Decimal::ZERO {
        let debit = CreditTransactionCreateDBRequest::new(outbound.organization_id, CreditTransactionType::Usage, outbound.cost)
            .with_description(format!("{:?} to {}", communication.channel, communication.recipient))
            .with_reference(format!("comm:{}", communication.id))
            .created_by(outbound.sender);
        Credits::new(&mut tx).create_transaction(&debit).await?;
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    Ok(communication)
}

/// Record the vendor outcome, refunding the debit when the send failed
async fn settle(state: &AppState, communication: CommunicationDBResponse, sent: Result<String>) -> Result<CommunicationDBResponse> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    match sent {
        Ok(external_id) => {
            let communication = Communications::new(&mut tx).mark_sent(communication.id, &external_id).await?;
            tx.commit().await.map_err(|e| Error::Database(e.into()))?;
            Ok(communication)
        }
        Err(e) => {
            tracing::warn!(communication_id = %communication.id, "Send failed, refunding: {}", e);
            if communication.credits_charged > Decimal::ZERO {
                let refund = CreditTransactionCreateDBRequest::new(
                    communication.organization_id,
                    CreditTransactionType::Refund,
                    communication.credits_charged,
                )
                .with_description("Refund for failed delivery")
                .with_reference(format!("refund:{}", communication.id));
                Credits::new(&mut tx).create_transaction(&refund).await?;
            }
            Communications::new(&mut tx).mark_failed(communication.id, &e.to_string()).await?;
            tx.commit().await.map_err(|e| Error::Database(e.into()))?;
            Err(e)
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/communications",
    tag = "communications",
    summary = "List communications",
    params(ListCommunicationsQuery),
    responses(
        (status = 200, description = "Communication log, newest first", body = PaginatedResponse<CommunicationResponse>),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_communications(
    State(state): State<AppState>,
    Query(query): Query<ListCommunicationsQuery>,
    current_user: RequiresPermission<resource::Communications, operation::ReadOwn>,
) -> Result<Json<PaginatedResponse<CommunicationResponse>>> {
    let organization_id = current_user.require_organization()?;
    let (skip, limit) = query.pagination.params();
    let filter = CommunicationFilter {
        organization_id,
        channel: query.channel,
        skip,
        limit,
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Communications::new(&mut pool_conn);
    let communications = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        communications.into_iter().map(Into::into).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/api/communications/sms",
    tag = "communications",
    summary = "Send an SMS",
    request_body = SendSmsRequest,
    responses(
        (status = 201, description = "Message accepted by the carrier", body = CommunicationResponse),
        (status = 402, description = "Insufficient credits"),
        (status = 403, description = "Organization not approved"),
        (status = 502, description = "Carrier failed; credits refunded"),
        (status = 503, description = "Telephony not configured"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn send_sms(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Communications, operation::CreateOwn>,
    Json(request): Json<SendSmsRequest>,
) -> Result<(StatusCode, Json<CommunicationResponse>)> {
    let organization_id = current_user.require_organization()?;
    let to = require_field(&request.to, "Recipient")?;
    let body = require_field(&request.body, "Message body")?;

    let organization = {
        let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        fetch_organization(&mut pool_conn, organization_id).await?
    };
    require_approved(&organization)?;
    let telephony = state.require_telephony()?;

    let communication = reserve(
        &state,
        Outbound {
            organization_id,
            channel: Channel::Sms,
            recipient: to.clone(),
            subject: None,
            cost: state.config.credits.sms_cost,
            sender: current_user.id,
        },
    )
    .await?;

    let message = SmsMessage {
        account_sid: organization.telephony_account_id.clone(),
        from: organization
            .sms_from_number
            .clone()
            .unwrap_or_else(|| telephony.default_from_number().to_string()),
        to,
        body,
    };
    let sent = telephony.send_sms(&message).await.map_err(Error::from);
    let communication = settle(&state, communication, sent).await?;

    Ok((StatusCode::CREATED, Json(communication.into())))
}

#[utoipa::path(
    post,
    path = "/api/communications/email",
    tag = "communications",
    summary = "Send an email",
    request_body = SendEmailRequest,
    responses(
        (status = 201, description = "Email accepted for delivery", body = CommunicationResponse),
        (status = 402, description = "Insufficient credits"),
        (status = 403, description = "Organization not approved"),
        (status = 502, description = "Delivery provider failed; credits refunded"),
        (status = 503, description = "Email delivery not configured"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn send_email(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Communications, operation::CreateOwn>,
    Json(request): Json<SendEmailRequest>,
) -> Result<(StatusCode, Json<CommunicationResponse>)> {
    let organization_id = current_user.require_organization()?;
    let to = require_field(&request.to, "Recipient")?;
    if !to.contains('@') {
        return Err(Error::BadRequest {
            message: "A valid recipient email address is required".to_string(),
        });
    }
    let subject = require_field(&request.subject, "Subject")?;

    let organization = {
        let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        fetch_organization(&mut pool_conn, organization_id).await?
    };
    require_approved(&organization)?;
    let delivery = state.require_email_delivery()?;

    let communication = reserve(
        &state,
        Outbound {
            organization_id,
            channel: Channel::Email,
            recipient: to.clone(),
            subject: Some(subject.clone()),
            cost: state.config.credits.email_cost,
            sender: current_user.id,
        },
    )
    .await?;

    let email = OutboundEmail {
        from: match &organization.email_domain {
            Some(domain) => format!("{} <noreply@{}>", organization.name, domain),
            None => delivery.default_from().to_string(),
        },
        to,
        subject,
        text: request.text,
        html: request.html,
    };
    let sent = delivery.send_email(&email).await.map_err(Error::from);
    let communication = settle(&state, communication, sent).await?;

    Ok((StatusCode::CREATED, Json(communication.into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{EmailDeliveryConfig, TelephonyConfig},
        db::models::organizations::OrganizationDBResponse,
        test_utils::*,
    };
    use serde_json::{Value, json};
    use sqlx::PgPool;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn vendor_config(server: &MockServer) -> crate::config::Config {
        let mut config = create_test_config();
        config.integrations.telephony = Some(TelephonyConfig {
            account_sid: "AC_parent".to_string(),
            auth_token: "token".to_string(),
            default_from_number: "+15550000000".to_string(),
            api_base: server.uri().parse().unwrap(),
        });
        config.integrations.email_delivery = Some(EmailDeliveryConfig {
            api_key: "re_key".to_string(),
            default_from: "CRM <crm@example.com>".to_string(),
            api_base: server.uri().parse().unwrap(),
        });
        config
    }

    async fn funded_organization(pool: &PgPool, credits: i64) -> (OrganizationDBResponse, crate::db::models::users::UserDBResponse) {
        let (org, owner) = create_test_organization(pool, "Messaging Co").await;
        let org = approve_test_organization(pool, &org).await;
        if credits > 0 {
            let mut conn = pool.acquire().await.unwrap();
            Credits::new(&mut conn)
                .create_transaction(&CreditTransactionCreateDBRequest::new(
                    org.id,
                    CreditTransactionType::AdminGrant,
                    Decimal::from(credits),
                ))
                .await
                .unwrap();
        }
        (org, owner)
    }

    async fn balance(pool: &PgPool, org: &OrganizationDBResponse) -> Decimal {
        let mut conn = pool.acquire().await.unwrap();
        Credits::new(&mut conn).get_balance(org.id).await.unwrap()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_send_sms_debits_and_logs(pool: PgPool) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC_parent/Messages.json"))
            .and(body_string_contains("From=%2B15550000000"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sid": "SM1"})))
            .expect(1)
            .mount(&server)
            .await;
        let (app, _bg_services) = create_test_app_with_config(pool.clone(), vendor_config(&server)).await;
        let (org, owner) = funded_organization(&pool, 10).await;

        let response = app
            .post("/api/communications/sms")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .json(&json!({"to": "+15551234567", "body": "Your appointment is tomorrow"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let sent: CommunicationResponse = response.json();
        assert_eq!(sent.status, CommunicationStatus::Sent);
        assert_eq!(sent.external_id.as_deref(), Some("SM1"));
        assert_eq!(balance(&pool, &org).await, Decimal::from(9));

        let page: Value = app
            .get("/api/communications?channel=sms")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .await
            .json();
        assert_eq!(page["total_count"], 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_failed_sms_is_refunded(pool: PgPool) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC_parent/Messages.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let (app, _bg_services) = create_test_app_with_config(pool.clone(), vendor_config(&server)).await;
        let (org, owner) = funded_organization(&pool, 10).await;

        app.post("/api/communications/sms")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .json(&json!({"to": "+15551234567", "body": "Hello"}))
            .await
            .assert_status(StatusCode::BAD_GATEWAY);

        assert_eq!(balance(&pool, &org).await, Decimal::from(10));
        let mut conn = pool.acquire().await.unwrap();
        let log = Communications::new(&mut conn)
            .list(&CommunicationFilter {
                organization_id: org.id,
                channel: None,
                skip: 0,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, CommunicationStatus::Failed);
        assert!(log[0].error.is_some());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_send_requires_credits_and_approval(pool: PgPool) {
        let server = MockServer::start().await;
        let (app, _bg_services) = create_test_app_with_config(pool.clone(), vendor_config(&server)).await;

        let (_pending, pending_owner) = create_test_organization(&pool, "Pending Co").await;
        app.post("/api/communications/sms")
            .add_header(&add_auth_headers(&pending_owner)[0].0, &add_auth_headers(&pending_owner)[0].1)
            .json(&json!({"to": "+15551234567", "body": "Hello"}))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let (org, owner) = funded_organization(&pool, 0).await;
        app.post("/api/communications/sms")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .json(&json!({"to": "+15551234567", "body": "Hello"}))
            .await
            .assert_status(StatusCode::PAYMENT_REQUIRED);

        // The rejected send leaves no trace
        let mut conn = pool.acquire().await.unwrap();
        let count = Communications::new(&mut conn)
            .count(&CommunicationFilter {
                organization_id: org.id,
                channel: None,
                skip: 0,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_send_email_uses_default_sender(pool: PgPool) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(body_partial_json(json!({"from": "CRM <crm@example.com>", "to": ["patient@example.com"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "em_1"})))
            .expect(1)
            .mount(&server)
            .await;
        let (app, _bg_services) = create_test_app_with_config(pool.clone(), vendor_config(&server)).await;
        let (org, owner) = funded_organization(&pool, 2).await;

        let response = app
            .post("/api/communications/email")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .json(&json!({"to": "patient@example.com", "subject": "Reminder", "text": "See you soon"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let sent: CommunicationResponse = response.json();
        assert_eq!(sent.channel, Channel::Email);
        assert_eq!(balance(&pool, &org).await, Decimal::new(15, 1));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_send_without_vendor_is_unavailable(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let (_org, owner) = funded_organization(&pool, 10).await;

        app.post("/api/communications/email")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .json(&json!({"to": "patient@example.com", "subject": "Hi", "text": "Hello"}))
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }
}
