//! Card management against the configured payment provider.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::{
        handlers::organization::fetch_organization,
        models::payments::{PaymentMethodResponse, SetupIntentResponse},
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{AutoRecharge, Organizations},
        models::{auto_recharge::AutoRechargeSettingsUpsertDBRequest, organizations::OrganizationIntegrationsUpdate},
    },
    errors::{Error, Result},
};

/// Start collecting a card. Creates the provider customer on first use.
#[utoipa::path(
    post,
    path = "/api/stripe/setup-intent",
    tag = "payments",
    summary = "Create a card setup intent",
    responses(
        (status = 200, description = "Setup intent for the client library", body = SetupIntentResponse),
        (status = 503, description = "Payments not configured"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_setup_intent(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::PaymentMethods, operation::CreateOwn>,
) -> Result<Json<SetupIntentResponse>> {
    let organization_id = current_user.require_organization()?;
    let provider = state.require_payments()?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let organization = fetch_organization(&mut pool_conn, organization_id).await?;
    let customer_id = match organization.payment_customer_id {
        Some(id) => id,
        None => {
            let id = provider
                .create_customer(organization_id, &organization.name, &current_user.email)
                .await?;
            Organizations::new(&mut pool_conn)
                .update_integrations(
                    organization_id,
                    &OrganizationIntegrationsUpdate {
                        payment_customer_id: Some(id.clone()),
                        ..Default::default()
                    },
                )
                .await?;
            tracing::info!(organization_id = %organization_id, "Created billing customer");
            id
        }
    };

    let intent = provider.create_setup_intent(&customer_id).await?;
    Ok(Json(intent.into()))
}

#[utoipa::path(
    get,
    path = "/api/stripe/payment-methods",
    tag = "payments",
    summary = "List saved cards",
    responses(
        (status = 200, description = "Saved cards; empty before the first setup intent", body = [PaymentMethodResponse]),
        (status = 503, description = "Payments not configured"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_payment_methods(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::PaymentMethods, operation::ReadOwn>,
) -> Result<Json<Vec<PaymentMethodResponse>>> {
    let organization_id = current_user.require_organization()?;
    let provider = state.require_payments()?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let organization = fetch_organization(&mut pool_conn, organization_id).await?;
    let Some(customer_id) = organization.payment_customer_id else {
        return Ok(Json(vec![]));
    };
    let settings = AutoRecharge::new(&mut pool_conn).get_settings(organization_id).await?;

    let methods = provider.list_payment_methods(&customer_id).await?;
    Ok(Json(
        methods
            .into_iter()
            .map(|m| PaymentMethodResponse::new(m, settings.payment_method_id.as_deref()))
            .collect(),
    ))
}

/// Remove a saved card. Auto-recharge is switched off when it was charging this card.
#[utoipa::path(
    delete,
    path = "/api/stripe/payment-methods/{id}",
    tag = "payments",
    summary = "Detach a saved card",
    params(("id" = String, Path, description = "Payment method ID")),
    responses(
        (status = 204, description = "Card detached"),
        (status = 404, description = "Card does not belong to this organization"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn detach_payment_method(
    State(state): State<AppState>,
    Path(id): Path<String>,
    current_user: RequiresPermission<resource::PaymentMethods, operation::DeleteOwn>,
) -> Result<StatusCode> {
    let organization_id = current_user.require_organization()?;
    let provider = state.require_payments()?;
    let not_found = || Error::NotFound {
        resource: "Payment method".to_string(),
        id: id.clone(),
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let organization = fetch_organization(&mut pool_conn, organization_id).await?;
    let customer_id = organization.payment_customer_id.ok_or_else(not_found)?;
    if !provider.list_payment_methods(&customer_id).await?.iter().any(|m| m.id == id) {
        return Err(not_found());
    }

    provider.detach_payment_method(&id).await?;

    let mut auto_recharge = AutoRecharge::new(&mut pool_conn);
    let settings = auto_recharge.get_settings(organization_id).await?;
    if settings.payment_method_id.as_deref() == Some(id.as_str()) {
        auto_recharge
            .upsert_settings(
                organization_id,
                &AutoRechargeSettingsUpsertDBRequest {
                    enabled: false,
                    minimum_balance: settings.minimum_balance,
                    package_id: settings.package_id,
                    payment_method_id: None,
                },
            )
            .await?;
        tracing::info!(organization_id = %organization_id, "Disabled auto-recharge after its card was removed");
    }

    Ok(StatusCode::NO_CONTENT)
}
