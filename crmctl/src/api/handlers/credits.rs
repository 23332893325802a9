//! Balance, ledger history, package purchases and auto-recharge settings.

use axum::{
    Json,
    extract::{Query, State},
};
use rust_decimal::Decimal;

use crate::{
    AppState,
    api::{
        handlers::organization::fetch_organization,
        models::{
            credits::{
                AutoRechargeSettingsResponse, AutoRechargeSettingsUpdate, BalanceResponse, CreditPackageResponse, CreditTransactionResponse,
                ListTransactionsQuery, PurchaseRequest, PurchaseResponse, PurchaseStatus,
            },
            pagination::PaginatedResponse,
        },
    },
    auth::permissions::{RequiresPermission, operation, resource},
    billing::{self, RechargeOutcome},
    db::{
        handlers::{AutoRecharge, Credits, credits::CreditTransactionFilter},
        models::auto_recharge::{AutoRechargeSettingsUpsertDBRequest, RechargeTrigger},
    },
    errors::{Error, Result},
    payment_providers::ChargeStatus,
};

/// Attempts shown alongside the auto-recharge settings
const RECENT_ATTEMPTS: i64 = 10;

#[utoipa::path(
    get,
    path = "/api/credits",
    tag = "credits",
    summary = "Get credit balance",
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 403, description = "Not a member of an organization"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_balance(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Credits, operation::ReadOwn>,
) -> Result<Json<BalanceResponse>> {
    let organization_id = current_user.require_organization()?;
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let balance = Credits::new(&mut pool_conn).get_balance(organization_id).await?;
    Ok(Json(BalanceResponse { organization_id, balance }))
}

#[utoipa::path(
    get,
    path = "/api/credits/transactions",
    tag = "credits",
    summary = "List credit transactions",
    params(ListTransactionsQuery),
    responses(
        (status = 200, description = "Ledger entries, newest first", body = PaginatedResponse<CreditTransactionResponse>),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListTransactionsQuery>,
    current_user: RequiresPermission<resource::Credits, operation::ReadOwn>,
) -> Result<Json<PaginatedResponse<CreditTransactionResponse>>> {
    let organization_id = current_user.require_organization()?;
    let (skip, limit) = query.pagination.params();
    let filter = CreditTransactionFilter {
        transaction_type: query.transaction_type,
        ..CreditTransactionFilter::new(organization_id, skip, limit)
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Credits::new(&mut pool_conn);
    let transactions = repo.list_transactions(&filter).await?;
    let total_count = repo.count_transactions(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        transactions.into_iter().map(Into::into).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    get,
    path = "/api/credits/packages",
    tag = "credits",
    summary = "List credit packages",
    responses(
        (status = 200, description = "Purchasable packages", body = [CreditPackageResponse]),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_packages(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Credits, operation::ReadOwn>,
) -> Result<Json<Vec<CreditPackageResponse>>> {
    Ok(Json(state.config.credits.packages.iter().map(Into::into).collect()))
}

/// Charge a saved card for a package. Settled charges are credited immediately; charges
/// that are still processing are credited by the payment webhook.
#[utoipa::path(
    post,
    path = "/api/credits/purchase",
    tag = "credits",
    summary = "Purchase a credit package",
    request_body = PurchaseRequest,
    responses(
        (status = 200, description = "Charge accepted", body = PurchaseResponse),
        (status = 400, description = "Unknown package, declined card or no billing account"),
        (status = 502, description = "Payment provider unavailable"),
        (status = 503, description = "Payments not configured"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn purchase_credits(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Credits, operation::CreateOwn>,
    Json(request): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResponse>> {
    let organization_id = current_user.require_organization()?;
    let package = state
        .config
        .credits
        .package(&request.package_id)
        .ok_or_else(|| Error::BadRequest {
            message: format!("Unknown credit package '{}'", request.package_id),
        })?;
    let provider = state.require_payments()?;

    let organization = {
        let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        fetch_organization(&mut pool_conn, organization_id).await?
    };

    let outcome = billing::purchase_package(
        &state.db,
        provider.as_ref(),
        &organization,
        package,
        &request.payment_method_id,
        format!("purchase_{}", uuid::Uuid::new_v4().simple()),
        current_user.id,
    )
    .await?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let balance = Credits::new(&mut pool_conn).get_balance(organization_id).await?;

    Ok(Json(PurchaseResponse {
        status: match outcome.charge.status {
            ChargeStatus::Succeeded => PurchaseStatus::Completed,
            ChargeStatus::Processing => PurchaseStatus::Processing,
        },
        charge_id: outcome.charge.id,
        package: package.into(),
        balance,
        transaction: outcome.transaction.map(Into::into),
    }))
}

#[utoipa::path(
    get,
    path = "/api/credits/auto-recharge",
    tag = "credits",
    summary = "Get auto-recharge settings",
    responses(
        (status = 200, description = "Settings and recent attempts", body = AutoRechargeSettingsResponse),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_auto_recharge(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Credits, operation::ReadOwn>,
) -> Result<Json<AutoRechargeSettingsResponse>> {
    let organization_id = current_user.require_organization()?;
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = AutoRecharge::new(&mut pool_conn);
    let settings = repo.get_settings(organization_id).await?;
    let attempts = repo.list_attempts(organization_id, RECENT_ATTEMPTS).await?;
    Ok(Json(AutoRechargeSettingsResponse::new(settings, attempts)))
}

#[utoipa::path(
    put,
    path = "/api/credits/auto-recharge",
    tag = "credits",
    summary = "Update auto-recharge settings",
    request_body = AutoRechargeSettingsUpdate,
    responses(
        (status = 200, description = "Saved settings", body = AutoRechargeSettingsResponse),
        (status = 400, description = "Invalid threshold, package or missing payment method"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_auto_recharge(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Credits, operation::UpdateOwn>,
    Json(request): Json<AutoRechargeSettingsUpdate>,
) -> Result<Json<AutoRechargeSettingsResponse>> {
    let organization_id = current_user.require_organization()?;
    if request.minimum_balance < Decimal::ZERO {
        return Err(Error::BadRequest {
            message: "Minimum balance cannot be negative".to_string(),
        });
    }
    if let Some(package_id) = &request.package_id
        && state.config.credits.package(package_id).is_none()
    {
        return Err(Error::BadRequest {
            message: format!("Unknown credit package '{package_id}'"),
        });
    }
    if request.enabled && (request.package_id.is_none() || request.payment_method_id.is_none()) {
        return Err(Error::BadRequest {
            message: "A package and a payment method are required to enable auto-recharge".to_string(),
        });
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = AutoRecharge::new(&mut pool_conn);
    let settings = repo
        .upsert_settings(
            organization_id,
            &AutoRechargeSettingsUpsertDBRequest {
                enabled: request.enabled,
                minimum_balance: request.minimum_balance,
                package_id: request.package_id,
                payment_method_id: request.payment_method_id,
            },
        )
        .await?;
    let attempts = repo.list_attempts(organization_id, RECENT_ATTEMPTS).await?;
    Ok(Json(AutoRechargeSettingsResponse::new(settings, attempts)))
}

/// Run an auto-recharge check for the caller's organization now
#[utoipa::path(
    post,
    path = "/api/credits/auto-recharge/trigger",
    tag = "credits",
    summary = "Trigger an auto-recharge check",
    responses(
        (status = 200, description = "Outcome of the check", body = RechargeOutcome),
        (status = 503, description = "Payments not configured"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn trigger_auto_recharge(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Credits, operation::UpdateOwn>,
) -> Result<Json<RechargeOutcome>> {
    let organization_id = current_user.require_organization()?;
    let outcome = state.auto_recharger()?.check(organization_id, RechargeTrigger::Manual).await?;
    Ok(Json(outcome))
}
