//! Endpoints called by an external scheduler rather than a signed-in user.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
};

use crate::{
    AppState,
    billing::RechargeSweep,
    db::models::auto_recharge::RechargeTrigger,
    errors::{Error, Result},
    webhooks::verify_shared_secret,
};

/// Check the `Authorization: Bearer <secret>` header against the configured cron secret
fn authorize_cron(headers: &HeaderMap, secret: Option<&str>) -> Result<()> {
    let Some(secret) = secret else {
        return Err(Error::NotConfigured {
            feature: "Scheduled auto-recharge".to_string(),
        });
    };
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));
    if !verify_shared_secret(presented, secret) {
        return Err(Error::Unauthenticated {
            message: Some("Invalid cron secret".to_string()),
        });
    }
    Ok(())
}

/// Check every organization with auto-recharge enabled
#[utoipa::path(
    post,
    path = "/api/cron/auto-recharge",
    tag = "credits",
    summary = "Run scheduled auto-recharge",
    responses(
        (status = 200, description = "Sweep totals", body = RechargeSweep),
        (status = 401, description = "Missing or wrong cron secret"),
        (status = 503, description = "No cron secret or payment provider configured"),
    ),
    security(("CronSecret" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn run_auto_recharge(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<RechargeSweep>> {
    authorize_cron(&headers, state.config.auto_recharge.cron_secret.as_deref())?;
    let sweep = state.auto_recharger()?.check_all(RechargeTrigger::Cron).await?;
    Ok(Json(sweep))
}
