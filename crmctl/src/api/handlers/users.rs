use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::users::{CurrentUser, CurrentUserResponse},
    db::handlers::Organizations,
    errors::{Error, Result},
};

/// The authenticated caller together with their membership
#[utoipa::path(
    get,
    path = "/api/users/current",
    tag = "users",
    summary = "Get current user",
    responses(
        (status = 200, description = "Current user", body = CurrentUserResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_current_user(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<CurrentUserResponse>> {
    let organization_name = match current_user.organization_id {
        Some(id) => {
            let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            Organizations::new(&mut pool_conn).get_by_id(id).await?.map(|org| org.name)
        }
        None => None,
    };

    Ok(Json(CurrentUserResponse {
        user: current_user,
        organization_name,
    }))
}
