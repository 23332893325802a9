use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session,
    db::{
        errors::DbError,
        handlers::{Organizations, Users},
        models::users::{UserCreateDBRequest, UserDBResponse},
    },
    errors::{Error, Result},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use sqlx::PgConnection;
use tracing::{debug, instrument, trace};

/// Read the session cookie value, if the request carries one
fn session_cookie_value<'a>(parts: &'a Parts, cookie_name: &str) -> Option<&'a str> {
    let cookie_str = parts.headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    cookie_str.split(';').find_map(|cookie| {
        let (name, value) = cookie.trim().split_once('=')?;
        (name == cookie_name).then_some(value)
    })
}

/// Extract user from JWT session cookie if present and valid
/// Returns:
/// - None: No JWT cookie present
/// - Some(Ok(user)): Valid JWT found and the user still exists
/// - Some(Err(error)): JWT cookie present but invalid, expired, or for a deleted user
#[instrument(skip(parts, state, conn))]
async fn try_jwt_session_auth(parts: &Parts, state: &AppState, conn: &mut PgConnection) -> Option<Result<UserDBResponse>> {
    let token = session_cookie_value(parts, &state.config.auth.native.session.cookie_name)?;

    let claims = match session::verify_session_token(token, &state.config) {
        Ok(claims) => claims,
        Err(e) => return Some(Err(e)),
    };

    match Users::new(conn).get_by_id(claims.sub).await {
        Ok(Some(user)) => Some(Ok(user)),
        Ok(None) => Some(Err(Error::Unauthenticated {
            message: Some("Session user no longer exists".to_string()),
        })),
        Err(e) => Some(Err(Error::Database(e))),
    }
}

/// Extract user from proxy header if present and valid
/// Returns:
/// - None: No proxy header present, or unknown user with auto-creation disabled
/// - Some(Ok(user)): Valid proxy header found and user authenticated
/// - Some(Err(error)): Proxy header present but user lookup/creation failed
#[instrument(skip(parts, state, conn))]
async fn try_proxy_header_auth(parts: &Parts, state: &AppState, conn: &mut PgConnection) -> Option<Result<UserDBResponse>> {
    let config = &state.config.auth.proxy_header;
    let user_email = parts
        .headers
        .get(&config.header_name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|email| !email.is_empty())?;

    let mut users = Users::new(conn);
    match users.get_user_by_email(user_email).await {
        Ok(Some(user)) => Some(Ok(user)),
        Ok(None) if config.auto_create_users => {
            let request = UserCreateDBRequest {
                email: user_email.to_string(),
                display_name: None,
                password_hash: None,
                is_super_admin: false,
                auth_source: "proxy-header".to_string(),
            };
            Some(users.create(&request).await.map_err(Error::Database))
        }
        Ok(None) => None,
        Err(e) => Some(Err(Error::Database(e))),
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // Try each enabled method in turn; the first success wins. A method returning
        // None had no credentials to check.
        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        let mut auth_errors = Vec::new();
        let mut user = None;

        if state.config.auth.native.enabled {
            match try_jwt_session_auth(parts, state, &mut conn).await {
                Some(Ok(found)) => {
                    debug!("Found JWT session authenticated user: {}", found.id);
                    user = Some(found);
                }
                Some(Err(e)) => {
                    trace!("JWT session authentication failed: {:?}", e);
                    auth_errors.push(("JWT session", e));
                }
                None => trace!("No JWT session authentication attempted"),
            }
        }

        if user.is_none() && state.config.auth.proxy_header.enabled {
            match try_proxy_header_auth(parts, state, &mut conn).await {
                Some(Ok(found)) => {
                    debug!("Found proxy header authenticated user: {}", found.id);
                    user = Some(found);
                }
                Some(Err(e)) => {
                    trace!("Proxy header authentication failed: {:?}", e);
                    auth_errors.push(("Proxy header", e));
                }
                None => trace!("No proxy header authentication attempted"),
            }
        }

        let Some(user) = user else {
            // Surface server-side failures instead of masking them as 401s
            if let Some(index) = auth_errors.iter().position(|(_, e)| e.status_code().is_server_error()) {
                return Err(auth_errors.swap_remove(index).1);
            }
            trace!("All authentication attempts failed ({}): {:?}", auth_errors.len(), auth_errors);
            return Err(Error::Unauthenticated { message: None });
        };

        let membership = Organizations::new(&mut conn).membership_for_user(user.id).await?;
        Ok(CurrentUser::new(&user, membership.as_ref()))
    }
}
