use axum::{Json, extract::State, http::StatusCode};

use crate::{
    AppState,
    api::{
        handlers::organization::schema_name_for,
        models::{
            auth::{AuthResponse, AuthSuccessResponse, LoginRequest, LoginResponse, LogoutResponse, RegisterRequest, RegisterResponse, WithSessionCookie},
            organizations::OrganizationResponse,
            users::UserResponse,
        },
    },
    auth::{password, session},
    db::{
        handlers::{Credits, Organizations, Users},
        models::{
            credits::{CreditTransactionCreateDBRequest, CreditTransactionType},
            organizations::{MemberRole, OrganizationCreateDBRequest},
            users::UserCreateDBRequest,
        },
    },
    errors::Error,
};

/// Ledger reference of the one-off signup bonus
const SIGNUP_BONUS_REFERENCE: &str = "signup_bonus";

fn invalid_credentials() -> Error {
    Error::Unauthenticated {
        message: Some("Invalid email or password".to_string()),
    }
}

/// Sign up: creates the user, a pending organization they own, and the signup bonus
#[utoipa::path(
    post,
    path = "/authentication/register",
    request_body = RegisterRequest,
    tag = "authentication",
    responses(
        (status = 201, description = "User and organization registered", body = AuthResponse),
        (status = 400, description = "Invalid input or registration disabled"),
        (status = 409, description = "User already exists"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<RegisterResponse, Error> {
    let native = &state.config.auth.native;
    if !native.enabled {
        return Err(Error::BadRequest {
            message: "Native authentication is disabled".to_string(),
        });
    }
    if !native.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    let email = request.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(Error::BadRequest {
            message: "A valid email address is required".to_string(),
        });
    }
    let organization_name = request.organization_name.trim().to_string();
    if organization_name.is_empty() {
        return Err(Error::BadRequest {
            message: "Organization name is required".to_string(),
        });
    }
    password::validate_password(&request.password, &native.password)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    if Users::new(&mut tx).get_user_by_email(&email).await?.is_some() {
        return Err(Error::Conflict {
            message: "An account with this email address already exists".to_string(),
        });
    }

    // Hash the password on a blocking thread to avoid blocking async runtime
    let params = password::Argon2Params::from(&native.password);
    let input = request.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&input, params))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password hashing task: {e}"),
        })??;

    let user = Users::new(&mut tx)
        .create(&UserCreateDBRequest {
            email,
            display_name: request.display_name,
            password_hash: Some(password_hash),
            is_super_admin: false,
            auth_source: "native".to_string(),
        })
        .await?;

    let mut organizations = Organizations::new(&mut tx);
    let organization = organizations
        .create(&OrganizationCreateDBRequest {
            schema_name: schema_name_for(&organization_name),
            name: organization_name,
            industry: request.industry,
            phone: request.phone,
            website: request.website,
        })
        .await?;
    organizations.add_member(organization.id, user.id, MemberRole::Owner).await?;

    let bonus = state.config.credits.signup_bonus;
    if bonus > rust_decimal::Decimal::ZERO {
        Credits::new(&mut tx)
            .create_transaction(
                &CreditTransactionCreateDBRequest::new(organization.id, CreditTransactionType::SignupBonus, bonus)
                    .with_description("Signup bonus")
                    .with_reference(SIGNUP_BONUS_REFERENCE),
            )
            .await?;
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    tracing::info!(organization_id = %organization.id, user_id = %user.id, "Registered organization");

    let token = session::create_session_token(user.id, &user.email, &state.config)?;
    Ok(WithSessionCookie {
        status: StatusCode::CREATED,
        cookie: session::session_cookie(&token, &state.config),
        body: AuthResponse {
            user: UserResponse::from(user),
            organization: Some(OrganizationResponse::from(organization)),
            message: "Registration successful".to_string(),
        },
    })
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/authentication/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<LoginResponse, Error> {
    if !state.config.auth.native.enabled {
        return Err(Error::BadRequest {
            message: "Native authentication is disabled".to_string(),
        });
    }
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let email = request.email.trim().to_lowercase();
    let user = Users::new(&mut pool_conn)
        .get_user_by_email(&email)
        .await?
        .ok_or_else(invalid_credentials)?;
    let hash = user.password_hash.clone().ok_or_else(invalid_credentials)?;

    // Verify password on a blocking thread to avoid blocking async runtime
    let input = request.password;
    let is_valid = tokio::task::spawn_blocking(move || password::verify_password(&input, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })??;
    if !is_valid {
        return Err(invalid_credentials());
    }

    Users::new(&mut pool_conn).record_login(user.id).await?;

    let mut organizations = Organizations::new(&mut pool_conn);
    let organization = match organizations.membership_for_user(user.id).await? {
        Some(membership) => organizations.get_by_id(membership.organization_id).await?,
        None => None,
    };

    let token = session::create_session_token(user.id, &user.email, &state.config)?;
    Ok(WithSessionCookie {
        status: StatusCode::OK,
        cookie: session::session_cookie(&token, &state.config),
        body: AuthResponse {
            user: UserResponse::from(user),
            organization: organization.map(OrganizationResponse::from),
            message: "Login successful".to_string(),
        },
    })
}

/// Logout (clear session)
#[utoipa::path(
    post,
    path = "/authentication/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Logout successful", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> Result<LogoutResponse, Error> {
    Ok(WithSessionCookie {
        status: StatusCode::OK,
        cookie: session::clear_session_cookie(&state.config),
        body: AuthSuccessResponse {
            message: "Logout successful".to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::models::organizations::ApprovalStatus,
        test_utils::{create_test_config, create_test_state},
    };
    use axum_test::TestServer;
    use rust_decimal::Decimal;
    use serde_json::json;
    use sqlx::PgPool;

    async fn auth_server(pool: PgPool, config: crate::config::Config) -> TestServer {
        let state = create_test_state(pool, config).await;
        let app = axum::Router::new()
            .route("/authentication/register", axum::routing::post(register))
            .route("/authentication/login", axum::routing::post(login))
            .route("/authentication/logout", axum::routing::post(logout))
            .with_state(state);
        TestServer::new(app).unwrap()
    }

    fn registration() -> serde_json::Value {
        json!({
            "email": "Founder@Example.com",
            "password": "password123",
            "display_name": "Founder",
            "organization_name": "Acme Dental",
            "industry": "healthcare"
        })
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_register_creates_pending_organization_with_bonus(pool: PgPool) {
        let server = auth_server(pool.clone(), create_test_config()).await;

        let response = server.post("/authentication/register").json(&registration()).await;
        response.assert_status(StatusCode::CREATED);
        assert!(response.headers().get("set-cookie").is_some());

        let body: AuthResponse = response.json();
        assert_eq!(body.user.email, "founder@example.com");
        let organization = body.organization.unwrap();
        assert_eq!(organization.name, "Acme Dental");
        assert_eq!(organization.approval_status, ApprovalStatus::Pending);
        assert!(organization.schema_name.starts_with("acme_dental_"));

        let mut conn = pool.acquire().await.unwrap();
        let membership = Organizations::new(&mut conn).membership_for_user(body.user.id).await.unwrap().unwrap();
        assert_eq!(membership.role, MemberRole::Owner);
        let balance = Credits::new(&mut conn).get_balance(organization.id).await.unwrap();
        assert_eq!(balance, Decimal::from(100));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_register_duplicate_email_conflicts(pool: PgPool) {
        let server = auth_server(pool, create_test_config()).await;

        server.post("/authentication/register").json(&registration()).await.assert_status(StatusCode::CREATED);
        let response = server.post("/authentication/register").json(&registration()).await;
        response.assert_status(StatusCode::CONFLICT);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_register_disabled(pool: PgPool) {
        let mut config = create_test_config();
        config.auth.native.allow_registration = false;
        let server = auth_server(pool, config).await;

        let response = server.post("/authentication/register").json(&registration()).await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_register_rejects_short_password(pool: PgPool) {
        let server = auth_server(pool, create_test_config()).await;

        let mut request = registration();
        request["password"] = json!("short");
        let response = server.post("/authentication/register").json(&request).await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_login_and_logout(pool: PgPool) {
        let server = auth_server(pool, create_test_config()).await;
        server.post("/authentication/register").json(&registration()).await.assert_status(StatusCode::CREATED);

        let response = server
            .post("/authentication/login")
            .json(&json!({"email": "founder@example.com", "password": "wrong-password"}))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        let response = server
            .post("/authentication/login")
            .json(&json!({"email": "founder@example.com", "password": "password123"}))
            .await;
        response.assert_status_ok();
        let cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap().to_string();
        assert!(cookie.starts_with("crm_session="));
        let body: AuthResponse = response.json();
        assert_eq!(body.organization.unwrap().name, "Acme Dental");

        let response = server.post("/authentication/logout").await;
        response.assert_status_ok();
        let cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }
}
