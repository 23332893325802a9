//! Fixtures shared by the database and HTTP tests.

use axum_test::TestServer;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    AppState, BackgroundServices,
    config::{
        AuthConfig, Config, DocumentsConfig, DummyConfig, EmailConfig, EmailTransportConfig, LeaderElectionConfig, PaymentConfig,
        ProxyHeaderAuthConfig, SessionConfig, StorageConfig,
    },
    db::{
        handlers::{Organizations, Users},
        models::{
            organizations::{MemberRole, OrganizationCreateDBRequest, OrganizationDBResponse},
            users::{UserCreateDBRequest, UserDBResponse},
        },
    },
};

/// Header used by [`add_auth_headers`]; proxy header auth is enabled in [`create_test_config`]
pub const TEST_AUTH_HEADER: &str = "x-crm-user-email";

/// Config for tests: proxy header and native auth, dummy payments, files under a per-process temp dir.
pub fn create_test_config() -> Config {
    let scratch = std::env::temp_dir().join(format!("crmctl-test-{}", std::process::id()));

    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        admin_email: "admin@test.com".to_string(),
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        payment: Some(PaymentConfig::Dummy(DummyConfig::default())),
        auth: AuthConfig {
            proxy_header: ProxyHeaderAuthConfig {
                enabled: true,
                header_name: TEST_AUTH_HEADER.to_string(),
                auto_create_users: true,
            },
            native: crate::config::NativeAuthConfig {
                session: SessionConfig {
                    cookie_secure: false,
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        },
        documents: DocumentsConfig {
            storage: StorageConfig::Local {
                path: scratch.join("documents"),
            },
            ..Default::default()
        },
        email: EmailConfig {
            transport: EmailTransportConfig::File {
                path: scratch.join("emails").to_string_lossy().into_owned(),
            },
            ..Default::default()
        },
        background_services: crate::config::BackgroundServicesConfig {
            leader_election: LeaderElectionConfig { enabled: false },
        },
        enable_metrics: false,
        ..Default::default()
    }
}

/// Plain HTTP client for vendor client tests, with the TLS provider installed.
pub fn http_client() -> reqwest::Client {
    crate::install_crypto_provider();
    reqwest::Client::new()
}

pub async fn create_test_state(pool: PgPool, config: Config) -> AppState {
    AppState::from_config(pool, config).await.expect("Failed to build test state")
}

pub async fn create_test_app(pool: PgPool) -> (TestServer, BackgroundServices) {
    create_test_app_with_config(pool, create_test_config()).await
}

pub async fn create_test_app_with_config(pool: PgPool, config: Config) -> (TestServer, BackgroundServices) {
    let app = crate::Application::new_with_pool(config, Some(pool))
        .await
        .expect("Failed to create application");
    app.into_test_server()
}

pub async fn create_test_user(pool: &PgPool, email: &str) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            email: email.to_string(),
            display_name: None,
            password_hash: None,
            is_super_admin: false,
            auth_source: "test".to_string(),
        })
        .await
        .expect("Failed to create test user")
}

pub async fn create_test_super_admin(pool: &PgPool) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            email: format!("super-{}@example.com", Uuid::new_v4().simple()),
            display_name: Some("Super Admin".to_string()),
            password_hash: None,
            is_super_admin: true,
            auth_source: "test".to_string(),
        })
        .await
        .expect("Failed to create super admin")
}

/// Create a pending organization with an owner and no credits.
pub async fn create_test_organization(pool: &PgPool, name: &str) -> (OrganizationDBResponse, UserDBResponse) {
    let suffix = Uuid::new_v4().simple().to_string();
    let owner = create_test_user(pool, &format!("owner-{suffix}@example.com")).await;

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut organizations = Organizations::new(&mut conn);
    let org = organizations
        .create(&OrganizationCreateDBRequest {
            name: name.to_string(),
            schema_name: format!("org_{suffix}"),
            industry: None,
            phone: None,
            website: None,
        })
        .await
        .expect("Failed to create test organization");
    organizations
        .add_member(org.id, owner.id, MemberRole::Owner)
        .await
        .expect("Failed to add owner");

    (org, owner)
}

/// Add another user to an organization with the given role.
pub async fn add_test_member(pool: &PgPool, org: &OrganizationDBResponse, role: MemberRole) -> UserDBResponse {
    let user = create_test_user(pool, &format!("member-{}@example.com", Uuid::new_v4().simple())).await;
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Organizations::new(&mut conn)
        .add_member(org.id, user.id, role)
        .await
        .expect("Failed to add member");
    user
}

/// Mark an organization approved so messaging endpoints accept it.
pub async fn approve_test_organization(pool: &PgPool, org: &OrganizationDBResponse) -> OrganizationDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Organizations::new(&mut conn)
        .set_approval_status(org.id, crate::db::models::organizations::ApprovalStatus::Approved, None)
        .await
        .expect("Failed to approve organization")
}

pub fn add_auth_headers(user: &UserDBResponse) -> Vec<(String, String)> {
    vec![(TEST_AUTH_HEADER.to_string(), user.email.clone())]
}
