//! # crmctl: Control plane for a multi-tenant CRM
//!
//! `crmctl` runs the backend of a CRM platform where each business customer is an
//! organization (a tenant). Users sign up, land in an organization that a platform
//! super-admin has to approve, and then manage customer records, contact them over SMS,
//! email and voice AI, and pay for that usage from a prepaid credit balance.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for the HTTP layer
//! and uses PostgreSQL for all persistence.
//!
//! ### Request Flow
//!
//! A request to `/api/*` is authenticated by the [`auth`] extractors, either from the session
//! cookie issued at login or from a trusted proxy header. Each handler declares the permission
//! it needs; the caller's role in their organization decides whether they hold it, and
//! super-admins hold everything. Handlers then work through the repositories in
//! [`db::handlers`], scoping every query to the caller's organization.
//!
//! Anything that costs money goes through the credit ledger: the balance is only ever changed
//! by appending a ledger entry, and a debit that would overdraw is refused by the database.
//! Purchases and auto-recharge charges are credited with the payment provider's charge id as
//! the ledger reference, so the synchronous path and webhook redelivery cannot double-credit.
//!
//! ### Core Components
//!
//! - **API layer** ([`api`]): tenant routes under `/api`, super-admin routes under
//!   `/api/admin`, provider callbacks under `/webhooks`
//! - **Authentication** ([`auth`]): sessions, proxy headers and role-based permissions
//! - **Database** ([`db`]): repositories over a single PostgreSQL schema
//! - **Billing** ([`billing`]): purchases, webhook fulfilment and auto-recharge
//! - **Vendors**: payment providers and the telephony, voice and email delivery clients,
//!   each optional and configured independently
//!
//! **Background services** run alongside the HTTP server. When scheduled auto-recharge is
//! enabled, the replica holding a PostgreSQL advisory lock sweeps every tenant on an interval.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use crmctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = crmctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     crmctl::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     }).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod auth;
pub mod billing;
pub mod config;
pub mod db;
mod email;
pub mod errors;
pub mod integrations;
mod leader_election;
mod openapi;
pub mod payment_providers;
pub mod storage;
pub mod telemetry;
mod tenant_cleanup;
mod types;
mod webhooks;

#[cfg(test)]
pub mod test_utils;

use crate::{
    auth::password::{self, Argon2Params},
    billing::{AutoRecharger, scheduler::run_scheduler},
    config::CorsOrigin,
    db::handlers::Users,
    email::EmailService,
    errors::Error,
    integrations::{EmailDeliveryProvider, ResendClient, TelephonyProvider, TwilioClient, VapiClient, VoiceProvider},
    openapi::ApiDoc,
    payment_providers::PaymentProvider,
    storage::DocumentStorage,
};
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue},
    routing::{delete, get, patch, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{OrganizationId, UserId};

/// How often a replica tries to take, or confirms it still holds, leadership
const LEADER_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Multipart framing allowance on top of `documents.max_file_size`
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across all request handlers.
///
/// Vendor integrations are optional: a handler that needs one calls the matching
/// `require_*` method, which answers `503` when it is not configured.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .storage(storage)
///     .mailer(mailer)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub payment_provider: Option<Arc<dyn PaymentProvider>>,
    pub telephony: Option<Arc<dyn TelephonyProvider>>,
    pub voice: Option<Arc<dyn VoiceProvider>>,
    pub email_delivery: Option<Arc<dyn EmailDeliveryProvider>>,
    pub storage: Arc<dyn DocumentStorage>,
    pub mailer: Arc<EmailService>,
}

impl AppState {
    /// Build the state and every configured vendor client from config.
    pub async fn from_config(db: PgPool, config: Config) -> anyhow::Result<Self> {
        install_crypto_provider();
        let http = reqwest::Client::builder()
            .timeout(config.integrations.request_timeout)
            .build()?;

        let payment_provider: Option<Arc<dyn PaymentProvider>> = config
            .payment
            .clone()
            .map(|cfg| Arc::from(payment_providers::create_provider(cfg)));
        let telephony = config
            .integrations
            .telephony
            .as_ref()
            .map(|cfg| Arc::new(TwilioClient::new(cfg, http.clone())) as Arc<dyn TelephonyProvider>);
        let voice = config
            .integrations
            .voice
            .as_ref()
            .map(|cfg| Arc::new(VapiClient::new(cfg, http.clone())) as Arc<dyn VoiceProvider>);
        let email_delivery = config
            .integrations
            .email_delivery
            .as_ref()
            .map(|cfg| Arc::new(ResendClient::new(cfg, http.clone())) as Arc<dyn EmailDeliveryProvider>);

        let storage = storage::create_storage(&config.documents.storage).await;
        let mailer = Arc::new(EmailService::new(&config.email)?);

        Ok(Self::builder()
            .db(db)
            .config(config)
            .maybe_payment_provider(payment_provider)
            .maybe_telephony(telephony)
            .maybe_voice(voice)
            .maybe_email_delivery(email_delivery)
            .storage(storage)
            .mailer(mailer)
            .build())
    }

    pub fn require_payments(&self) -> Result<Arc<dyn PaymentProvider>, Error> {
        self.payment_provider.clone().ok_or_else(|| Error::NotConfigured {
            feature: "Payments".to_string(),
        })
    }

    pub fn require_telephony(&self) -> Result<Arc<dyn TelephonyProvider>, Error> {
        self.telephony.clone().ok_or_else(|| Error::NotConfigured {
            feature: "SMS".to_string(),
        })
    }

    pub fn require_voice(&self) -> Result<Arc<dyn VoiceProvider>, Error> {
        self.voice.clone().ok_or_else(|| Error::NotConfigured {
            feature: "Voice".to_string(),
        })
    }

    pub fn require_email_delivery(&self) -> Result<Arc<dyn EmailDeliveryProvider>, Error> {
        self.email_delivery.clone().ok_or_else(|| Error::NotConfigured {
            feature: "Email delivery".to_string(),
        })
    }

    pub fn auto_recharger(&self) -> Result<AutoRecharger, Error> {
        Ok(AutoRecharger::new(
            self.db.clone(),
            self.require_payments()?,
            self.config.credits.packages.clone(),
        ))
    }
}

/// Install the process-wide rustls provider used by outbound HTTPS clients.
/// Safe to call more than once.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Get the crmctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the platform super-admin, or promote an existing account.
///
/// Idempotent: an existing user keeps their id, gains super-admin rights, and has their
/// password replaced only when one is given.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(
    email: &str,
    password: Option<&str>,
    params: Argon2Params,
    db: &PgPool,
) -> anyhow::Result<UserId> {
    let password_hash = match password {
        Some(pwd) => {
            let pwd = pwd.to_string();
            let hash = tokio::task::spawn_blocking(move || password::hash_password(&pwd, params)).await??;
            Some(hash)
        }
        None => None,
    };

    let mut conn = db.acquire().await?;
    let id = Users::new(&mut conn).upsert_super_admin(email, password_hash.as_deref()).await?;
    Ok(id)
}

/// Connect to PostgreSQL and bring the schema up to date
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(config.database.acquire_timeout)
        .connect(&config.database.url)
        .await?;
    migrator().run(&pool).await?;
    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.auth.security.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(config.auth.security.cors.allow_credentials)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::PATCH,
            http::Method::DELETE,
        ])
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = config.auth.security.cors.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router with all endpoints and middleware.
///
/// - `/authentication/*`: registration, login, logout
/// - `/api/*`: tenant routes, with `/api/admin/*` for super-admins
/// - `/webhooks/*`: payment and voice provider callbacks
/// - `/docs` and `/api-docs/openapi.json`: API reference
/// - `/internal/metrics`: Prometheus metrics, when enabled
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let auth_routes = Router::new()
        .route("/authentication/register", post(api::handlers::auth::register))
        .route("/authentication/login", post(api::handlers::auth::login))
        .route("/authentication/logout", post(api::handlers::auth::logout))
        .with_state(state.clone());

    // Document uploads get their own body limit; other routes keep the default
    let upload_limit = usize::try_from(state.config.documents.max_file_size)?.saturating_add(MULTIPART_OVERHEAD);
    let upload_router = Router::new().route(
        "/documents",
        post(api::handlers::documents::upload_document).layer(DefaultBodyLimit::max(upload_limit)),
    );

    let api_routes = Router::new()
        .route("/users/current", get(api::handlers::users::get_current_user))
        // Organization and team
        .route(
            "/organization",
            get(api::handlers::organization::get_organization)
                .put(api::handlers::organization::update_organization)
                .delete(api::handlers::organization::delete_organization),
        )
        .route("/organization/integrations", post(api::handlers::organization::provision_integrations))
        .route("/organization/members", get(api::handlers::organization::list_members))
        .route(
            "/organization/members/{user_id}",
            patch(api::handlers::organization::update_member_role).delete(api::handlers::organization::remove_member),
        )
        .route(
            "/invitations",
            get(api::handlers::invitations::list_invitations).post(api::handlers::invitations::create_invitation),
        )
        .route("/invitations/accept", post(api::handlers::invitations::accept_invitation))
        .route("/invitations/{id}", delete(api::handlers::invitations::revoke_invitation))
        // Customers
        .route(
            "/customers",
            get(api::handlers::customers::list_customers).post(api::handlers::customers::create_customer),
        )
        .route(
            "/customers/{id}",
            get(api::handlers::customers::get_customer)
                .patch(api::handlers::customers::update_customer)
                .delete(api::handlers::customers::delete_customer),
        )
        // Credits and billing
        .route("/credits", get(api::handlers::credits::get_balance))
        .route("/credits/transactions", get(api::handlers::credits::list_transactions))
        .route("/credits/packages", get(api::handlers::credits::list_packages))
        .route("/credits/purchase", post(api::handlers::credits::purchase_credits))
        .route(
            "/credits/auto-recharge",
            get(api::handlers::credits::get_auto_recharge).put(api::handlers::credits::update_auto_recharge),
        )
        .route("/credits/auto-recharge/trigger", post(api::handlers::credits::trigger_auto_recharge))
        .route("/cron/auto-recharge", post(api::handlers::cron::run_auto_recharge))
        .route("/stripe/setup-intent", post(api::handlers::stripe::create_setup_intent))
        .route("/stripe/payment-methods", get(api::handlers::stripe::list_payment_methods))
        .route("/stripe/payment-methods/{id}", delete(api::handlers::stripe::detach_payment_method))
        // Verification documents
        .merge(upload_router)
        .route("/documents", get(api::handlers::documents::list_documents))
        .route(
            "/documents/{id}",
            get(api::handlers::documents::get_document).delete(api::handlers::documents::delete_document),
        )
        // Channels
        .route(
            "/voice/agents",
            get(api::handlers::voice::list_voice_agents).post(api::handlers::voice::create_voice_agent),
        )
        .route("/voice/agents/{id}", delete(api::handlers::voice::delete_voice_agent))
        .route("/communications", get(api::handlers::communications::list_communications))
        .route("/communications/sms", post(api::handlers::communications::send_sms))
        .route("/communications/email", post(api::handlers::communications::send_email));

    let admin_routes = Router::new()
        .route("/organizations", get(api::handlers::admin::list_organizations))
        .route("/organizations/{id}", get(api::handlers::admin::get_organization))
        .route("/organizations/{id}/review", post(api::handlers::admin::review_organization))
        .route("/organizations/{id}/approvals", get(api::handlers::admin::list_approvals))
        .route("/organizations/{id}/credits", post(api::handlers::admin::adjust_credits))
        .route(
            "/organizations/{id}/credits/reconciliation",
            get(api::handlers::admin::reconcile_credits),
        )
        .route("/documents", get(api::handlers::admin::list_documents))
        .route("/documents/{id}/content", get(api::handlers::admin::get_document_content))
        .route("/documents/{id}/review", post(api::handlers::admin::review_document));

    let api_routes_with_state = api_routes.nest("/admin", admin_routes).with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        // Provider callbacks authenticate with signatures, not sessions
        .route("/webhooks/payments", post(api::handlers::webhooks::payment_webhook))
        .route("/webhooks/voice", post(api::handlers::webhooks::voice_webhook))
        .with_state(state.clone())
        .merge(auth_routes)
        .nest("/api", api_routes_with_state)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let mut router = router.layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Container for background services and their lifecycle management.
///
/// Holds the scheduled auto-recharge sweep and the leader election task that gates it.
/// When dropped, the `drop_guard` cancels the shutdown token, signaling all tasks to stop.
pub struct BackgroundServices {
    is_leader: Arc<AtomicBool>,
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<tokio_util::sync::DropGuard>,
}

impl BackgroundServices {
    /// Whether this replica currently runs leader-only work
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// Start the auto-recharge scheduler, directly or behind leader election
fn setup_background_services(state: &AppState, shutdown_token: CancellationToken) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();
    let scheduler = &state.config.auto_recharge.scheduler;
    let leader_election = state.config.background_services.leader_election.enabled;
    let is_leader = Arc::new(AtomicBool::new(!leader_election));

    if !scheduler.enabled {
        info!("Scheduled auto-recharge disabled");
    } else if state.payment_provider.is_none() {
        tracing::warn!("Scheduled auto-recharge is enabled but no payment provider is configured; not starting it");
    } else if !leader_election {
        info!("Launching without leader election: running as leader");
        match state.auto_recharger() {
            Ok(recharger) => {
                background_tasks.push(tokio::spawn(run_scheduler(recharger, scheduler.interval, shutdown_token.clone())));
            }
            Err(e) => tracing::error!("Could not start auto-recharge scheduler: {}", e),
        }
    } else {
        info!("Starting leader election - will attempt to acquire leadership");
        let interval = scheduler.interval;

        // Cancelled when this replica loses leadership
        let session: Arc<tokio::sync::Mutex<Option<CancellationToken>>> = Arc::new(tokio::sync::Mutex::new(None));
        let session_gain = session.clone();
        let session_lose = session.clone();
        let state_gain = state.clone();
        let parent_token = shutdown_token.clone();

        background_tasks.push(tokio::spawn(leader_election::leader_election_task(
            state.db.clone(),
            is_leader.clone(),
            leader_election::LEADER_LOCK_ID,
            LEADER_CHECK_INTERVAL,
            shutdown_token.clone(),
            move || {
                let session = session_gain.clone();
                let state = state_gain.clone();
                let session_token = parent_token.child_token();
                async move {
                    match state.auto_recharger() {
                        Ok(recharger) => {
                            *session.lock().await = Some(session_token.clone());
                            tokio::spawn(run_scheduler(recharger, interval, session_token));
                            info!("Auto-recharge scheduler started on elected leader");
                        }
                        Err(e) => tracing::error!("Could not start auto-recharge scheduler: {}", e),
                    }
                }
            },
            move || {
                let session = session_lose.clone();
                async move {
                    if let Some(token) = session.lock().await.take() {
                        token.cancel();
                        info!("Auto-recharge scheduler stopped (lost leadership)");
                    }
                }
            },
        )));
    }

    BackgroundServices {
        is_leader,
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

/// Main application struct that owns all resources and lifecycle.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] connects to the database, runs migrations, ensures the
///    super-admin exists, builds vendor clients and starts background services
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal is received, gracefully stops all services
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Create the application on an existing pool, or connect using `config.database` when `None`
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        debug!("Starting crmctl with configuration: {:#?}", config);

        let pool = match pool {
            Some(pool) => {
                migrator().run(&pool).await?;
                pool
            }
            None => setup_database(&config).await?,
        };

        let params = Argon2Params::from(&config.auth.native.password);
        create_initial_admin_user(&config.admin_email, config.admin_password.as_deref(), params, &pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create initial admin user: {}", e))?;

        let app_state = AppState::from_config(pool.clone(), config.clone()).await?;
        let bg_services = setup_background_services(&app_state, CancellationToken::new());
        let router = build_router(&app_state)?;

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("crmctl listening on http://{}", bind_addr);

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::AutoRechargeSchedulerConfig,
        db::{
            handlers::{AutoRecharge, Credits, Organizations},
            models::{auto_recharge::AutoRechargeSettingsUpsertDBRequest, organizations::OrganizationIntegrationsUpdate},
        },
        payment_providers::dummy::DUMMY_PAYMENT_METHOD,
        test_utils::*,
    };
    use axum::http::StatusCode;
    use rust_decimal::Decimal;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_initial_admin_user_new_user(pool: PgPool) {
        let id = create_initial_admin_user("root@example.com", Some("hunter2hunter2"), Argon2Params::default(), &pool)
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let user = Users::new(&mut conn).get_by_id(id).await.unwrap().unwrap();
        assert!(user.is_super_admin);
        assert!(password::verify_password("hunter2hunter2", user.password_hash.as_deref().unwrap()).unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_initial_admin_user_existing_user(pool: PgPool) {
        let existing = create_test_user(&pool, "ops@example.com").await;
        assert!(!existing.is_super_admin);

        let id = create_initial_admin_user("ops@example.com", None, Argon2Params::default(), &pool).await.unwrap();
        assert_eq!(id, existing.id);

        let mut conn = pool.acquire().await.unwrap();
        let user = Users::new(&mut conn).get_by_id(id).await.unwrap().unwrap();
        assert!(user.is_super_admin);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_health_and_openapi(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool).await;

        app.get("/healthz").await.assert_status_ok();

        let doc: serde_json::Value = app.get("/api-docs/openapi.json").await.json();
        assert_eq!(doc["info"]["title"], "CRM API");
        assert!(doc["paths"]["/api/credits"].is_object());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_build_router_with_metrics_enabled(pool: PgPool) {
        let mut config = create_test_config();
        config.enable_metrics = true;
        let (app, _bg_services) = create_test_app_with_config(pool, config).await;

        app.get("/healthz").await.assert_status_ok();
        app.get("/internal/metrics").await.assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_build_router_with_metrics_disabled(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool).await;
        app.get("/internal/metrics").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_missing_integrations_are_reported(pool: PgPool) {
        let mut config = create_test_config();
        config.payment = None;
        let state = create_test_state(pool, config).await;

        assert!(matches!(state.require_payments(), Err(Error::NotConfigured { .. })));
        assert!(matches!(state.require_telephony(), Err(Error::NotConfigured { .. })));
        assert!(matches!(state.require_voice(), Err(Error::NotConfigured { .. })));
        assert!(matches!(state.require_email_delivery(), Err(Error::NotConfigured { .. })));
        assert!(state.auto_recharger().is_err());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_scheduler_recharges_in_background(pool: PgPool) {
        let mut config = create_test_config();
        config.auto_recharge.scheduler = AutoRechargeSchedulerConfig {
            enabled: true,
            interval: Duration::from_millis(50),
        };

        let (org, _) = create_test_organization(&pool, "Scheduled").await;
        let mut conn = pool.acquire().await.unwrap();
        Organizations::new(&mut conn)
            .update_integrations(
                org.id,
                &OrganizationIntegrationsUpdate {
                    payment_customer_id: Some("dummy_cus_scheduled".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        AutoRecharge::new(&mut conn)
            .upsert_settings(
                org.id,
                &AutoRechargeSettingsUpsertDBRequest {
                    enabled: true,
                    minimum_balance: Decimal::from(10),
                    package_id: Some("starter".to_string()),
                    payment_method_id: Some(DUMMY_PAYMENT_METHOD.to_string()),
                },
            )
            .await
            .unwrap();

        let (_app, bg_services) = create_test_app_with_config(pool.clone(), config).await;
        assert!(bg_services.is_leader());

        let mut balance = Decimal::ZERO;
        for _ in 0..50 {
            balance = Credits::new(&mut conn).get_balance(org.id).await.unwrap();
            if balance > Decimal::ZERO {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(balance, Decimal::from(1_000));

        bg_services.shutdown().await;
    }
}
