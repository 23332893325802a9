//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `CRMCTL_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `CRMCTL_` override YAML values
//! 3. **DATABASE_URL** - Special case: overrides `database.url` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `CRMCTL_PAYMENT__STRIPE__API_KEY=sk_live_...` sets `payment.stripe.api_key`.
//!
//! ## Integrations
//!
//! Every third-party integration is optional. A section that is absent disables the
//! feature and the matching endpoints answer `503 Service Unavailable`:
//!
//! - `payment` - card storage, purchases and auto-recharge charges
//! - `integrations.telephony` - SMS sending and per-tenant subaccounts
//! - `integrations.voice` - voice agents and call billing
//! - `integrations.email_delivery` - tenant email sending and sender domains

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::PathBuf, time::Duration};
use url::Url;

use crate::{db::models::credits::CREDIT_SCALE, errors::Error};

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "CRMCTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Base URL where the dashboard is accessible, used in invitation links
    pub dashboard_url: String,
    /// Set from the raw `DATABASE_URL` environment variable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    pub database: DatabaseConfig,
    /// Email address for the initial super-admin (created on first startup)
    pub admin_email: String,
    /// Password for the initial super-admin
    pub admin_password: Option<String>,
    /// Secret key for JWT signing (required when native auth is enabled)
    pub secret_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentConfig>,
    pub integrations: IntegrationsConfig,
    pub auth: AuthConfig,
    pub credits: CreditsConfig,
    pub auto_recharge: AutoRechargeConfig,
    pub documents: DocumentsConfig,
    pub invitations: InvitationsConfig,
    pub email: EmailConfig,
    pub background_services: BackgroundServicesConfig,
    /// Expose Prometheus metrics at `/internal/metrics`
    pub enable_metrics: bool,
    /// Export traces via OTLP
    pub enable_otel_export: bool,
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/crmctl".to_string(),
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Payment provider configuration.
///
/// Credentials should be set via environment variables, e.g.
/// `CRMCTL_PAYMENT__STRIPE__API_KEY` and `CRMCTL_PAYMENT__STRIPE__WEBHOOK_SECRET`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentConfig {
    Stripe(StripeConfig),
    /// Approves every charge locally; for development and tests
    Dummy(DummyConfig),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeConfig {
    /// Secret API key (starts with sk_)
    pub api_key: String,
    /// Webhook signing secret (starts with whsec_)
    pub webhook_secret: String,
    /// Maximum accepted age of a webhook signature timestamp
    #[serde(default = "StripeConfig::default_webhook_tolerance", with = "humantime_serde")]
    pub webhook_tolerance: Duration,
}

impl StripeConfig {
    fn default_webhook_tolerance() -> Duration {
        Duration::from_secs(300)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DummyConfig {
    /// Payment method ids ending in this suffix are declined
    #[serde(default)]
    pub decline_suffix: Option<String>,
    /// Shared secret for the `x-dummy-signature` webhook header
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

/// Third-party communication integrations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntegrationsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telephony: Option<TelephonyConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_delivery: Option<EmailDeliveryConfig>,
    /// Timeout applied to every outbound vendor request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            telephony: None,
            voice: None,
            email_delivery: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Telephony (subaccounts + SMS) vendor settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelephonyConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender used when an organization has no dedicated number
    pub default_from_number: String,
    #[serde(default = "TelephonyConfig::default_api_base")]
    pub api_base: Url,
}

impl TelephonyConfig {
    fn default_api_base() -> Url {
        Url::parse("https://api.twilio.com").expect("static URL is valid")
    }
}

/// Voice AI vendor settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VoiceConfig {
    pub api_key: String,
    /// Shared secret expected in the `x-vapi-secret` header of end-of-call reports
    pub webhook_secret: String,
    #[serde(default = "VoiceConfig::default_api_base")]
    pub api_base: Url,
}

impl VoiceConfig {
    fn default_api_base() -> Url {
        Url::parse("https://api.vapi.ai").expect("static URL is valid")
    }
}

/// Transactional email vendor settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailDeliveryConfig {
    pub api_key: String,
    /// Sender used when an organization has no verified domain
    pub default_from: String,
    #[serde(default = "EmailDeliveryConfig::default_api_base")]
    pub api_base: Url,
}

impl EmailDeliveryConfig {
    fn default_api_base() -> Url {
        Url::parse("https://api.resend.com").expect("static URL is valid")
    }
}

/// Authentication configuration for all supported auth methods.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Native email/password authentication
    pub native: NativeAuthConfig,
    /// Proxy header-based authentication (for SSO integration)
    pub proxy_header: ProxyHeaderAuthConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NativeAuthConfig {
    pub enabled: bool,
    /// Allow new organizations to sign up
    pub allow_registration: bool,
    pub password: PasswordConfig,
    pub session: SessionConfig,
}

impl Default for NativeAuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_registration: true,
            password: PasswordConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// Reads the caller's email from a header set by a trusted upstream proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyHeaderAuthConfig {
    pub enabled: bool,
    /// Header carrying the user's email address
    pub header_name: String,
    /// Create a user row on first sight of an unknown email
    pub auto_create_users: bool,
}

impl Default for ProxyHeaderAuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            header_name: "x-crm-user-email".to_string(),
            auto_create_users: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// Set Secure flag on cookies (HTTPS only)
    pub cookie_secure: bool,
    /// SameSite cookie attribute ("strict", "lax", or "none")
    pub cookie_same_site: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "crm_session".to_string(),
            cookie_secure: true,
            cookie_same_site: "strict".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub max_length: usize,
    /// Argon2 memory cost in KiB
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 64,
            argon2_memory_kib: 19456, // 19 MB
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    #[serde(with = "humantime_serde")]
    pub jwt_expiry: Duration,
    pub cors: CorsConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_expiry: Duration::from_secs(24 * 60 * 60),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Url(
                Url::parse("http://localhost:5173").expect("static URL is valid"),
            )],
            allow_credentials: true,
            max_age: Some(3600),
        }
    }
}

/// CORS origin specification: either `*` or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

/// A purchasable bundle of credits.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CreditPackage {
    pub id: String,
    pub name: String,
    pub credits: Decimal,
    /// Price in the smallest currency unit
    pub price_cents: i64,
    #[serde(default = "CreditPackage::default_currency")]
    pub currency: String,
}

impl CreditPackage {
    fn default_currency() -> String {
        "usd".to_string()
    }
}

/// Credit catalogue and per-channel usage rates.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreditsConfig {
    pub packages: Vec<CreditPackage>,
    /// Credits granted to a newly registered organization
    pub signup_bonus: Decimal,
    pub sms_cost: Decimal,
    pub email_cost: Decimal,
    /// Charged per started minute of a voice call
    pub voice_cost_per_minute: Decimal,
}

impl CreditsConfig {
    pub fn package(&self, id: &str) -> Option<&CreditPackage> {
        self.packages.iter().find(|p| p.id == id)
    }
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            packages: vec![
                CreditPackage {
                    id: "starter".to_string(),
                    name: "Starter".to_string(),
                    credits: Decimal::from(1_000),
                    price_cents: 1_000,
                    currency: "usd".to_string(),
                },
                CreditPackage {
                    id: "growth".to_string(),
                    name: "Growth".to_string(),
                    credits: Decimal::from(5_500),
                    price_cents: 5_000,
                    currency: "usd".to_string(),
                },
                CreditPackage {
                    id: "scale".to_string(),
                    name: "Scale".to_string(),
                    credits: Decimal::from(12_000),
                    price_cents: 10_000,
                    currency: "usd".to_string(),
                },
            ],
            signup_bonus: Decimal::from(100),
            sms_cost: Decimal::from(1),
            email_cost: Decimal::new(5, 1),
            voice_cost_per_minute: Decimal::from(10),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoRechargeConfig {
    /// Bearer secret for `POST /api/cron/auto-recharge`; the endpoint is disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_secret: Option<String>,
    pub scheduler: AutoRechargeSchedulerConfig,
}

/// In-process periodic check, run only on the elected leader.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoRechargeSchedulerConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for AutoRechargeSchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocumentsConfig {
    /// Maximum upload size in bytes
    pub max_file_size: u64,
    pub allowed_content_types: Vec<String>,
    pub storage: StorageConfig,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            allowed_content_types: vec![
                "application/pdf".to_string(),
                "image/png".to_string(),
                "image/jpeg".to_string(),
            ],
            storage: StorageConfig::default(),
        }
    }
}

/// Where uploaded document blobs are written.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    Local {
        path: PathBuf,
    },
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: Option<String>,
        /// Custom endpoint for S3-compatible stores
        #[serde(default)]
        endpoint: Option<String>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Local {
            path: PathBuf::from("./documents"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct InvitationsConfig {
    #[serde(with = "humantime_serde")]
    pub expiry: Duration,
}

impl Default for InvitationsConfig {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// System email (invitations, approval decisions).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
// Note: Cannot use deny_unknown_fields here due to #[serde(flatten)] on transport
pub struct EmailConfig {
    #[serde(flatten)]
    pub transport: EmailTransportConfig,
    pub from_email: String,
    pub from_name: String,
    pub reply_to: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            transport: EmailTransportConfig::default(),
            from_email: "noreply@example.com".to_string(),
            from_name: "CRM".to_string(),
            reply_to: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EmailTransportConfig {
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: String,
        use_tls: bool,
    },
    /// Write emails to files (for development/testing)
    File { path: String },
}

impl Default for EmailTransportConfig {
    fn default() -> Self {
        Self::File {
            path: "./emails".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackgroundServicesConfig {
    pub leader_election: LeaderElectionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeaderElectionConfig {
    /// When disabled, every replica behaves as leader
    pub enabled: bool,
}

impl Default for LeaderElectionConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            dashboard_url: "http://localhost:5173".to_string(),
            database_url: None,
            database: DatabaseConfig::default(),
            admin_email: "admin@example.com".to_string(),
            admin_password: None,
            secret_key: None,
            payment: None,
            integrations: IntegrationsConfig::default(),
            auth: AuthConfig::default(),
            credits: CreditsConfig::default(),
            auto_recharge: AutoRechargeConfig::default(),
            documents: DocumentsConfig::default(),
            invitations: InvitationsConfig::default(),
            email: EmailConfig::default(),
            background_services: BackgroundServicesConfig::default(),
            enable_metrics: true,
            enable_otel_export: false,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        if let Some(url) = config.database_url.take() {
            config.database.url = url;
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.auth.native.enabled {
            if self.secret_key.is_none() {
                return Err(Error::Internal {
                    operation: "Config validation: Native authentication is enabled but secret_key is not configured. \
                     Please set CRMCTL_SECRET_KEY environment variable or add secret_key to config file."
                        .to_string(),
                });
            }

            if self.auth.native.password.min_length > self.auth.native.password.max_length {
                return Err(Error::Internal {
                    operation: format!(
                        "Config validation: Invalid password configuration: min_length ({}) cannot be greater than max_length ({})",
                        self.auth.native.password.min_length, self.auth.native.password.max_length
                    ),
                });
            }

            if self.auth.native.password.min_length < 1 {
                return Err(Error::Internal {
                    operation: "Config validation: Invalid password configuration: min_length must be at least 1".to_string(),
                });
            }
        }

        if !self.auth.native.enabled && !self.auth.proxy_header.enabled {
            return Err(Error::Internal {
                operation:
                    "Config validation: No authentication methods are enabled. Please enable either native or proxy_header authentication."
                        .to_string(),
            });
        }

        if self.auth.security.jwt_expiry.as_secs() < 300 {
            return Err(Error::Internal {
                operation: "Config validation: JWT expiry duration is too short (minimum 5 minutes)".to_string(),
            });
        }

        let has_wildcard = self
            .auth
            .security
            .cors
            .allowed_origins
            .iter()
            .any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.auth.security.cors.allow_credentials {
            return Err(Error::Internal {
                operation: "Config validation: CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins."
                    .to_string(),
            });
        }

        let mut seen = HashSet::new();
        for package in &self.credits.packages {
            if !seen.insert(package.id.as_str()) {
                return Err(Error::Internal {
                    operation: format!("Config validation: duplicate credit package id '{}'", package.id),
                });
            }
            if package.credits.normalize().scale() > CREDIT_SCALE {
                return Err(Error::Internal {
                    operation: format!(
                        "Config validation: credit package '{}' has more than {CREDIT_SCALE} decimal places",
                        package.id
                    ),
                });
            }
            if package.credits <= Decimal::ZERO || package.price_cents <= 0 {
                return Err(Error::Internal {
                    operation: format!(
                        "Config validation: credit package '{}' must have positive credits and price",
                        package.id
                    ),
                });
            }
        }

        for (name, rate) in [
            ("sms_cost", self.credits.sms_cost),
            ("email_cost", self.credits.email_cost),
            ("voice_cost_per_minute", self.credits.voice_cost_per_minute),
            ("signup_bonus", self.credits.signup_bonus),
        ] {
            if rate < Decimal::ZERO {
                return Err(Error::Internal {
                    operation: format!("Config validation: credits.{name} cannot be negative"),
                });
            }
            if rate.normalize().scale() > CREDIT_SCALE {
                return Err(Error::Internal {
                    operation: format!("Config validation: credits.{name} has more than {CREDIT_SCALE} decimal places"),
                });
            }
        }

        if self.auto_recharge.scheduler.enabled && self.auto_recharge.scheduler.interval.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: auto_recharge.scheduler.interval must be greater than zero".to_string(),
            });
        }

        if self.auto_recharge.cron_secret.as_ref().is_some_and(|s| s.len() < 16) {
            return Err(Error::Internal {
                operation: "Config validation: auto_recharge.cron_secret must be at least 16 characters".to_string(),
            });
        }

        if self.documents.max_file_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: documents.max_file_size cannot be 0".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("CRMCTL_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database_url".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
