//! Payment provider abstraction layer
//!
//! This module defines the `PaymentProvider` trait which abstracts the card vaulting and
//! off-session charging used by credit purchases and auto-recharge. Fulfilment (crediting
//! the ledger) happens in [`crate::billing`]; providers only talk to the vendor.

use async_trait::async_trait;
use axum::http::HeaderMap;
use std::collections::BTreeMap;

use crate::{
    config::PaymentConfig,
    db::errors::DbError,
    types::OrganizationId,
};

pub mod dummy;
pub mod stripe;

/// Create a payment provider from configuration
///
/// This is the single point where we convert config into provider instances.
/// Adding a new provider requires adding a match arm here.
pub fn create_provider(config: PaymentConfig) -> Box<dyn PaymentProvider> {
    match config {
        PaymentConfig::Stripe(stripe_config) => Box::new(stripe::StripeProvider::new(stripe_config)),
        PaymentConfig::Dummy(dummy_config) => Box::new(dummy::DummyProvider::from(dummy_config)),
    }
}

/// Result type for payment provider operations
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Errors that can occur during payment processing
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// The card or bank refused the charge
    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Invalid payment data: {0}")]
    InvalidData(String),

    #[error("Organization does not have a payment provider customer ID")]
    NoCustomerId,

    #[error("Webhook signature verification failed")]
    InvalidSignature,

    #[error("Payment already processed")]
    AlreadyProcessed,

    #[error("Payment provider API error: {0}")]
    ProviderApi(String),

    #[error("Database error: {0}")]
    Database(DbError),
}

impl From<DbError> for PaymentError {
    fn from(err: DbError) -> Self {
        // A repeated ledger reference means this charge was already credited
        if err.is_duplicate_reference() {
            PaymentError::AlreadyProcessed
        } else {
            PaymentError::Database(err)
        }
    }
}

impl From<sqlx::Error> for PaymentError {
    fn from(err: sqlx::Error) -> Self {
        PaymentError::from(DbError::from(err))
    }
}

/// Client-side handle for collecting card details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupIntent {
    pub id: String,
    pub client_secret: String,
}

/// A saved card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMethod {
    pub id: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<u32>,
}

/// An off-session charge against a saved payment method
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub customer_id: String,
    pub payment_method_id: String,
    pub amount_cents: i64,
    pub currency: String,
    /// Repeating a request with the same key returns the original charge
    pub idempotency_key: String,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeStatus {
    Succeeded,
    /// Accepted but not settled (e.g. awaiting authentication); credited via webhook
    Processing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub id: String,
    pub status: ChargeStatus,
    pub amount_cents: i64,
}

/// Metadata keys attached to every charge so webhooks can be fulfilled
pub const METADATA_ORGANIZATION_ID: &str = "organization_id";
pub const METADATA_PACKAGE_ID: &str = "package_id";
pub const METADATA_SOURCE: &str = "source";

/// Represents a webhook event from a payment provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    /// A charge settled; credit the ledger if not done yet
    PaymentSucceeded {
        charge_id: String,
        organization_id: OrganizationId,
        package_id: String,
        /// `auto_recharge` or `purchase`
        source: Option<String>,
    },
    PaymentFailed {
        charge_id: String,
        organization_id: Option<OrganizationId>,
        reason: Option<String>,
    },
    /// Recognised signature but an event type we do not act on
    Ignored { event_type: String },
}

/// Abstract payment provider interface
///
/// Implementors provide payment processing capabilities for different providers.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a customer record for an organization and return its provider id
    async fn create_customer(&self, organization_id: OrganizationId, name: &str, email: &str) -> Result<String>;

    /// Start collecting a card for later off-session use
    async fn create_setup_intent(&self, customer_id: &str) -> Result<SetupIntent>;

    async fn list_payment_methods(&self, customer_id: &str) -> Result<Vec<PaymentMethod>>;

    async fn detach_payment_method(&self, payment_method_id: &str) -> Result<()>;

    /// Charge a saved payment method without the customer present
    async fn charge(&self, request: &ChargeRequest) -> Result<Charge>;

    /// Validate and extract webhook event from raw request data
    ///
    /// Returns None if this provider doesn't support webhooks.
    /// Returns Err if validation fails (invalid signature, malformed data, etc.)
    async fn validate_webhook(&self, headers: &HeaderMap, body: &str) -> Result<Option<WebhookEvent>>;
}
