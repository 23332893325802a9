use crate::db::errors::DbError;
use crate::integrations::IntegrationError;
use crate::payment_providers::PaymentError;
use crate::storage::{DocumentRejection, StorageError};
use crate::types::{Operation, Permission};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// User lacks required permissions for the operation
    #[error("Insufficient permissions to {action:?} {resource}")]
    InsufficientPermissions {
        required: Permission,
        action: Operation,
        resource: String,
    },

    /// Caller is authenticated and permitted, but the organization may not use this feature yet
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Upload exceeds the configured size limit
    #[error("Payload too large: {message}")]
    PayloadTooLarge { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Ledger debit would take the balance below zero
    #[error("Insufficient credits")]
    InsufficientCredits,

    /// A third-party API call failed
    #[error("{service} request failed: {message}")]
    Upstream { service: String, message: String },

    /// Feature depends on an integration that is not configured
    #[error("{feature} is not configured")]
    NotConfigured { feature: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// Conflict error, e.g. a duplicate ledger reference
    #[error("Conflict: {message}")]
    Conflict { message: String },
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::InsufficientPermissions { .. } | Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            Error::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Error::NotConfigured { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::CheckViolation { .. } if db_err.is_insufficient_credits() => StatusCode::PAYMENT_REQUIRED,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } | DbError::InvalidAmount { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Conflict { .. } => StatusCode::CONFLICT,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::InsufficientPermissions { action, resource, .. } => {
                format!("Insufficient permissions to {action} {resource}")
            }
            Error::Forbidden { message } => message.clone(),
            Error::BadRequest { message } => message.clone(),
            Error::PayloadTooLarge { message } => message.clone(),
            Error::NotFound { resource, id } => {
                format!("{resource} with ID {id} not found")
            }
            Error::InsufficientCredits => "Insufficient credits".to_string(),
            Error::Upstream { service, .. } => format!("{service} is currently unavailable"),
            Error::NotConfigured { feature } => format!("{feature} is not available"),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::CheckViolation { .. } if db_err.is_insufficient_credits() => "Insufficient credits".to_string(),
                DbError::UniqueViolation { constraint, table, .. } => unique_violation_message(table.as_deref(), constraint.as_deref()).0,
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::InvalidAmount { .. } => format!(
                    "Credit amounts must be positive with at most {} decimal places",
                    crate::db::models::credits::CREDIT_SCALE
                ),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
            Error::Conflict { message } => message.clone(),
        }
    }
}

/// Map a unique constraint onto a user-facing message and the resource it concerns.
fn unique_violation_message(table: Option<&str>, constraint: Option<&str>) -> (String, &'static str) {
    match (table, constraint) {
        (Some("users"), Some(c)) if c.contains("email") => ("An account with this email address already exists".to_string(), "user"),
        (Some("organization_members"), _) => ("User already belongs to an organization".to_string(), "membership"),
        (Some("invitations"), _) => ("An open invitation for this email already exists".to_string(), "invitation"),
        (Some("credit_transactions"), _) => ("A transaction with this reference already exists".to_string(), "credit_transaction"),
        (Some("organizations"), _) => ("Organization already exists".to_string(), "organization"),
        _ => ("Resource already exists".to_string(), "unknown"),
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Upstream { .. } => {
                tracing::error!("Upstream service error: {}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::InsufficientPermissions { .. } | Error::Forbidden { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::NotConfigured { .. } => {
                tracing::info!("Unconfigured feature requested: {}", self);
            }
            Error::BadRequest { .. } | Error::PayloadTooLarge { .. } | Error::NotFound { .. } | Error::InsufficientCredits => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Conflict { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            Error::Database(DbError::UniqueViolation { constraint, table, .. }) => {
                let (message, resource) = unique_violation_message(table.as_deref(), constraint.as_deref());
                let body = json!({
                    "message": message,
                    "resource": resource
                });
                (status, axum::response::Json(body)).into_response()
            }
            _ => {
                let body = json!({ "message": self.user_message() });
                (status, axum::response::Json(body)).into_response()
            }
        }
    }
}

impl From<PaymentError> for Error {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Declined(message) => Error::BadRequest {
                message: format!("Payment declined: {message}"),
            },
            PaymentError::InvalidData(message) => Error::BadRequest { message },
            PaymentError::NoCustomerId => Error::BadRequest {
                message: "Organization has no billing account; add a payment method first".to_string(),
            },
            PaymentError::InvalidSignature => Error::BadRequest {
                message: "Invalid webhook signature".to_string(),
            },
            PaymentError::AlreadyProcessed => Error::Conflict {
                message: "Payment already processed".to_string(),
            },
            PaymentError::ProviderApi(message) => Error::Upstream {
                service: "Payment provider".to_string(),
                message,
            },
            PaymentError::Database(db) => Error::Database(db),
        }
    }
}

impl From<IntegrationError> for Error {
    fn from(err: IntegrationError) -> Self {
        match err {
            IntegrationError::NotConfigured(feature) => Error::NotConfigured { feature },
            IntegrationError::Rejected { service, message } => Error::BadRequest {
                message: format!("{service} rejected the request: {message}"),
            },
            IntegrationError::Api { service, message } => Error::Upstream { service, message },
            IntegrationError::Transport { service, source } => Error::Upstream {
                service,
                message: source.to_string(),
            },
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => Error::NotFound {
                resource: "Document".to_string(),
                id: key,
            },
            other => Error::Internal {
                operation: format!("access document storage: {other}"),
            },
        }
    }
}

impl From<DocumentRejection> for Error {
    fn from(err: DocumentRejection) -> Self {
        match err {
            DocumentRejection::TooLarge { .. } => Error::PayloadTooLarge { message: err.to_string() },
            other => Error::BadRequest { message: other.to_string() },
        }
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_for_billing_errors() {
        assert_eq!(Error::InsufficientCredits.status_code(), StatusCode::PAYMENT_REQUIRED);
        let overdraft = Error::Database(DbError::CheckViolation {
            constraint: Some("credit_balances_balance_non_negative".to_string()),
            table: Some("credit_balances".to_string()),
            message: "new row violates check constraint".to_string(),
        });
        assert_eq!(overdraft.status_code(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(overdraft.user_message(), "Insufficient credits");

        let other_check = Error::Database(DbError::CheckViolation {
            constraint: Some("customers_status_check".to_string()),
            table: Some("customers".to_string()),
            message: String::new(),
        });
        assert_eq!(other_check.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_integration_errors_map_to_gateway_statuses() {
        let err: Error = IntegrationError::NotConfigured("SMS".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err: Error = IntegrationError::Api {
            service: "Telephony".to_string(),
            message: "500 upstream exploded with secret detail".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(!err.user_message().contains("secret"));
    }

    #[test]
    fn test_internal_errors_do_not_leak() {
        let err = Error::Other(anyhow::anyhow!("connection string postgres://user:pw@host"));
        assert_eq!(err.user_message(), "Internal server error");
        let err = Error::Database(DbError::Other(anyhow::anyhow!("relation does not exist")));
        assert_eq!(err.user_message(), "Database error occurred");
    }
}
