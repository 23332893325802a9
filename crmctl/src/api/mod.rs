//! API layer for HTTP request handling and data models.
//!
//! This module contains the REST API implementation, organized into:
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! - **Authentication** (`/authentication/*`): Registration, login, logout
//! - **Tenant API** (`/api/*`): Organization, members, invitations, customers, credits,
//!   payment methods, documents, voice agents and communications
//! - **Super-admin** (`/api/admin/*`): Approvals, credit adjustments, document review
//! - **Webhooks** (`/webhooks/*`): Signed callbacks from the payment and voice providers
//!
//! # OpenAPI Documentation
//!
//! All endpoints are documented with OpenAPI/Swagger annotations using `utoipa`.
//! API documentation is available at `/docs` when the server is running.

pub mod handlers;
pub mod models;
