//! API request and response data models.
//!
//! These types define the public HTTP contract. They are kept apart from the database
//! models in [`crate::db::models`] so the wire format and the storage layout can change
//! independently. Every model derives `utoipa::ToSchema` (or `IntoParams` for query
//! strings) and appears in the generated OpenAPI document.
//!
//! - [`auth`]: Registration, login and session cookies
//! - [`users`]: The authenticated caller
//! - [`organizations`]: Tenant profile, members and integrations
//! - [`invitations`]: Team invitations
//! - [`customers`]: CRM records
//! - [`credits`]: Balance, ledger, packages and auto-recharge
//! - [`payments`]: Card setup and saved payment methods
//! - [`documents`]: Verification documents and reviews
//! - [`voice`]: Voice agents and call reports
//! - [`communications`]: SMS and email sends and the communication log
//! - [`admin`]: Cross-tenant super-admin views
//! - [`pagination`]: Shared `skip`/`limit` parameters

pub mod admin;
pub mod auth;
pub mod communications;
pub mod credits;
pub mod customers;
pub mod documents;
pub mod invitations;
pub mod organizations;
pub mod pagination;
pub mod payments;
pub mod users;
pub mod voice;
