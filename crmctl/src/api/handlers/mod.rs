//! HTTP request handlers for all API endpoints.
//!
//! Handlers are grouped by resource. Each one declares the permission it needs
//! through [`crate::auth::permissions::RequiresPermission`], works against the
//! repositories in [`crate::db::handlers`], and returns [`crate::errors::Error`]
//! on failure, which renders as a JSON error with the matching status code.
//!
//! # Handler Modules
//!
//! - [`admin`]: Super-admin approvals, credit adjustments and the document queue
//! - [`auth`]: Registration, login and logout
//! - [`communications`]: Outbound SMS and email, and the communication log
//! - [`credits`]: Balance, ledger, package purchases and auto-recharge settings
//! - [`cron`]: Scheduler-driven auto-recharge sweep
//! - [`customers`]: Tenant customer records
//! - [`documents`]: Verification document uploads
//! - [`invitations`]: Team invitations and acceptance
//! - [`organization`]: The caller's organization, its members and integrations
//! - [`stripe`]: Saved cards
//! - [`users`]: The current user
//! - [`voice`]: Voice agents
//! - [`webhooks`]: Inbound payment and voice provider callbacks

pub mod admin;
pub mod auth;
pub mod communications;
pub mod credits;
pub mod cron;
pub mod customers;
pub mod documents;
pub mod invitations;
pub mod organization;
pub mod stripe;
pub mod users;
pub mod voice;
pub mod webhooks;
