//! Database record models matching table schemas.
//!
//! Models derive `sqlx::FromRow` for query results and are kept separate from the API
//! models in [`crate::api::models`] so storage and wire representations can evolve
//! independently. Enums stored as TEXT derive `sqlx::Type` and are shared with the API.
//!
//! - [`users`]: User accounts
//! - [`organizations`]: Tenants, memberships, approval status
//! - [`invitations`]: Pending team invitations
//! - [`customers`]: CRM customer records
//! - [`credits`]: Credit ledger transactions
//! - [`auto_recharge`]: Auto-recharge settings and the attempt journal
//! - [`documents`]: Uploaded verification documents
//! - [`approvals`]: Review decision history
//! - [`communications`]: SMS, email and call log plus voice agents

pub mod approvals;
pub mod auto_recharge;
pub mod communications;
pub mod credits;
pub mod customers;
pub mod documents;
pub mod invitations;
pub mod organizations;
pub mod users;
