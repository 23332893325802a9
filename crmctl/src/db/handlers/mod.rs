//! Repository implementations for database access.
//!
//! Each repository wraps a `&mut PgConnection`, provides strongly-typed queries and
//! returns models from [`crate::db::models`]. Tenant-scoped lookups always take the
//! owning organization id.
//!
//! - [`Users`]: User accounts
//! - [`Organizations`]: Tenants and memberships
//! - [`Invitations`]: Team invitations
//! - [`Customers`]: CRM records (implements [`Repository`])
//! - [`Credits`]: Credit ledger
//! - [`AutoRecharge`]: Auto-recharge settings, attempts and check locks
//! - [`Documents`]: Verification documents
//! - [`Approvals`]: Review decision history
//! - [`Communications`] and [`VoiceAgents`]: Communication channels

pub mod approvals;
pub mod auto_recharge;
pub mod communications;
pub mod credits;
pub mod customers;
pub mod documents;
pub mod invitations;
pub mod organizations;
pub mod repository;
pub mod users;

pub use approvals::Approvals;
pub use auto_recharge::AutoRecharge;
pub use communications::{Communications, VoiceAgents};
pub use credits::Credits;
pub use customers::Customers;
pub use documents::Documents;
pub use invitations::Invitations;
pub use organizations::Organizations;
pub use repository::Repository;
pub use users::Users;
