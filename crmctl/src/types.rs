//! Common type definitions and permission system types.
//!
//! # ID Types
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`UserId`]: User account identifier
//! - [`OrganizationId`]: Tenant identifier
//! - [`CustomerId`], [`InvitationId`], [`DocumentId`], [`VoiceAgentId`], [`CommunicationId`]
//!
//! # Permission System
//!
//! - [`Resource`]: What entity type is being accessed
//! - [`Operation`]: What action is being performed
//! - [`Permission`]: Authorization requirement combining resource and operation
//!
//! Operations come in two flavors:
//! - **All**: Unrestricted access across tenants (super-admin only)
//! - **Own**: Restricted to the caller's own organization
//!
//! ```ignore
//! use crmctl::types::{Permission, Resource, Operation};
//!
//! let required = Permission::Allow(Resource::Organizations, Operation::ReadAll);
//! ```

use std::fmt;
use uuid::Uuid;

pub type UserId = Uuid;
pub type OrganizationId = Uuid;
pub type CustomerId = Uuid;
pub type InvitationId = Uuid;
pub type DocumentId = Uuid;
pub type VoiceAgentId = Uuid;
pub type CommunicationId = Uuid;
pub type TransactionId = Uuid;
pub type AttemptId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

// *-All means unrestricted access, *-Own means restricted to the caller's organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAll,
    CreateOwn,
    ReadAll,
    ReadOwn,
    UpdateAll,
    UpdateOwn,
    DeleteAll,
    DeleteOwn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Organizations,
    Members,
    Invitations,
    Customers,
    Credits,
    PaymentMethods,
    Documents,
    Approvals,
    VoiceAgents,
    Communications,
    Integrations,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission {
    /// Simple permission: (Resource, Operation)
    Allow(Resource, Operation),
    /// Logical combinator
    Any(Vec<Permission>),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateAll | Operation::CreateOwn => write!(f, "Create"),
            Operation::ReadAll | Operation::ReadOwn => write!(f, "Read"),
            Operation::UpdateAll | Operation::UpdateOwn => write!(f, "Update"),
            Operation::DeleteAll | Operation::DeleteOwn => write!(f, "Delete"),
        }
    }
}

impl Operation {
    /// Whether this operation is unrestricted across tenants.
    pub fn is_all(&self) -> bool {
        matches!(
            self,
            Operation::CreateAll | Operation::ReadAll | Operation::UpdateAll | Operation::DeleteAll
        )
    }
}
