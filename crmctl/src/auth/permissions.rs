//! Role-based access control.
//!
//! Super-admins hold every permission. Everyone else gets `*Own` permissions through
//! their tenant role; a user without an organization holds none.
//!
//! Handlers declare what they need with the [`RequiresPermission`] extractor:
//!
//! ```ignore
//! async fn list_customers(
//!     current_user: RequiresPermission<resource::Customers, operation::ReadOwn>,
//! ) -> Result<Json<Vec<CustomerResponse>>> { ... }
//! ```

use std::marker::PhantomData;
use std::ops::Deref;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    AppState,
    api::models::users::CurrentUser,
    db::models::organizations::MemberRole,
    errors::Error,
    types::{Operation, Permission, Resource},
};

/// Permissions granted to members of every role
const MEMBER_PERMISSIONS: &[(Resource, Operation)] = &[
    (Resource::Organizations, Operation::ReadOwn),
    (Resource::Members, Operation::ReadOwn),
    (Resource::Customers, Operation::ReadOwn),
    (Resource::Customers, Operation::CreateOwn),
    (Resource::Customers, Operation::UpdateOwn),
    (Resource::Customers, Operation::DeleteOwn),
    (Resource::Credits, Operation::ReadOwn),
    (Resource::Documents, Operation::ReadOwn),
    (Resource::VoiceAgents, Operation::ReadOwn),
    (Resource::Communications, Operation::ReadOwn),
    (Resource::Communications, Operation::CreateOwn),
];

/// Extra permissions for tenant admins
const ADMIN_PERMISSIONS: &[(Resource, Operation)] = &[
    (Resource::Organizations, Operation::UpdateOwn),
    (Resource::Members, Operation::UpdateOwn),
    (Resource::Members, Operation::DeleteOwn),
    (Resource::Invitations, Operation::ReadOwn),
    (Resource::Invitations, Operation::CreateOwn),
    (Resource::Invitations, Operation::DeleteOwn),
    (Resource::Credits, Operation::CreateOwn),
    (Resource::Credits, Operation::UpdateOwn),
    (Resource::PaymentMethods, Operation::ReadOwn),
    (Resource::PaymentMethods, Operation::CreateOwn),
    (Resource::PaymentMethods, Operation::DeleteOwn),
    (Resource::Documents, Operation::CreateOwn),
    (Resource::Documents, Operation::DeleteOwn),
    (Resource::VoiceAgents, Operation::CreateOwn),
    (Resource::VoiceAgents, Operation::DeleteOwn),
    (Resource::Integrations, Operation::CreateOwn),
];

/// Only the owner may delete the organization
const OWNER_PERMISSIONS: &[(Resource, Operation)] = &[(Resource::Organizations, Operation::DeleteOwn)];

pub fn role_grants(role: MemberRole, resource: Resource, operation: Operation) -> bool {
    let tiers: &[&[(Resource, Operation)]] = match role {
        MemberRole::Member => &[MEMBER_PERMISSIONS],
        MemberRole::Admin => &[MEMBER_PERMISSIONS, ADMIN_PERMISSIONS],
        MemberRole::Owner => &[MEMBER_PERMISSIONS, ADMIN_PERMISSIONS, OWNER_PERMISSIONS],
    };
    tiers.iter().any(|tier| tier.contains(&(resource, operation)))
}

/// Check whether a user holds a permission
pub fn has_permission(user: &CurrentUser, resource: Resource, operation: Operation) -> bool {
    if user.is_super_admin {
        return true;
    }
    if operation.is_all() || user.organization_id.is_none() {
        return false;
    }
    user.role.is_some_and(|role| role_grants(role, resource, operation))
}

pub fn is_super_admin(user: &CurrentUser) -> bool {
    user.is_super_admin
}

pub trait ResourceMarker: Send + Sync + 'static {
    const RESOURCE: Resource;
}

pub trait OperationMarker: Send + Sync + 'static {
    const OPERATION: Operation;
}

macro_rules! markers {
    ($module:ident, $trait:ident, $konst:ident, $enum:ident: $($name:ident),+ $(,)?) => {
        pub mod $module {
            $(
                pub struct $name;
                impl super::$trait for $name {
                    const $konst: crate::types::$enum = crate::types::$enum::$name;
                }
            )+
        }
    };
}

markers!(resource, ResourceMarker, RESOURCE, Resource:
    Organizations, Members, Invitations, Customers, Credits, PaymentMethods, Documents, Approvals,
    VoiceAgents, Communications, Integrations,
);

markers!(operation, OperationMarker, OPERATION, Operation:
    CreateAll, CreateOwn, ReadAll, ReadOwn, UpdateAll, UpdateOwn, DeleteAll, DeleteOwn,
);

/// Extractor that authenticates the caller and enforces one permission.
/// Dereferences to the [`CurrentUser`].
pub struct RequiresPermission<R, O> {
    user: CurrentUser,
    _marker: PhantomData<fn() -> (R, O)>,
}

impl<R, O> RequiresPermission<R, O> {
    pub fn into_inner(self) -> CurrentUser {
        self.user
    }
}

impl<R, O> Deref for RequiresPermission<R, O> {
    type Target = CurrentUser;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl<R: ResourceMarker, O: OperationMarker> FromRequestParts<AppState> for RequiresPermission<R, O> {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;

        if !has_permission(&user, R::RESOURCE, O::OPERATION) {
            return Err(Error::InsufficientPermissions {
                required: Permission::Allow(R::RESOURCE, O::OPERATION),
                action: O::OPERATION,
                resource: format!("{:?}", R::RESOURCE),
            });
        }

        Ok(Self {
            user,
            _marker: PhantomData,
        })
    }
}
