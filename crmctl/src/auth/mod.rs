//! Authentication and authorization.
//!
//! # Authentication Methods
//!
//! ## 1. Session Authentication
//!
//! Browser-based authentication using secure HTTP-only cookies:
//! - Users register or log in via `/authentication/register` and `/authentication/login`
//! - A signed JWT naming the user is stored in the session cookie
//!
//! ## 2. Proxy Header Authentication
//!
//! For deployments behind an SSO proxy, a trusted header carries the caller's email.
//! Unknown emails can be auto-provisioned as users without an organization.
//!
//! # Authorization
//!
//! Membership and tenant role are loaded from the database per request and mapped onto
//! [`Permission`](crate::types::Permission)s; see [`permissions`].
//!
//! # Modules
//!
//! - [`current_user`]: Extractor for the authenticated user
//! - [`password`]: Argon2 password hashing and invitation tokens
//! - [`permissions`]: Role-to-permission mapping and the `RequiresPermission` extractor
//! - [`session`]: JWT session tokens and cookies

pub mod current_user;
pub mod password;
pub mod permissions;
pub mod session;
