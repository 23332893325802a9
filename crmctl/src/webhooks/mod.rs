//! Inbound webhook authentication.
//!
//! Payment events are verified by the payment provider itself; voice end-of-call
//! reports and the dummy provider use [`signing::verify_shared_secret`]. The HTTP
//! handlers live in [`crate::api::handlers::webhooks`].

pub mod signing;

pub use signing::verify_shared_secret;
