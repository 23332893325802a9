//! Request and response bodies for `/authentication/*`.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{organizations::OrganizationResponse, users::UserResponse};

/// Sign up a new organization together with its owner account
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub organization_name: String,
    pub industry: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    /// The caller's organization; absent for users without one
    pub organization: Option<OrganizationResponse>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthSuccessResponse {
    pub message: String,
}

/// A JSON body sent together with a `Set-Cookie` header
pub struct WithSessionCookie<T> {
    pub status: StatusCode,
    pub body: T,
    pub cookie: String,
}

impl<T: Serialize> IntoResponse for WithSessionCookie<T> {
    fn into_response(self) -> Response {
        (self.status, [(header::SET_COOKIE, self.cookie)], Json(self.body)).into_response()
    }
}

pub type RegisterResponse = WithSessionCookie<AuthResponse>;
pub type LoginResponse = WithSessionCookie<AuthResponse>;
pub type LogoutResponse = WithSessionCookie<AuthSuccessResponse>;
