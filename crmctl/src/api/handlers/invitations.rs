//! Team invitations. The plaintext token only ever appears in the accept link.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;

use crate::{
    AppState,
    api::{
        handlers::organization::fetch_organization,
        models::{
            invitations::{AcceptInvitationRequest, AcceptInvitationResponse, InvitationCreate, InvitationCreatedResponse, InvitationResponse},
            users::CurrentUser,
        },
    },
    auth::{
        password::{generate_token, hash_token},
        permissions::{RequiresPermission, operation, resource},
    },
    db::{
        handlers::{Invitations, Organizations, Users},
        models::{invitations::InvitationCreateDBRequest, organizations::MemberRole},
    },
    errors::{Error, Result},
    types::InvitationId,
};

fn accept_url(dashboard_url: &str, token: &str) -> String {
    format!("{}/invite?token={}", dashboard_url.trim_end_matches('/'), token)
}

#[utoipa::path(
    get,
    path = "/api/invitations",
    tag = "invitations",
    summary = "List open invitations",
    responses(
        (status = 200, description = "Invitations not yet accepted or revoked", body = [InvitationResponse]),
        (status = 403, description = "Insufficient permissions"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_invitations(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Invitations, operation::ReadOwn>,
) -> Result<Json<Vec<InvitationResponse>>> {
    let organization_id = current_user.require_organization()?;
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let invitations = Invitations::new(&mut pool_conn).list_open(organization_id).await?;
    Ok(Json(invitations.into_iter().map(Into::into).collect()))
}

/// Invite someone by email. The invitation email is sent on a best-effort basis; the
/// accept link is returned either way.
#[utoipa::path(
    post,
    path = "/api/invitations",
    tag = "invitations",
    summary = "Invite a team member",
    request_body = InvitationCreate,
    responses(
        (status = 201, description = "Invitation created", body = InvitationCreatedResponse),
        (status = 400, description = "Invalid email"),
        (status = 403, description = "Insufficient permissions"),
        (status = 409, description = "Already a member or already invited"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_invitation(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Invitations, operation::CreateOwn>,
    Json(request): Json<InvitationCreate>,
) -> Result<(StatusCode, Json<InvitationCreatedResponse>)> {
    let organization_id = current_user.require_organization()?;
    let email = request.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(Error::BadRequest {
            message: "A valid email address is required".to_string(),
        });
    }
    if request.role == MemberRole::Owner && current_user.role != Some(MemberRole::Owner) && !current_user.is_super_admin {
        return Err(Error::Forbidden {
            message: "Only an owner can invite another owner".to_string(),
        });
    }

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let organization = fetch_organization(&mut tx, organization_id).await?;

    if let Some(existing) = Users::new(&mut tx).get_user_by_email(&email).await?
        && Organizations::new(&mut tx).membership_for_user(existing.id).await?.is_some()
    {
        return Err(Error::Conflict {
            message: "User already belongs to an organization".to_string(),
        });
    }

    let mut invitations = Invitations::new(&mut tx);
    invitations.revoke_expired_for_email(organization_id, &email).await?;

    let token = generate_token();
    let expiry = chrono::Duration::from_std(state.config.invitations.expiry).map_err(|e| Error::Internal {
        operation: format!("convert invitation expiry: {e}"),
    })?;
    let invitation = invitations
        .create(&InvitationCreateDBRequest {
            organization_id,
            email: email.clone(),
            role: request.role,
            token_hash: hash_token(&token),
            invited_by: current_user.id,
            expires_at: Utc::now() + expiry,
        })
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    let link = accept_url(&state.config.dashboard_url, &token);
    let inviter = current_user.display_name.as_deref().unwrap_or(&current_user.email);
    let expires = invitation.expires_at.format("%B %-d, %Y").to_string();
    let email_sent = match state
        .mailer
        .send_invitation(&email, &organization.name, inviter, invitation.role, &link, &expires)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(invitation_id = %invitation.id, "Failed to send invitation email: {}", e);
            false
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(InvitationCreatedResponse {
            invitation: invitation.into(),
            accept_url: link,
            email_sent,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/invitations/{id}",
    tag = "invitations",
    summary = "Revoke an invitation",
    params(("id" = String, Path, description = "Invitation ID")),
    responses(
        (status = 204, description = "Invitation revoked"),
        (status = 404, description = "No open invitation with this ID"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn revoke_invitation(
    State(state): State<AppState>,
    Path(id): Path<InvitationId>,
    current_user: RequiresPermission<resource::Invitations, operation::DeleteOwn>,
) -> Result<StatusCode> {
    let organization_id = current_user.require_organization()?;
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Invitations::new(&mut pool_conn).revoke(organization_id, id).await? {
        return Err(Error::NotFound {
            resource: "Invitation".to_string(),
            id: id.to_string(),
        });
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Join the inviting organization. The caller must be signed in as the invited email and
/// must not already belong to an organization.
#[utoipa::path(
    post,
    path = "/api/invitations/accept",
    tag = "invitations",
    summary = "Accept an invitation",
    request_body = AcceptInvitationRequest,
    responses(
        (status = 200, description = "Joined the organization", body = AcceptInvitationResponse),
        (status = 400, description = "Invitation expired, revoked or already used"),
        (status = 403, description = "Invitation was sent to a different email"),
        (status = 404, description = "Unknown token"),
        (status = 409, description = "Caller already belongs to an organization"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn accept_invitation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<AcceptInvitationRequest>,
) -> Result<Json<AcceptInvitationResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut invitations = Invitations::new(&mut tx);

    let invitation = invitations
        .get_by_token_hash_for_update(&hash_token(request.token.trim()))
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Invitation".to_string(),
            id: "token".to_string(),
        })?;
    if !invitation.is_open(Utc::now()) {
        return Err(Error::BadRequest {
            message: "This invitation has expired or is no longer valid".to_string(),
        });
    }
    if !invitation.email.eq_ignore_ascii_case(&current_user.email) {
        return Err(Error::Forbidden {
            message: "This invitation was sent to a different email address".to_string(),
        });
    }
    if current_user.organization_id.is_some() {
        return Err(Error::Conflict {
            message: "User already belongs to an organization".to_string(),
        });
    }

    invitations.mark_accepted(invitation.id).await?;
    Organizations::new(&mut tx)
        .add_member(invitation.organization_id, current_user.id, invitation.role)
        .await?;
    let organization = fetch_organization(&mut tx, invitation.organization_id).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    tracing::info!(organization_id = %organization.id, user_id = %current_user.id, "Invitation accepted");
    Ok(Json(AcceptInvitationResponse {
        organization_id: organization.id,
        organization_name: organization.name,
        role: invitation.role,
    }))
}
