//! The caller's own organization: profile, members, vendor integrations and deletion.

use axum::{
    Json,
    extract::{Path, State},
};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    AppState,
    api::models::organizations::{
        IntegrationsProvisionRequest, MemberResponse, MemberRoleUpdate, OrganizationDeleteRequest, OrganizationDeleteResponse,
        OrganizationResponse, OrganizationUpdate,
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Documents, Organizations, Users, VoiceAgents},
        models::organizations::{ApprovalStatus, MemberRole, OrganizationDBResponse, OrganizationIntegrationsUpdate},
    },
    errors::{Error, Result},
    tenant_cleanup::{CleanupClients, TenantResources, cleanup_tenant_resources},
    types::{OrganizationId, UserId},
};

/// Longest slug kept from the organization name
const SCHEMA_SLUG_MAX: usize = 40;

/// Stable identifier for a new tenant: a slug of its name plus a random suffix
pub fn schema_name_for(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    let slug: String = slug.trim_end_matches('_').chars().take(SCHEMA_SLUG_MAX).collect();
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    if slug.is_empty() {
        format!("org_{suffix}")
    } else {
        format!("{slug}_{suffix}")
    }
}

pub(crate) async fn fetch_organization(conn: &mut PgConnection, id: OrganizationId) -> Result<OrganizationDBResponse> {
    Organizations::new(conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Organization".to_string(),
        id: id.to_string(),
    })
}

/// Messaging and vendor provisioning are only open to approved organizations
pub(crate) fn require_approved(organization: &OrganizationDBResponse) -> Result<()> {
    if organization.approval_status == ApprovalStatus::Approved {
        Ok(())
    } else {
        Err(Error::Forbidden {
            message: format!(
                "Organization is {}; this feature is available once it has been approved",
                organization.approval_status.as_str()
            ),
        })
    }
}

#[utoipa::path(
    get,
    path = "/api/organization",
    tag = "organization",
    summary = "Get the caller's organization",
    responses(
        (status = 200, description = "Organization", body = OrganizationResponse),
        (status = 403, description = "Not a member of an organization"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_organization(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Organizations, operation::ReadOwn>,
) -> Result<Json<OrganizationResponse>> {
    let organization_id = current_user.require_organization()?;
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let organization = fetch_organization(&mut pool_conn, organization_id).await?;
    Ok(Json(organization.into()))
}

/// Only the profile fields in [`OrganizationUpdate`] are persisted; anything else in the
/// body, such as `approval_status`, is ignored.
#[utoipa::path(
    put,
    path = "/api/organization",
    tag = "organization",
    summary = "Update the organization profile",
    request_body = OrganizationUpdate,
    responses(
        (status = 200, description = "Updated organization", body = OrganizationResponse),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Insufficient permissions"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_organization(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Organizations, operation::UpdateOwn>,
    Json(update): Json<OrganizationUpdate>,
) -> Result<Json<OrganizationResponse>> {
    let organization_id = current_user.require_organization()?;
    if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(Error::BadRequest {
            message: "Organization name cannot be empty".to_string(),
        });
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let organization = Organizations::new(&mut pool_conn).update(organization_id, &update.into()).await?;
    Ok(Json(organization.into()))
}

/// Delete the organization, its data and every member account that belonged only to it.
///
/// Vendor resources are removed afterwards on a best-effort basis; the response reports
/// which of them could not be removed.
#[utoipa::path(
    delete,
    path = "/api/organization",
    tag = "organization",
    summary = "Delete the organization",
    request_body = OrganizationDeleteRequest,
    responses(
        (status = 200, description = "Organization deleted", body = OrganizationDeleteResponse),
        (status = 400, description = "Confirmation does not match the organization name"),
        (status = 403, description = "Only the owner may delete the organization"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_organization(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Organizations, operation::DeleteOwn>,
    Json(request): Json<OrganizationDeleteRequest>,
) -> Result<Json<OrganizationDeleteResponse>> {
    let organization_id = current_user.require_organization()?;
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let organization = fetch_organization(&mut tx, organization_id).await?;
    if request.confirmation != organization.name {
        return Err(Error::BadRequest {
            message: "Confirmation text does not match the organization name".to_string(),
        });
    }

    let resources = TenantResources {
        voice_agent_ids: VoiceAgents::new(&mut tx)
            .list(organization_id)
            .await?
            .into_iter()
            .map(|agent| agent.external_id)
            .collect(),
        voice_account_id: organization.voice_account_id.clone(),
        telephony_account_id: organization.telephony_account_id.clone(),
        email_domain_id: organization.email_domain_id.clone(),
        document_keys: Documents::new(&mut tx)
            .list_for_organization(organization_id)
            .await?
            .into_iter()
            .map(|doc| doc.storage_key)
            .collect(),
    };
    let member_ids: Vec<UserId> = Organizations::new(&mut tx)
        .list_members(organization_id)
        .await?
        .into_iter()
        .map(|m| m.user_id)
        .collect();

    Organizations::new(&mut tx).delete(organization_id).await?;
    let removed_users = Users::new(&mut tx).delete_orphaned(&member_ids).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    tracing::info!(
        organization_id = %organization_id,
        removed_users,
        "Deleted organization, cleaning up vendor resources"
    );

    let cleanup = cleanup_tenant_resources(
        &resources,
        &CleanupClients {
            voice: state.voice.as_deref(),
            telephony: state.telephony.as_deref(),
            email_delivery: state.email_delivery.as_deref(),
            storage: state.storage.as_ref(),
        },
    )
    .await;

    Ok(Json(OrganizationDeleteResponse {
        id: organization_id,
        removed_users,
        cleanup,
    }))
}

/// Provision vendor accounts. Already-linked accounts are left as they are.
#[utoipa::path(
    post,
    path = "/api/organization/integrations",
    tag = "organization",
    summary = "Provision telephony and email integrations",
    request_body = IntegrationsProvisionRequest,
    responses(
        (status = 200, description = "Organization with its linked accounts", body = OrganizationResponse),
        (status = 403, description = "Organization not approved"),
        (status = 502, description = "Vendor request failed"),
        (status = 503, description = "Integration not configured"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn provision_integrations(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Integrations, operation::CreateOwn>,
    Json(request): Json<IntegrationsProvisionRequest>,
) -> Result<Json<OrganizationResponse>> {
    let organization_id = current_user.require_organization()?;
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut organization = fetch_organization(&mut pool_conn, organization_id).await?;
    require_approved(&organization)?;

    let mut update = OrganizationIntegrationsUpdate::default();

    if request.telephony && organization.telephony_account_id.is_none() {
        let telephony = state.require_telephony()?;
        let account = telephony.create_subaccount(&organization.name).await?;
        update.telephony_account_id = Some(account.sid);
        update.sms_from_number = Some(telephony.default_from_number().to_string());
    }

    if request.voice && organization.voice_account_id.is_none() {
        let voice = state.require_voice()?;
        update.voice_account_id = Some(voice.create_organization(&organization.name, &organization_id.to_string()).await?);
    }

    if let Some(domain) = request.email_domain.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        match organization.email_domain.as_deref() {
            Some(existing) if existing.eq_ignore_ascii_case(domain) => {}
            Some(existing) => {
                return Err(Error::Conflict {
                    message: format!("Email domain {existing} is already linked"),
                });
            }
            None => {
                let created = state.require_email_delivery()?.create_domain(domain).await?;
                update.email_domain_id = Some(created.id);
                update.email_domain = Some(created.name);
            }
        }
    }

    if update != OrganizationIntegrationsUpdate::default() {
        organization = Organizations::new(&mut pool_conn)
            .update_integrations(organization_id, &update)
            .await?;
    }

    Ok(Json(organization.into()))
}

#[utoipa::path(
    get,
    path = "/api/organization/members",
    tag = "organization",
    summary = "List members",
    responses(
        (status = 200, description = "Members of the organization", body = [MemberResponse]),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_members(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Members, operation::ReadOwn>,
) -> Result<Json<Vec<MemberResponse>>> {
    let organization_id = current_user.require_organization()?;
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let members = Organizations::new(&mut pool_conn).list_members(organization_id).await?;
    Ok(Json(members.into_iter().map(Into::into).collect()))
}

/// Only owners may grant or take away the owner role, and the last owner stays an owner
#[utoipa::path(
    patch,
    path = "/api/organization/members/{user_id}",
    tag = "organization",
    summary = "Change a member's role",
    request_body = MemberRoleUpdate,
    params(("user_id" = String, Path, description = "Member user ID")),
    responses(
        (status = 200, description = "Updated member", body = MemberResponse),
        (status = 400, description = "Would leave the organization without an owner"),
        (status = 403, description = "Insufficient permissions"),
        (status = 404, description = "Member not found"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_member_role(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    current_user: RequiresPermission<resource::Members, operation::UpdateOwn>,
    Json(update): Json<MemberRoleUpdate>,
) -> Result<Json<MemberResponse>> {
    let organization_id = current_user.require_organization()?;
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut organizations = Organizations::new(&mut tx);

    let target = organizations
        .list_members(organization_id)
        .await?
        .into_iter()
        .find(|m| m.user_id == user_id)
        .ok_or_else(|| Error::NotFound {
            resource: "Member".to_string(),
            id: user_id.to_string(),
        })?;

    let touches_owner = target.role == MemberRole::Owner || update.role == MemberRole::Owner;
    if touches_owner && current_user.role != Some(MemberRole::Owner) && !current_user.is_super_admin {
        return Err(Error::Forbidden {
            message: "Only an owner can grant or revoke the owner role".to_string(),
        });
    }
    if target.role == MemberRole::Owner && update.role != MemberRole::Owner && organizations.count_owners(organization_id).await? <= 1 {
        return Err(Error::BadRequest {
            message: "The organization must keep at least one owner".to_string(),
        });
    }

    let updated = organizations
        .update_member_role(organization_id, user_id, update.role)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Member".to_string(),
            id: user_id.to_string(),
        })?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(updated.into()))
}

/// Remove a member. Their account is kept and can join another organization.
#[utoipa::path(
    delete,
    path = "/api/organization/members/{user_id}",
    tag = "organization",
    summary = "Remove a member",
    params(("user_id" = String, Path, description = "Member user ID")),
    responses(
        (status = 204, description = "Member removed"),
        (status = 400, description = "Would leave the organization without an owner"),
        (status = 403, description = "Insufficient permissions"),
        (status = 404, description = "Member not found"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn remove_member(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    current_user: RequiresPermission<resource::Members, operation::DeleteOwn>,
) -> Result<axum::http::StatusCode> {
    let organization_id = current_user.require_organization()?;
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut organizations = Organizations::new(&mut tx);

    let target = organizations
        .list_members(organization_id)
        .await?
        .into_iter()
        .find(|m| m.user_id == user_id)
        .ok_or_else(|| Error::NotFound {
            resource: "Member".to_string(),
            id: user_id.to_string(),
        })?;

    if target.role == MemberRole::Owner {
        if current_user.role != Some(MemberRole::Owner) && !current_user.is_super_admin {
            return Err(Error::Forbidden {
                message: "Only an owner can remove an owner".to_string(),
            });
        }
        if organizations.count_owners(organization_id).await? <= 1 {
            return Err(Error::BadRequest {
                message: "The organization must keep at least one owner".to_string(),
            });
        }
    }

    organizations.remove_member(organization_id, user_id).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{EmailDeliveryConfig, TelephonyConfig, VoiceConfig},
        db::{
            handlers::Credits,
            models::{
                credits::{CreditTransactionCreateDBRequest, CreditTransactionType},
                documents::DocumentCreateDBRequest,
            },
        },
        test_utils::*,
    };
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use serde_json::json;
    use sqlx::PgPool;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    #[test]
    fn test_schema_name_slug() {
        let name = schema_name_for("Acme Dental & Co.");
        assert!(name.starts_with("acme_dental_co_"), "{name}");
        assert_eq!(name.len(), "acme_dental_co_".len() + 8);

        assert!(schema_name_for("!!!").starts_with("org_"));
        assert_ne!(schema_name_for("Same"), schema_name_for("Same"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_organization(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let (org, _owner) = create_test_organization(&pool, "Northwind").await;
        let member = add_test_member(&pool, &org, MemberRole::Member).await;

        let response = app
            .get("/api/organization")
            .add_header(&add_auth_headers(&member)[0].0, &add_auth_headers(&member)[0].1)
            .await;
        response.assert_status_ok();
        let body: OrganizationResponse = response.json();
        assert_eq!(body.id, org.id);
        assert_eq!(body.approval_status, ApprovalStatus::Pending);

        let outsider = create_test_user(&pool, "outsider@example.com").await;
        app.get("/api/organization")
            .add_header(&add_auth_headers(&outsider)[0].0, &add_auth_headers(&outsider)[0].1)
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_only_persists_allow_listed_fields(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let (org, owner) = create_test_organization(&pool, "Northwind").await;

        let response = app
            .put("/api/organization")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .json(&json!({
                "name": "Northwind Traders",
                "timezone": "Europe/London",
                "approval_status": "approved",
                "payment_customer_id": "cus_hijack",
                "schema_name": "other"
            }))
            .await;
        response.assert_status_ok();
        let body: OrganizationResponse = response.json();
        assert_eq!(body.name, "Northwind Traders");
        assert_eq!(body.timezone.as_deref(), Some("Europe/London"));
        assert_eq!(body.approval_status, ApprovalStatus::Pending);

        let mut conn = pool.acquire().await.unwrap();
        let stored = fetch_organization(&mut conn, org.id).await.unwrap();
        assert_eq!(stored.approval_status, ApprovalStatus::Pending);
        assert_eq!(stored.payment_customer_id, None);
        assert_eq!(stored.schema_name, org.schema_name);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_member_cannot_update_organization(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let (org, _owner) = create_test_organization(&pool, "Northwind").await;
        let member = add_test_member(&pool, &org, MemberRole::Member).await;

        app.put("/api/organization")
            .add_header(&add_auth_headers(&member)[0].0, &add_auth_headers(&member)[0].1)
            .json(&json!({"name": "Hijacked"}))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_with_wrong_confirmation_keeps_everything(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let (org, owner) = create_test_organization(&pool, "Northwind").await;

        let response = app
            .delete("/api/organization")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .json(&json!({"confirmation": "northwind"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.header("content-type").to_str().unwrap(),
            "application/json",
            "errors are rendered as JSON"
        );
        let body: serde_json::Value = response.json();
        assert_eq!(body["message"], "Confirmation text does not match the organization name");

        let mut conn = pool.acquire().await.unwrap();
        assert!(Organizations::new(&mut conn).get_by_id(org.id).await.unwrap().is_some());
        assert!(Users::new(&mut conn).get_by_id(owner.id).await.unwrap().is_some());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_admin_cannot_delete_organization(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let (org, _owner) = create_test_organization(&pool, "Northwind").await;
        let admin = add_test_member(&pool, &org, MemberRole::Admin).await;

        app.delete("/api/organization")
            .add_header(&add_auth_headers(&admin)[0].0, &add_auth_headers(&admin)[0].1)
            .json(&json!({"confirmation": "Northwind"}))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_removes_tenant_members_and_vendor_resources(pool: PgPool) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC_tenant.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sid": "AC_tenant", "friendly_name": "Northwind"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/domains/dom_1"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/org/vorg_1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = create_test_config();
        config.integrations.telephony = Some(TelephonyConfig {
            account_sid: "AC_main".to_string(),
            auth_token: "token".to_string(),
            default_from_number: "+15550000000".to_string(),
            api_base: server.uri().parse().unwrap(),
        });
        config.integrations.email_delivery = Some(EmailDeliveryConfig {
            api_key: "re_key".to_string(),
            default_from: "noreply@example.com".to_string(),
            api_base: server.uri().parse().unwrap(),
        });
        config.integrations.voice = Some(VoiceConfig {
            api_key: "vapi_key".to_string(),
            webhook_secret: "voice-secret".to_string(),
            api_base: server.uri().parse().unwrap(),
        });
        let (app, _bg_services) = create_test_app_with_config(pool.clone(), config).await;

        let (org, owner) = create_test_organization(&pool, "Northwind").await;
        let member = add_test_member(&pool, &org, MemberRole::Member).await;
        let mut conn = pool.acquire().await.unwrap();
        Organizations::new(&mut conn)
            .update_integrations(
                org.id,
                &OrganizationIntegrationsUpdate {
                    telephony_account_id: Some("AC_tenant".to_string()),
                    voice_account_id: Some("vorg_1".to_string()),
                    email_domain_id: Some("dom_1".to_string()),
                    email_domain: Some("mail.northwind.test".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        Credits::new(&mut conn)
            .create_transaction(&CreditTransactionCreateDBRequest::new(org.id, CreditTransactionType::AdminGrant, Decimal::from(50)))
            .await
            .unwrap();
        Documents::new(&mut conn)
            .create(&DocumentCreateDBRequest {
                id: Uuid::new_v4(),
                organization_id: org.id,
                document_type: "license".to_string(),
                filename: "license.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                size_bytes: 10,
                storage_key: format!("{}/missing", org.id),
                uploaded_by: owner.id,
            })
            .await
            .unwrap();
        drop(conn);

        let response = app
            .delete("/api/organization")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .json(&json!({"confirmation": "Northwind"}))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["removed_users"], 2);

        let steps = body["cleanup"]["steps"].as_array().unwrap();
        let outcome = |resource: &str| {
            steps
                .iter()
                .find(|s| s["resource"] == resource)
                .map(|s| s["outcome"].as_str().unwrap().to_string())
        };
        assert_eq!(outcome("telephony_subaccount").as_deref(), Some("deleted"));
        assert_eq!(outcome("voice_account").as_deref(), Some("deleted"));
        assert_eq!(outcome("email_domain").as_deref(), Some("failed"));
        assert!(outcome("document").is_some());

        let mut conn = pool.acquire().await.unwrap();
        assert!(Organizations::new(&mut conn).get_by_id(org.id).await.unwrap().is_none());
        assert!(Users::new(&mut conn).get_by_id(owner.id).await.unwrap().is_none());
        assert!(Users::new(&mut conn).get_by_id(member.id).await.unwrap().is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_provision_requires_approval_and_configuration(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let (org, owner) = create_test_organization(&pool, "Northwind").await;

        app.post("/api/organization/integrations")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .json(&json!({"telephony": true}))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        approve_test_organization(&pool, &org).await;
        app.post("/api/organization/integrations")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .json(&json!({"telephony": true}))
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_provision_telephony_voice_and_email_domain(pool: PgPool) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts.json"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sid": "AC_new", "friendly_name": "Northwind"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/domains"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "dom_9", "name": "mail.northwind.test", "status": "pending"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/org"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "vorg_9"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = create_test_config();
        config.integrations.telephony = Some(TelephonyConfig {
            account_sid: "AC_main".to_string(),
            auth_token: "token".to_string(),
            default_from_number: "+15550000000".to_string(),
            api_base: server.uri().parse().unwrap(),
        });
        config.integrations.email_delivery = Some(EmailDeliveryConfig {
            api_key: "re_key".to_string(),
            default_from: "noreply@example.com".to_string(),
            api_base: server.uri().parse().unwrap(),
        });
        config.integrations.voice = Some(VoiceConfig {
            api_key: "vapi_key".to_string(),
            webhook_secret: "voice-secret".to_string(),
            api_base: server.uri().parse().unwrap(),
        });
        let (app, _bg_services) = create_test_app_with_config(pool.clone(), config).await;
        let (org, owner) = create_test_organization(&pool, "Northwind").await;
        approve_test_organization(&pool, &org).await;

        let request = json!({"telephony": true, "voice": true, "email_domain": "mail.northwind.test"});
        let response = app
            .post("/api/organization/integrations")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .json(&request)
            .await;
        response.assert_status_ok();
        let body: OrganizationResponse = response.json();
        assert_eq!(body.integrations.telephony_account_id.as_deref(), Some("AC_new"));
        assert_eq!(body.integrations.sms_from_number.as_deref(), Some("+15550000000"));
        assert_eq!(body.integrations.email_domain.as_deref(), Some("mail.northwind.test"));
        assert_eq!(body.integrations.voice_account_id.as_deref(), Some("vorg_9"));

        // Repeating the request does not provision again
        app.post("/api/organization/integrations")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .json(&request)
            .await
            .assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_last_owner_cannot_be_demoted_or_removed(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let (_org, owner) = create_test_organization(&pool, "Northwind").await;

        app.patch(&format!("/api/organization/members/{}", owner.id))
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .json(&json!({"role": "admin"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        app.delete(&format!("/api/organization/members/{}", owner.id))
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_admin_manages_members_but_not_owners(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let (org, owner) = create_test_organization(&pool, "Northwind").await;
        let admin = add_test_member(&pool, &org, MemberRole::Admin).await;
        let member = add_test_member(&pool, &org, MemberRole::Member).await;

        let response = app
            .patch(&format!("/api/organization/members/{}", member.id))
            .add_header(&add_auth_headers(&admin)[0].0, &add_auth_headers(&admin)[0].1)
            .json(&json!({"role": "admin"}))
            .await;
        response.assert_status_ok();
        let updated: MemberResponse = response.json();
        assert_eq!(updated.role, MemberRole::Admin);

        app.patch(&format!("/api/organization/members/{}", member.id))
            .add_header(&add_auth_headers(&admin)[0].0, &add_auth_headers(&admin)[0].1)
            .json(&json!({"role": "owner"}))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        app.delete(&format!("/api/organization/members/{}", owner.id))
            .add_header(&add_auth_headers(&admin)[0].0, &add_auth_headers(&admin)[0].1)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        app.delete(&format!("/api/organization/members/{}", member.id))
            .add_header(&add_auth_headers(&admin)[0].0, &add_auth_headers(&admin)[0].1)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let response = app
            .get("/api/organization/members")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .await;
        let members: Vec<MemberResponse> = response.json();
        assert_eq!(members.len(), 2);
        assert!(members.iter().all(|m| m.user_id != member.id));
    }
}
