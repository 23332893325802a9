use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::{
        handlers::organization::{fetch_organization, require_approved},
        models::voice::{VoiceAgentCreate, VoiceAgentResponse},
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::handlers::VoiceAgents,
    errors::{Error, Result},
    integrations::AssistantRequest,
    types::VoiceAgentId,
};

#[utoipa::path(
    get,
    path = "/api/voice/agents",
    tag = "voice",
    summary = "List voice agents",
    responses(
        (status = 200, description = "Voice agents of the caller's organization", body = [VoiceAgentResponse]),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_voice_agents(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::VoiceAgents, operation::ReadOwn>,
) -> Result<Json<Vec<VoiceAgentResponse>>> {
    let organization_id = current_user.require_organization()?;
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let agents = VoiceAgents::new(&mut pool_conn).list(organization_id).await?;
    Ok(Json(agents.into_iter().map(Into::into).collect()))
}

/// Create the assistant at the voice provider, then record it for this tenant.
#[utoipa::path(
    post,
    path = "/api/voice/agents",
    tag = "voice",
    summary = "Create a voice agent",
    request_body = VoiceAgentCreate,
    responses(
        (status = 201, description = "Voice agent created", body = VoiceAgentResponse),
        (status = 400, description = "Missing name"),
        (status = 403, description = "Organization not approved"),
        (status = 502, description = "Voice provider failed"),
        (status = 503, description = "Voice provider not configured"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_voice_agent(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::VoiceAgents, operation::CreateOwn>,
    Json(request): Json<VoiceAgentCreate>,
) -> Result<(StatusCode, Json<VoiceAgentResponse>)> {
    let organization_id = current_user.require_organization()?;
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::BadRequest {
            message: "Voice agent name is required".to_string(),
        });
    }
    let voice = state.require_voice()?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let organization = fetch_organization(&mut pool_conn, organization_id).await?;
    require_approved(&organization)?;

    let external_id = voice
        .create_assistant(&AssistantRequest {
            name: name.clone(),
            first_message: request.first_message,
            system_prompt: request.system_prompt,
            organization_id: organization_id.to_string(),
        })
        .await?;

    let stored = VoiceAgents::new(&mut pool_conn)
        .create(organization_id, &external_id, &name, current_user.id)
        .await;
    let agent = match stored {
        Ok(agent) => agent,
        Err(e) => {
            if let Err(cleanup) = voice.delete_assistant(&external_id).await {
                tracing::warn!(external_id = %external_id, "Failed to remove assistant after insert error: {}", cleanup);
            }
            return Err(e.into());
        }
    };

    tracing::info!(organization_id = %organization_id, agent_id = %agent.id, "Voice agent created");
    Ok((StatusCode::CREATED, Json(agent.into())))
}

#[utoipa::path(
    delete,
    path = "/api/voice/agents/{id}",
    tag = "voice",
    summary = "Delete a voice agent",
    params(("id" = String, Path, description = "Voice agent ID")),
    responses(
        (status = 204, description = "Voice agent deleted here and at the provider"),
        (status = 404, description = "Voice agent not found in this organization"),
        (status = 502, description = "Voice provider failed"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_voice_agent(
    State(state): State<AppState>,
    Path(id): Path<VoiceAgentId>,
    current_user: RequiresPermission<resource::VoiceAgents, operation::DeleteOwn>,
) -> Result<StatusCode> {
    let organization_id = current_user.require_organization()?;
    let voice = state.require_voice()?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut agents = VoiceAgents::new(&mut pool_conn);
    let agent = agents.get_by_id(organization_id, id).await?.ok_or_else(|| Error::NotFound {
        resource: "Voice agent".to_string(),
        id: id.to_string(),
    })?;

    // Provider first: a failure leaves the row so the delete can be retried
    voice.delete_assistant(&agent.external_id).await?;
    agents.delete(organization_id, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::VoiceConfig,
        db::models::organizations::MemberRole,
        test_utils::*,
    };
    use serde_json::json;
    use sqlx::PgPool;
    use url::Url;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn app_with_voice(pool: &PgPool, server: &MockServer) -> (axum_test::TestServer, crate::BackgroundServices) {
        let mut config = create_test_config();
        config.integrations.voice = Some(VoiceConfig {
            api_key: "vapi_test".to_string(),
            webhook_secret: "voice-secret".to_string(),
            api_base: Url::parse(&server.uri()).unwrap(),
        });
        create_test_app_with_config(pool.clone(), config).await
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_list_and_delete_agent(pool: PgPool) {
        let server = MockServer::start().await;
        let (app, _bg_services) = app_with_voice(&pool, &server).await;
        let (org, owner) = create_test_organization(&pool, "Voice Clinic").await;
        approve_test_organization(&pool, &org).await;
        let auth = add_auth_headers(&owner);

        Mock::given(method("POST"))
            .and(path("/assistant"))
            .and(body_partial_json(json!({
                "name": "Front desk",
                "metadata": { "organization_id": org.id.to_string() },
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "asst_123" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/assistant/asst_123"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let response = app
            .post("/api/voice/agents")
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "name": " Front desk ", "first_message": "Hello!" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let agent: VoiceAgentResponse = response.json();
        assert_eq!(agent.name, "Front desk");
        assert_eq!(agent.external_id, "asst_123");

        let agents: Vec<VoiceAgentResponse> = app.get("/api/voice/agents").add_header(&auth[0].0, &auth[0].1).await.json();
        assert_eq!(agents.len(), 1);

        app.delete(&format!("/api/voice/agents/{}", agent.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        let agents: Vec<VoiceAgentResponse> = app.get("/api/voice/agents").add_header(&auth[0].0, &auth[0].1).await.json();
        assert!(agents.is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_provider_failure_keeps_nothing(pool: PgPool) {
        let server = MockServer::start().await;
        let (app, _bg_services) = app_with_voice(&pool, &server).await;
        let (org, owner) = create_test_organization(&pool, "Voice Clinic").await;
        approve_test_organization(&pool, &org).await;
        let auth = add_auth_headers(&owner);

        Mock::given(method("POST"))
            .and(path("/assistant"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        app.post("/api/voice/agents")
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "name": "Front desk" }))
            .await
            .assert_status(StatusCode::BAD_GATEWAY);

        let mut conn = pool.acquire().await.unwrap();
        assert!(VoiceAgents::new(&mut conn).list(org.id).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_agent_guards(pool: PgPool) {
        let server = MockServer::start().await;
        let (app, _bg_services) = app_with_voice(&pool, &server).await;
        let (org, owner) = create_test_organization(&pool, "Pending Clinic").await;
        let member = add_test_member(&pool, &org, MemberRole::Member).await;

        // Still pending review
        app.post("/api/voice/agents")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .json(&json!({ "name": "Front desk" }))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        approve_test_organization(&pool, &org).await;
        app.post("/api/voice/agents")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .json(&json!({ "name": "   " }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        app.post("/api/voice/agents")
            .add_header(&add_auth_headers(&member)[0].0, &add_auth_headers(&member)[0].1)
            .json(&json!({ "name": "Front desk" }))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        app.delete(&format!("/api/voice/agents/{}", uuid::Uuid::new_v4()))
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_voice_not_configured(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let (org, owner) = create_test_organization(&pool, "Voice Clinic").await;
        approve_test_organization(&pool, &org).await;

        app.post("/api/voice/agents")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .json(&json!({ "name": "Front desk" }))
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }
}
