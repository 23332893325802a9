use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use bytes::BytesMut;
use uuid::Uuid;

use crate::{
    AppState,
    api::models::documents::DocumentResponse,
    auth::permissions::{RequiresPermission, operation, resource},
    db::{handlers::Documents, models::documents::DocumentCreateDBRequest},
    errors::{Error, Result},
    storage::{DocumentRejection, check_size, document_key, validate_content_type},
    types::DocumentId,
};

fn document_not_found(id: DocumentId) -> Error {
    Error::NotFound {
        resource: "Document".to_string(),
        id: id.to_string(),
    }
}

#[utoipa::path(
    post,
    path = "/api/documents",
    tag = "documents",
    summary = "Upload a verification document",
    request_body(
        content_type = "multipart/form-data",
        description = "`document_type` text field and a `file` part (PDF, PNG or JPEG)"
    ),
    responses(
        (status = 201, description = "Document stored and queued for review", body = DocumentResponse),
        (status = 400, description = "Missing field, empty file or unsupported type"),
        (status = 413, description = "File too large"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn upload_document(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Documents, operation::CreateOwn>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentResponse>)> {
    let organization_id = current_user.require_organization()?;
    let limits = &state.config.documents;
    let document_id = Uuid::new_v4();

    let mut document_type: Option<String> = None;
    let mut upload: Option<(String, String, BytesMut)> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| Error::BadRequest {
        message: format!("Failed to parse multipart data: {e}"),
    })? {
        match field.name().unwrap_or("") {
            "document_type" => {
                let value = field.text().await.map_err(|e| Error::BadRequest {
                    message: format!("Failed to read document_type: {e}"),
                })?;
                document_type = Some(value.trim().to_string()).filter(|v| !v.is_empty());
            }
            "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("document_{document_id}"));
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| mime_guess::from_path(&filename).first_or_octet_stream().to_string());
                validate_content_type(&content_type, limits)?;

                let mut content = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(|e| Error::BadRequest {
                    message: format!("Failed to read file chunk: {e}"),
                })? {
                    check_size((content.len() + chunk.len()) as u64, limits)?;
                    content.extend_from_slice(&chunk);
                }
                upload = Some((filename, content_type, content));
            }
            other => {
                tracing::debug!("Ignoring unexpected multipart field {}", other);
            }
        }
    }

    let document_type = document_type.ok_or_else(|| Error::BadRequest {
        message: "document_type is required".to_string(),
    })?;
    let (filename, content_type, content) = upload.ok_or_else(|| Error::BadRequest {
        message: "A file is required".to_string(),
    })?;
    if content.is_empty() {
        return Err(DocumentRejection::Empty.into());
    }

    let storage_key = document_key(&organization_id, &document_id);
    let size_bytes = content.len() as i64;
    state.storage.put(&storage_key, &content_type, content.freeze()).await?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let created = Documents::new(&mut pool_conn)
        .create(&DocumentCreateDBRequest {
            id: document_id,
            organization_id,
            document_type,
            filename,
            content_type,
            size_bytes,
            storage_key: storage_key.clone(),
            uploaded_by: current_user.id,
        })
        .await;
    let document = match created {
        Ok(document) => document,
        Err(e) => {
            if let Err(cleanup) = state.storage.delete(&storage_key).await {
                tracing::warn!(document_id = %document_id, "Failed to remove orphaned upload: {}", cleanup);
            }
            return Err(e.into());
        }
    };

    tracing::info!(document_id = %document.id, size_bytes, "Document uploaded");
    Ok((StatusCode::CREATED, Json(document.into())))
}

#[utoipa::path(
    get,
    path = "/api/documents",
    tag = "documents",
    summary = "List documents",
    responses(
        (status = 200, description = "Documents of the caller's organization", body = [DocumentResponse]),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_documents(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Documents, operation::ReadOwn>,
) -> Result<Json<Vec<DocumentResponse>>> {
    let organization_id = current_user.require_organization()?;
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let documents = Documents::new(&mut pool_conn).list_for_organization(organization_id).await?;
    Ok(Json(documents.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/api/documents/{id}",
    tag = "documents",
    summary = "Get document metadata",
    params(("id" = String, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document", body = DocumentResponse),
        (status = 404, description = "Document not found in this organization"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<DocumentId>,
    current_user: RequiresPermission<resource::Documents, operation::ReadOwn>,
) -> Result<Json<DocumentResponse>> {
    let organization_id = current_user.require_organization()?;
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let document = Documents::new(&mut pool_conn)
        .get_by_id(Some(organization_id), id)
        .await?
        .ok_or_else(|| document_not_found(id))?;
    Ok(Json(document.into()))
}

#[utoipa::path(
    delete,
    path = "/api/documents/{id}",
    tag = "documents",
    summary = "Delete a document",
    params(("id" = String, Path, description = "Document ID")),
    responses(
        (status = 204, description = "Document and its file removed"),
        (status = 404, description = "Document not found in this organization"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<DocumentId>,
    current_user: RequiresPermission<resource::Documents, operation::DeleteOwn>,
) -> Result<StatusCode> {
    let organization_id = current_user.require_organization()?;
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let document = Documents::new(&mut pool_conn)
        .delete(organization_id, id)
        .await?
        .ok_or_else(|| document_not_found(id))?;

    if let Err(e) = state.storage.delete(&document.storage_key).await {
        tracing::warn!(document_id = %id, "Document row deleted but file removal failed: {}", e);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::models::organizations::{ApprovalStatus, MemberRole},
        test_utils::*,
    };
    use axum_test::multipart::{MultipartForm, Part};
    use sqlx::PgPool;

    fn pdf_upload(document_type: &str, bytes: &[u8]) -> MultipartForm {
        MultipartForm::new().add_text("document_type", document_type.to_string()).add_part(
            "file",
            Part::bytes(bytes.to_vec())
                .file_name("license.pdf")
                .mime_type("application/pdf"),
        )
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_upload_list_and_delete(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let (org, owner) = create_test_organization(&pool, "Licensed Clinic").await;
        let auth = add_auth_headers(&owner);

        let response = app
            .post("/api/documents")
            .add_header(&auth[0].0, &auth[0].1)
            .multipart(pdf_upload("business_license", b"%PDF-1.7 test"))
            .await;
        response.assert_status(StatusCode::CREATED);
        let document: DocumentResponse = response.json();
        assert_eq!(document.organization_id, org.id);
        assert_eq!(document.status, ApprovalStatus::Pending);
        assert_eq!(document.filename, "license.pdf");
        assert_eq!(document.size_bytes, 13);

        let state = create_test_state(pool.clone(), create_test_config()).await;
        let stored = state.storage.get(&document_key(&org.id, &document.id)).await.unwrap();
        assert_eq!(&stored[..], b"%PDF-1.7 test");

        let listed: Vec<DocumentResponse> = app.get("/api/documents").add_header(&auth[0].0, &auth[0].1).await.json();
        assert_eq!(listed.len(), 1);

        app.delete(&format!("/api/documents/{}", document.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        app.get(&format!("/api/documents/{}", document.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_upload_rejections(pool: PgPool) {
        let mut config = create_test_config();
        config.documents.max_file_size = 16;
        let (app, _bg_services) = create_test_app_with_config(pool.clone(), config).await;
        let (org, owner) = create_test_organization(&pool, "Licensed Clinic").await;
        let auth = add_auth_headers(&owner);

        let executable = MultipartForm::new().add_text("document_type", "license").add_part(
            "file",
            Part::bytes(b"MZ".to_vec())
                .file_name("setup.exe")
                .mime_type("application/x-msdownload"),
        );
        app.post("/api/documents")
            .add_header(&auth[0].0, &auth[0].1)
            .multipart(executable)
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        app.post("/api/documents")
            .add_header(&auth[0].0, &auth[0].1)
            .multipart(pdf_upload("license", &[b'x'; 64]))
            .await
            .assert_status(StatusCode::PAYLOAD_TOO_LARGE);

        app.post("/api/documents")
            .add_header(&auth[0].0, &auth[0].1)
            .multipart(pdf_upload("license", b""))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let missing_type = MultipartForm::new().add_part(
            "file",
            Part::bytes(b"%PDF".to_vec())
                .file_name("a.pdf")
                .mime_type("application/pdf"),
        );
        app.post("/api/documents")
            .add_header(&auth[0].0, &auth[0].1)
            .multipart(missing_type)
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let mut conn = pool.acquire().await.unwrap();
        assert!(Documents::new(&mut conn).list_for_organization(org.id).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_documents_are_tenant_scoped(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let (org_a, owner_a) = create_test_organization(&pool, "Tenant A").await;
        let (_org_b, owner_b) = create_test_organization(&pool, "Tenant B").await;
        let member_a = add_test_member(&pool, &org_a, MemberRole::Member).await;

        let document: DocumentResponse = app
            .post("/api/documents")
            .add_header(&add_auth_headers(&owner_a)[0].0, &add_auth_headers(&owner_a)[0].1)
            .multipart(pdf_upload("license", b"%PDF"))
            .await
            .json();

        app.get(&format!("/api/documents/{}", document.id))
            .add_header(&add_auth_headers(&owner_b)[0].0, &add_auth_headers(&owner_b)[0].1)
            .await
            .assert_status(StatusCode::NOT_FOUND);

        // Members can read but not upload or delete
        app.get(&format!("/api/documents/{}", document.id))
            .add_header(&add_auth_headers(&member_a)[0].0, &add_auth_headers(&member_a)[0].1)
            .await
            .assert_status_ok();
        app.delete(&format!("/api/documents/{}", document.id))
            .add_header(&add_auth_headers(&member_a)[0].0, &add_auth_headers(&member_a)[0].1)
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}
