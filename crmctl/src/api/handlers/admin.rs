//! Super-admin operations across tenants.
//!
//! Every handler here requires an `*All` permission, which only super-admins hold.
//! Organization and document reviews append to the approval history in the same
//! transaction as the status change.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{StatusCode, header},
};

use crate::{
    AppState,
    api::{
        handlers::organization::fetch_organization,
        models::{
            admin::{AdminOrganizationDetail, ApprovalEventResponse, ListOrganizationsQuery},
            credits::{AdminCreditAdjustment, CreditTransactionResponse, ReconciliationResponse},
            documents::{DocumentResponse, ListDocumentsQuery, ReviewRequest},
            organizations::OrganizationResponse,
            pagination::PaginatedResponse,
        },
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Approvals, Credits, Documents, Organizations, organizations::OrganizationFilter},
        models::{
            approvals::{ApprovalEventCreateDBRequest, ApprovalSubject},
            credits::{CreditTransactionCreateDBRequest, CreditTransactionType},
            organizations::{ApprovalStatus, MemberRole, OrganizationDBResponse},
        },
    },
    errors::{Error, Result},
    types::{DocumentId, OrganizationId},
};

/// Reviews move an item out of `pending`; they never put it back.
fn validate_review(review: &ReviewRequest) -> Result<Option<String>> {
    if review.status == ApprovalStatus::Pending {
        return Err(Error::BadRequest {
            message: "A review must approve, reject or request more information".to_string(),
        });
    }
    let note = review.note.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
    if review.status == ApprovalStatus::RequiresInfo && note.is_none() {
        return Err(Error::BadRequest {
            message: "Requesting more information needs a note for the organization".to_string(),
        });
    }
    Ok(note)
}

#[utoipa::path(
    get,
    path = "/api/admin/organizations",
    tag = "admin",
    summary = "List organizations",
    params(ListOrganizationsQuery),
    responses(
        (status = 200, description = "Page of organizations", body = PaginatedResponse<OrganizationResponse>),
        (status = 403, description = "Super-admin only"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_organizations(
    State(state): State<AppState>,
    Query(query): Query<ListOrganizationsQuery>,
    _: RequiresPermission<resource::Organizations, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<OrganizationResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = OrganizationFilter {
        approval_status: query.approval_status,
        search: query.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        skip,
        limit,
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Organizations::new(&mut pool_conn);
    let organizations = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        organizations.into_iter().map(Into::into).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    get,
    path = "/api/admin/organizations/{id}",
    tag = "admin",
    summary = "Organization detail",
    params(("id" = String, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Organization with balance, members and documents", body = AdminOrganizationDetail),
        (status = 404, description = "Organization not found"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_organization(
    State(state): State<AppState>,
    Path(id): Path<OrganizationId>,
    _: RequiresPermission<resource::Organizations, operation::ReadAll>,
) -> Result<Json<AdminOrganizationDetail>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let organization = fetch_organization(&mut pool_conn, id).await?;
    let balance = Credits::new(&mut pool_conn).get_balance(id).await?;
    let members = Organizations::new(&mut pool_conn).list_members(id).await?;
    let documents = Documents::new(&mut pool_conn).list_for_organization(id).await?;

    Ok(Json(AdminOrganizationDetail {
        organization: organization.into(),
        balance,
        members: members.into_iter().map(Into::into).collect(),
        documents: documents.into_iter().map(Into::into).collect(),
    }))
}

/// Tell every owner about a decision; delivery problems are logged, not surfaced.
async fn notify_owners(state: &AppState, organization: &OrganizationDBResponse) {
    let members = match state.db.acquire().await {
        Ok(mut conn) => Organizations::new(&mut conn).list_members(organization.id).await,
        Err(e) => Err(e.into()),
    };
    let owners = match members {
        Ok(members) => members.into_iter().filter(|m| m.role == MemberRole::Owner),
        Err(e) => {
            tracing::warn!(organization_id = %organization.id, "Could not load owners for approval email: {}", e);
            return;
        }
    };

    for owner in owners {
        if let Err(e) = state
            .mailer
            .send_approval_decision(
                &owner.email,
                &organization.name,
                organization.approval_status,
                organization.approval_note.as_deref(),
                &state.config.dashboard_url,
            )
            .await
        {
            tracing::warn!(organization_id = %organization.id, "Approval email to owner failed: {}", e);
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/admin/organizations/{id}/review",
    tag = "admin",
    summary = "Review an organization",
    params(("id" = String, Path, description = "Organization ID")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Decision recorded", body = OrganizationResponse),
        (status = 400, description = "Invalid decision"),
        (status = 404, description = "Organization not found"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn review_organization(
    State(state): State<AppState>,
    Path(id): Path<OrganizationId>,
    current_user: RequiresPermission<resource::Approvals, operation::UpdateAll>,
    Json(review): Json<ReviewRequest>,
) -> Result<Json<OrganizationResponse>> {
    let note = validate_review(&review)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    fetch_organization(&mut tx, id).await?;
    let organization = Organizations::new(&mut tx)
        .set_approval_status(id, review.status, note.as_deref())
        .await?;
    Approvals::new(&mut tx)
        .record(&ApprovalEventCreateDBRequest {
            organization_id: id,
            subject_type: ApprovalSubject::Organization,
            subject_id: id,
            status: review.status,
            note,
            reviewer_id: current_user.id,
        })
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    tracing::info!(
        organization_id = %id,
        status = review.status.as_str(),
        reviewer = %current_user.id,
        "Organization reviewed"
    );
    notify_owners(&state, &organization).await;

    Ok(Json(organization.into()))
}

#[utoipa::path(
    get,
    path = "/api/admin/organizations/{id}/approvals",
    tag = "admin",
    summary = "Approval history",
    params(("id" = String, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Review decisions, newest first", body = [ApprovalEventResponse]),
        (status = 404, description = "Organization not found"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_approvals(
    State(state): State<AppState>,
    Path(id): Path<OrganizationId>,
    _: RequiresPermission<resource::Approvals, operation::ReadAll>,
) -> Result<Json<Vec<ApprovalEventResponse>>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    fetch_organization(&mut pool_conn, id).await?;
    let events = Approvals::new(&mut pool_conn).list_for_organization(id).await?;
    Ok(Json(events.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/api/admin/organizations/{id}/credits",
    tag = "admin",
    summary = "Grant or remove credits",
    params(("id" = String, Path, description = "Organization ID")),
    request_body = AdminCreditAdjustment,
    responses(
        (status = 201, description = "Ledger entry written", body = CreditTransactionResponse),
        (status = 400, description = "Amount must be positive"),
        (status = 402, description = "Removal would make the balance negative"),
        (status = 404, description = "Organization not found"),
        (status = 409, description = "Reference already used"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn adjust_credits(
    State(state): State<AppState>,
    Path(id): Path<OrganizationId>,
    current_user: RequiresPermission<resource::Credits, operation::CreateAll>,
    Json(adjustment): Json<AdminCreditAdjustment>,
) -> Result<(StatusCode, Json<CreditTransactionResponse>)> {
    if adjustment.amount <= rust_decimal::Decimal::ZERO {
        return Err(Error::BadRequest {
            message: "Amount must be greater than zero".to_string(),
        });
    }

    let transaction_type = CreditTransactionType::from(adjustment.kind);
    let mut request = CreditTransactionCreateDBRequest::new(id, transaction_type, adjustment.amount).created_by(current_user.id);
    request.description = adjustment.description;
    request.reference = adjustment.reference;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    fetch_organization(&mut pool_conn, id).await?;
    let transaction = Credits::new(&mut pool_conn).create_transaction(&request).await.map_err(|e| {
        if e.is_duplicate_reference() {
            Error::Conflict {
                message: "An adjustment with this reference already exists".to_string(),
            }
        } else {
            Error::Database(e)
        }
    })?;

    tracing::info!(
        organization_id = %id,
        transaction_type = transaction_type.as_str(),
        amount = %adjustment.amount,
        admin = %current_user.id,
        "Manual credit adjustment"
    );
    Ok((StatusCode::CREATED, Json(transaction.into())))
}

#[utoipa::path(
    get,
    path = "/api/admin/organizations/{id}/credits/reconciliation",
    tag = "admin",
    summary = "Check the balance against the ledger",
    params(("id" = String, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Stored balance and ledger sum", body = ReconciliationResponse),
        (status = 404, description = "Organization not found"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn reconcile_credits(
    State(state): State<AppState>,
    Path(id): Path<OrganizationId>,
    _: RequiresPermission<resource::Credits, operation::ReadAll>,
) -> Result<Json<ReconciliationResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    fetch_organization(&mut pool_conn, id).await?;
    let reconciliation: ReconciliationResponse = Credits::new(&mut pool_conn).reconcile(id).await?.into();
    if !reconciliation.consistent {
        tracing::error!(
            organization_id = %id,
            stored = %reconciliation.stored_balance,
            ledger = %reconciliation.ledger_sum,
            "Credit balance does not match ledger"
        );
    }
    Ok(Json(reconciliation))
}

#[utoipa::path(
    get,
    path = "/api/admin/documents",
    tag = "admin",
    summary = "Document review queue",
    params(ListDocumentsQuery),
    responses(
        (status = 200, description = "Documents across all organizations, oldest first", body = [DocumentResponse]),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<ListDocumentsQuery>,
    _: RequiresPermission<resource::Documents, operation::ReadAll>,
) -> Result<Json<Vec<DocumentResponse>>> {
    let (skip, limit) = query.pagination.params();
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let documents = Documents::new(&mut pool_conn).list_by_status(query.status, skip, limit).await?;
    Ok(Json(documents.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/api/admin/documents/{id}/content",
    tag = "admin",
    summary = "Download a document under review",
    params(("id" = String, Path, description = "Document ID")),
    responses(
        (status = 200, description = "The stored file, served with its uploaded content type"),
        (status = 404, description = "Document not found"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_document_content(
    State(state): State<AppState>,
    Path(id): Path<DocumentId>,
    _: RequiresPermission<resource::Documents, operation::ReadAll>,
) -> Result<([(header::HeaderName, String); 2], Bytes)> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let document = Documents::new(&mut pool_conn)
        .get_by_id(None, id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Document".to_string(),
            id: id.to_string(),
        })?;
    let content = state.storage.get(&document.storage_key).await?;

    let filename: String = document
        .filename
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    Ok((
        [
            (header::CONTENT_TYPE, document.content_type),
            (header::CONTENT_DISPOSITION, format!("inline; filename=\"{filename}\"")),
        ],
        content,
    ))
}

#[utoipa::path(
    post,
    path = "/api/admin/documents/{id}/review",
    tag = "admin",
    summary = "Review a document",
    params(("id" = String, Path, description = "Document ID")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Decision recorded", body = DocumentResponse),
        (status = 400, description = "Invalid decision"),
        (status = 404, description = "Document not found"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn review_document(
    State(state): State<AppState>,
    Path(id): Path<DocumentId>,
    current_user: RequiresPermission<resource::Approvals, operation::UpdateAll>,
    Json(review): Json<ReviewRequest>,
) -> Result<Json<DocumentResponse>> {
    let note = validate_review(&review)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut documents = Documents::new(&mut tx);
    documents.get_by_id(None, id).await?.ok_or_else(|| Error::NotFound {
        resource: "Document".to_string(),
        id: id.to_string(),
    })?;
    let document = documents.review(id, review.status, note.as_deref(), current_user.id).await?;
    Approvals::new(&mut tx)
        .record(&ApprovalEventCreateDBRequest {
            organization_id: document.organization_id,
            subject_type: ApprovalSubject::Document,
            subject_id: id,
            status: review.status,
            note,
            reviewer_id: current_user.id,
        })
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    tracing::info!(document_id = %id, status = review.status.as_str(), "Document reviewed");
    Ok(Json(document.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use rust_decimal::Decimal;
    use serde_json::{Value, json};
    use sqlx::PgPool;

    #[test]
    fn test_validate_review() {
        let review = |status, note: Option<&str>| ReviewRequest {
            status,
            note: note.map(str::to_string),
        };
        assert!(validate_review(&review(ApprovalStatus::Pending, None)).is_err());
        assert!(validate_review(&review(ApprovalStatus::RequiresInfo, Some("  "))).is_err());
        assert_eq!(validate_review(&review(ApprovalStatus::Approved, Some(""))).unwrap(), None);
        assert_eq!(
            validate_review(&review(ApprovalStatus::Rejected, Some(" duplicate "))).unwrap(),
            Some("duplicate".to_string())
        );
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_admin_routes_require_super_admin(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let (org, owner) = create_test_organization(&pool, "Tenant").await;
        let auth = add_auth_headers(&owner);

        for path in [
            "/api/admin/organizations".to_string(),
            format!("/api/admin/organizations/{}", org.id),
            format!("/api/admin/organizations/{}/approvals", org.id),
            "/api/admin/documents".to_string(),
            format!("/api/admin/documents/{}/content", uuid::Uuid::new_v4()),
        ] {
            app.get(&path).add_header(&auth[0].0, &auth[0].1).await.assert_status(StatusCode::FORBIDDEN);
        }
        app.post(&format!("/api/admin/organizations/{}/review", org.id))
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "status": "approved" }))
            .await
            .assert_status(StatusCode::FORBIDDEN);
        app.post(&format!("/api/admin/organizations/{}/credits", org.id))
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "kind": "grant", "amount": "100" }))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_review_organization_records_history(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let admin = create_test_super_admin(&pool).await;
        let auth = add_auth_headers(&admin);
        let (pending, _) = create_test_organization(&pool, "Pending Clinic").await;
        let (approved, _) = create_test_organization(&pool, "Approved Clinic").await;
        approve_test_organization(&pool, &approved).await;

        let page: Value = app
            .get("/api/admin/organizations?approval_status=pending")
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .json();
        assert_eq!(page["total_count"], 1);
        assert_eq!(page["data"][0]["id"], pending.id.to_string());

        let response = app
            .post(&format!("/api/admin/organizations/{}/review", pending.id))
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "status": "requires_info", "note": "Upload a business license" }))
            .await;
        response.assert_status_ok();
        let reviewed: OrganizationResponse = response.json();
        assert_eq!(reviewed.approval_status, ApprovalStatus::RequiresInfo);

        app.post(&format!("/api/admin/organizations/{}/review", pending.id))
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "status": "approved" }))
            .await
            .assert_status_ok();

        let history: Vec<ApprovalEventResponse> = app
            .get(&format!("/api/admin/organizations/{}/approvals", pending.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .json();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|e| e.reviewer_id == Some(admin.id)));
        assert!(history.iter().any(|e| e.status == ApprovalStatus::Approved));

        app.post(&format!("/api/admin/organizations/{}/review", uuid::Uuid::new_v4()))
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "status": "approved" }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        app.post(&format!("/api/admin/organizations/{}/review", pending.id))
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "status": "pending" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_credit_adjustments_and_reconciliation(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let admin = create_test_super_admin(&pool).await;
        let auth = add_auth_headers(&admin);
        let (org, _) = create_test_organization(&pool, "Tenant").await;
        let credits_path = format!("/api/admin/organizations/{}/credits", org.id);

        app.post(&credits_path)
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "kind": "grant", "amount": "0" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        app.post(&credits_path)
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "kind": "grant", "amount": "0.00005" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        app.post(&credits_path)
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "kind": "grant", "amount": "100", "reference": "goodwill-1" }))
            .await
            .assert_status(StatusCode::CREATED);
        app.post(&credits_path)
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "kind": "grant", "amount": "100", "reference": "goodwill-1" }))
            .await
            .assert_status(StatusCode::CONFLICT);

        app.post(&credits_path)
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "kind": "removal", "amount": "150" }))
            .await
            .assert_status(StatusCode::PAYMENT_REQUIRED);

        app.post(&credits_path)
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "kind": "removal", "amount": "40", "description": "Correction" }))
            .await
            .assert_status(StatusCode::CREATED);

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(Credits::new(&mut conn).get_balance(org.id).await.unwrap(), Decimal::from(60));

        let reconciliation: ReconciliationResponse = app
            .get(&format!("/api/admin/organizations/{}/credits/reconciliation", org.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .json();
        assert!(reconciliation.consistent);
        assert_eq!(reconciliation.transaction_count, 2);

        let detail: Value = app
            .get(&format!("/api/admin/organizations/{}", org.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .json();
        assert_eq!(detail["members"].as_array().unwrap().len(), 1);
        assert_eq!(detail["name"], "Tenant");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_document_queue_and_review(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let admin = create_test_super_admin(&pool).await;
        let auth = add_auth_headers(&admin);
        let (org, owner) = create_test_organization(&pool, "Tenant").await;

        let form = axum_test::multipart::MultipartForm::new().add_text("document_type", "license").add_part(
            "file",
            axum_test::multipart::Part::bytes(b"%PDF".to_vec())
                .file_name("license.pdf")
                .mime_type("application/pdf"),
        );
        let document: DocumentResponse = app
            .post("/api/documents")
            .add_header(&add_auth_headers(&owner)[0].0, &add_auth_headers(&owner)[0].1)
            .multipart(form)
            .await
            .json();

        let queue: Vec<DocumentResponse> = app
            .get("/api/admin/documents?status=pending")
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .json();
        assert_eq!(queue.len(), 1);

        // The reviewer can open the file before deciding
        let content = app
            .get(&format!("/api/admin/documents/{}/content", document.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await;
        content.assert_status_ok();
        assert_eq!(content.header("content-type").to_str().unwrap(), "application/pdf");
        assert_eq!(
            content.header("content-disposition").to_str().unwrap(),
            "inline; filename=\"license.pdf\""
        );
        assert_eq!(content.as_bytes().as_ref(), b"%PDF");

        app.get(&format!("/api/admin/documents/{}/content", uuid::Uuid::new_v4()))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status_not_found();

        let response = app
            .post(&format!("/api/admin/documents/{}/review", document.id))
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "status": "approved" }))
            .await;
        response.assert_status_ok();
        let reviewed: DocumentResponse = response.json();
        assert_eq!(reviewed.status, ApprovalStatus::Approved);

        let queue: Vec<DocumentResponse> = app
            .get("/api/admin/documents?status=pending")
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .json();
        assert!(queue.is_empty());

        let mut conn = pool.acquire().await.unwrap();
        let history = Approvals::new(&mut conn).list_for_organization(org.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].subject_type, ApprovalSubject::Document);
        assert_eq!(history[0].subject_id, document.id);
    }
}
