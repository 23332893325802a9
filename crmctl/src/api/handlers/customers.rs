use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        customers::{CustomerCreate, CustomerResponse, CustomerUpdate, ListCustomersQuery},
        pagination::PaginatedResponse,
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Customers, Repository, customers::CustomerFilter},
        models::customers::CustomerCreateDBRequest,
    },
    errors::{Error, Result},
    types::CustomerId,
};

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn customer_not_found(id: CustomerId) -> Error {
    Error::NotFound {
        resource: "Customer".to_string(),
        id: id.to_string(),
    }
}

#[utoipa::path(
    get,
    path = "/api/customers",
    tag = "customers",
    summary = "List customers",
    params(ListCustomersQuery),
    responses(
        (status = 200, description = "Page of customers", body = PaginatedResponse<CustomerResponse>),
        (status = 403, description = "Not a member of an organization"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<ListCustomersQuery>,
    current_user: RequiresPermission<resource::Customers, operation::ReadOwn>,
) -> Result<Json<PaginatedResponse<CustomerResponse>>> {
    let organization_id = current_user.require_organization()?;
    let (skip, limit) = query.pagination.params();
    let filter = CustomerFilter {
        status: query.status,
        search: non_empty(query.search),
        tag: non_empty(query.tag),
        ..CustomerFilter::new(organization_id, skip, limit)
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Customers::new(&mut pool_conn);
    let customers = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        customers.into_iter().map(Into::into).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/api/customers",
    tag = "customers",
    summary = "Create a customer",
    request_body = CustomerCreate,
    responses(
        (status = 201, description = "Customer created", body = CustomerResponse),
        (status = 400, description = "Missing name"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_customer(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Customers, operation::CreateOwn>,
    Json(request): Json<CustomerCreate>,
) -> Result<(StatusCode, Json<CustomerResponse>)> {
    let organization_id = current_user.require_organization()?;
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::BadRequest {
            message: "Customer name is required".to_string(),
        });
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let customer = Customers::new(&mut pool_conn)
        .create(&CustomerCreateDBRequest {
            organization_id,
            name,
            email: non_empty(request.email).map(|e| e.to_lowercase()),
            phone: non_empty(request.phone),
            company: non_empty(request.company),
            status: request.status,
            notes: request.notes,
            tags: request.tags,
            created_by: current_user.id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(customer.into())))
}

#[utoipa::path(
    get,
    path = "/api/customers/{id}",
    tag = "customers",
    summary = "Get a customer",
    params(("id" = String, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Customer", body = CustomerResponse),
        (status = 404, description = "Customer not found in this organization"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
    current_user: RequiresPermission<resource::Customers, operation::ReadOwn>,
) -> Result<Json<CustomerResponse>> {
    let organization_id = current_user.require_organization()?;
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let customer = Customers::new(&mut pool_conn)
        .get_by_id(organization_id, id)
        .await?
        .ok_or_else(|| customer_not_found(id))?;
    Ok(Json(customer.into()))
}

#[utoipa::path(
    patch,
    path = "/api/customers/{id}",
    tag = "customers",
    summary = "Update a customer",
    params(("id" = String, Path, description = "Customer ID")),
    request_body = CustomerUpdate,
    responses(
        (status = 200, description = "Updated customer", body = CustomerResponse),
        (status = 404, description = "Customer not found in this organization"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
    current_user: RequiresPermission<resource::Customers, operation::UpdateOwn>,
    Json(request): Json<CustomerUpdate>,
) -> Result<Json<CustomerResponse>> {
    let organization_id = current_user.require_organization()?;
    if request.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(Error::BadRequest {
            message: "Customer name cannot be empty".to_string(),
        });
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Customers::new(&mut pool_conn);
    if repo.get_by_id(organization_id, id).await?.is_none() {
        return Err(customer_not_found(id));
    }
    let customer = repo.update(organization_id, id, &request.into()).await?;
    Ok(Json(customer.into()))
}

#[utoipa::path(
    delete,
    path = "/api/customers/{id}",
    tag = "customers",
    summary = "Delete a customer",
    params(("id" = String, Path, description = "Customer ID")),
    responses(
        (status = 204, description = "Customer deleted"),
        (status = 404, description = "Customer not found in this organization"),
    ),
    security(("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_customer(
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
    current_user: RequiresPermission<resource::Customers, operation::DeleteOwn>,
) -> Result<StatusCode> {
    let organization_id = current_user.require_organization()?;
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Customers::new(&mut pool_conn).delete(organization_id, id).await? {
        return Err(customer_not_found(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::models::customers::CustomerStatus, test_utils::*};
    use serde_json::{Value, json};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_customer_crud(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let (_org, owner) = create_test_organization(&pool, "Bright Smiles").await;
        let auth = add_auth_headers(&owner);

        let response = app
            .post("/api/customers")
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({"name": "  Dana Scully ", "email": "Dana@FBI.gov", "tags": ["vip"]}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: CustomerResponse = response.json();
        assert_eq!(created.name, "Dana Scully");
        assert_eq!(created.email.as_deref(), Some("dana@fbi.gov"));
        assert_eq!(created.status, CustomerStatus::Lead);

        let response = app
            .patch(&format!("/api/customers/{}", created.id))
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({"status": "active", "notes": "Prefers mornings"}))
            .await;
        response.assert_status_ok();
        let updated: CustomerResponse = response.json();
        assert_eq!(updated.status, CustomerStatus::Active);
        assert_eq!(updated.name, "Dana Scully");
        assert_eq!(updated.notes.as_deref(), Some("Prefers mornings"));

        app.get(&format!("/api/customers/{}", created.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status_ok();

        app.delete(&format!("/api/customers/{}", created.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        app.get(&format!("/api/customers/{}", created.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_filters_and_paginates(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let (_org, owner) = create_test_organization(&pool, "Bright Smiles").await;
        let auth = add_auth_headers(&owner);

        for (name, status, tags) in [
            ("Alice", "lead", json!(["vip"])),
            ("Bob", "active", json!([])),
            ("Carol", "active", json!(["vip"])),
        ] {
            app.post("/api/customers")
                .add_header(&auth[0].0, &auth[0].1)
                .json(&json!({"name": name, "status": status, "tags": tags}))
                .await
                .assert_status(StatusCode::CREATED);
        }

        let page: Value = app
            .get("/api/customers?status=active&limit=1")
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .json();
        assert_eq!(page["total_count"], 2);
        assert_eq!(page["data"].as_array().unwrap().len(), 1);

        let page: Value = app
            .get("/api/customers?tag=vip&search=car")
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .json();
        assert_eq!(page["total_count"], 1);
        assert_eq!(page["data"][0]["name"], "Carol");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_customers_are_isolated_between_organizations(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let (_org_a, owner_a) = create_test_organization(&pool, "Tenant A").await;
        let (_org_b, owner_b) = create_test_organization(&pool, "Tenant B").await;

        let created: CustomerResponse = app
            .post("/api/customers")
            .add_header(&add_auth_headers(&owner_a)[0].0, &add_auth_headers(&owner_a)[0].1)
            .json(&json!({"name": "Private"}))
            .await
            .json();

        let auth_b = add_auth_headers(&owner_b);
        app.get(&format!("/api/customers/{}", created.id))
            .add_header(&auth_b[0].0, &auth_b[0].1)
            .await
            .assert_status(StatusCode::NOT_FOUND);
        app.patch(&format!("/api/customers/{}", created.id))
            .add_header(&auth_b[0].0, &auth_b[0].1)
            .json(&json!({"name": "Stolen"}))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        app.delete(&format!("/api/customers/{}", created.id))
            .add_header(&auth_b[0].0, &auth_b[0].1)
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let page: Value = app.get("/api/customers").add_header(&auth_b[0].0, &auth_b[0].1).await.json();
        assert_eq!(page["total_count"], 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_users_without_organization_are_forbidden(pool: PgPool) {
        let (app, _bg_services) = create_test_app(pool.clone()).await;
        let loner = create_test_user(&pool, "loner@example.com").await;

        app.get("/api/customers")
            .add_header(&add_auth_headers(&loner)[0].0, &add_auth_headers(&loner)[0].1)
            .await
            .assert_status(StatusCode::FORBIDDEN);
        app.post("/api/customers")
            .add_header(&add_auth_headers(&loner)[0].0, &add_auth_headers(&loner)[0].1)
            .json(&json!({"name": ""}))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}
