//! Database repository for CRM customers.

use crate::db::{
    errors::Result,
    handlers::repository::Repository,
    models::customers::{CustomerCreateDBRequest, CustomerDBResponse, CustomerStatus, CustomerUpdateDBRequest},
};
use crate::types::{CustomerId, OrganizationId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;

const CUSTOMER_COLUMNS: &str =
    "id, organization_id, name, email, phone, company, status, notes, tags, created_by, created_at, updated_at";

/// Filter for listing customers
#[derive(Debug, Clone)]
pub struct CustomerFilter {
    pub organization_id: OrganizationId,
    pub status: Option<CustomerStatus>,
    /// Case-insensitive match on name, email, phone or company
    pub search: Option<String>,
    pub tag: Option<String>,
    pub skip: i64,
    pub limit: i64,
}

impl CustomerFilter {
    pub fn new(organization_id: OrganizationId, skip: i64, limit: i64) -> Self {
        Self {
            organization_id,
            status: None,
            search: None,
            tag: None,
            skip,
            limit,
        }
    }
}

pub struct Customers<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Customers<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    pub async fn count(&mut self, filter: &CustomerFilter) -> Result<i64> {
        let search = filter.search.as_ref().map(|s| format!("%{}%", s.to_lowercase()));
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM customers
             WHERE organization_id = $1
               AND ($2::text IS NULL OR status = $2)
               AND ($3::text IS NULL OR LOWER(name) LIKE $3 OR LOWER(COALESCE(email, '')) LIKE $3
                    OR COALESCE(phone, '') LIKE $3 OR LOWER(COALESCE(company, '')) LIKE $3)
               AND ($4::text IS NULL OR $4 = ANY(tags))",
        )
        .bind(filter.organization_id)
        .bind(filter.status)
        .bind(search)
        .bind(&filter.tag)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Customers<'c> {
    type CreateRequest = CustomerCreateDBRequest;
    type UpdateRequest = CustomerUpdateDBRequest;
    type Response = CustomerDBResponse;
    type Id = CustomerId;
    type Filter = CustomerFilter;

    #[instrument(skip(self, request), fields(organization_id = %abbrev_uuid(&request.organization_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let customer = sqlx::query_as::<_, CustomerDBResponse>(&format!(
            "INSERT INTO customers (organization_id, name, email, phone, company, status, notes, tags, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {CUSTOMER_COLUMNS}"
        ))
        .bind(request.organization_id)
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(&request.company)
        .bind(request.status)
        .bind(&request.notes)
        .bind(&request.tags)
        .bind(request.created_by)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(customer)
    }

    #[instrument(skip(self), fields(customer_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, organization_id: OrganizationId, id: Self::Id) -> Result<Option<Self::Response>> {
        let customer = sqlx::query_as::<_, CustomerDBResponse>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1 AND organization_id = $2"
        ))
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(customer)
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let search = filter.search.as_ref().map(|s| format!("%{}%", s.to_lowercase()));
        let customers = sqlx::query_as::<_, CustomerDBResponse>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers
             WHERE organization_id = $1
               AND ($2::text IS NULL OR status = $2)
               AND ($3::text IS NULL OR LOWER(name) LIKE $3 OR LOWER(COALESCE(email, '')) LIKE $3
                    OR COALESCE(phone, '') LIKE $3 OR LOWER(COALESCE(company, '')) LIKE $3)
               AND ($4::text IS NULL OR $4 = ANY(tags))
             ORDER BY created_at DESC, id
             OFFSET $5 LIMIT $6"
        ))
        .bind(filter.organization_id)
        .bind(filter.status)
        .bind(search)
        .bind(&filter.tag)
        .bind(filter.skip)
        .bind(filter.limit)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(customers)
    }

    #[instrument(skip(self), fields(customer_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, organization_id: OrganizationId, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM customers WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(organization_id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(customer_id = %abbrev_uuid(&id)), err)]
    async fn update(
        &mut self,
        organization_id: OrganizationId,
        id: Self::Id,
        request: &Self::UpdateRequest,
    ) -> Result<Self::Response> {
        let customer = sqlx::query_as::<_, CustomerDBResponse>(&format!(
            "UPDATE customers SET
                name = COALESCE($3, name),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                company = COALESCE($6, company),
                status = COALESCE($7, status),
                notes = COALESCE($8, notes),
                tags = COALESCE($9, tags),
                updated_at = NOW()
             WHERE id = $1 AND organization_id = $2
             RETURNING {CUSTOMER_COLUMNS}"
        ))
        .bind(id)
        .bind(organization_id)
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(&request.company)
        .bind(request.status)
        .bind(&request.notes)
        .bind(&request.tags)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(customer)
    }
}
