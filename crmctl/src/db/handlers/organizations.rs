//! Database repository for organizations and their members.

use crate::db::{
    errors::Result,
    models::organizations::{
        ApprovalStatus, MemberDBResponse, MemberRole, OrganizationCreateDBRequest, OrganizationDBResponse,
        OrganizationIntegrationsUpdate, OrganizationUpdateDBRequest,
    },
};
use crate::types::{OrganizationId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;

const ORGANIZATION_COLUMNS: &str = "id, name, schema_name, approval_status, approval_note, approved_at, industry, phone, \
     website, address, timezone, payment_customer_id, telephony_account_id, sms_from_number, voice_account_id, \
     email_domain_id, email_domain, created_at, updated_at";

/// Filter for the super-admin organization list
#[derive(Debug, Clone)]
pub struct OrganizationFilter {
    pub approval_status: Option<ApprovalStatus>,
    pub search: Option<String>,
    pub skip: i64,
    pub limit: i64,
}

pub struct Organizations<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Organizations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    pub async fn create(&mut self, request: &OrganizationCreateDBRequest) -> Result<OrganizationDBResponse> {
        let org = sqlx::query_as::<_, OrganizationDBResponse>(&format!(
            "INSERT INTO organizations (name, schema_name, industry, phone, website)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {ORGANIZATION_COLUMNS}"
        ))
        .bind(&request.name)
        .bind(&request.schema_name)
        .bind(&request.industry)
        .bind(&request.phone)
        .bind(&request.website)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(org)
    }

    #[instrument(skip(self), fields(organization_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: OrganizationId) -> Result<Option<OrganizationDBResponse>> {
        let org = sqlx::query_as::<_, OrganizationDBResponse>(&format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(org)
    }

    /// Organizations whose billing account matches a payment-provider customer id
    pub async fn get_by_payment_customer(&mut self, customer_id: &str) -> Result<Option<OrganizationDBResponse>> {
        let org = sqlx::query_as::<_, OrganizationDBResponse>(&format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE payment_customer_id = $1"
        ))
        .bind(customer_id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(org)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn list(&mut self, filter: &OrganizationFilter) -> Result<Vec<OrganizationDBResponse>> {
        let search = filter.search.as_ref().map(|s| format!("%{}%", s.to_lowercase()));
        let orgs = sqlx::query_as::<_, OrganizationDBResponse>(&format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations
             WHERE ($1::text IS NULL OR approval_status = $1)
               AND ($2::text IS NULL OR LOWER(name) LIKE $2)
             ORDER BY created_at DESC, id
             OFFSET $3 LIMIT $4"
        ))
        .bind(filter.approval_status)
        .bind(search)
        .bind(filter.skip)
        .bind(filter.limit)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(orgs)
    }

    pub async fn count(&mut self, filter: &OrganizationFilter) -> Result<i64> {
        let search = filter.search.as_ref().map(|s| format!("%{}%", s.to_lowercase()));
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM organizations
             WHERE ($1::text IS NULL OR approval_status = $1)
               AND ($2::text IS NULL OR LOWER(name) LIKE $2)",
        )
        .bind(filter.approval_status)
        .bind(search)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    /// Apply the allow-listed profile fields. Columns whose value is `None` keep their current value.
    #[instrument(skip(self, request), fields(organization_id = %abbrev_uuid(&id)), err)]
    pub async fn update(&mut self, id: OrganizationId, request: &OrganizationUpdateDBRequest) -> Result<OrganizationDBResponse> {
        let org = sqlx::query_as::<_, OrganizationDBResponse>(&format!(
            "UPDATE organizations SET
                name = COALESCE($2, name),
                industry = COALESCE($3, industry),
                phone = COALESCE($4, phone),
                website = COALESCE($5, website),
                address = COALESCE($6, address),
                timezone = COALESCE($7, timezone),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {ORGANIZATION_COLUMNS}"
        ))
        .bind(id)
        .bind(&request.name)
        .bind(&request.industry)
        .bind(&request.phone)
        .bind(&request.website)
        .bind(&request.address)
        .bind(&request.timezone)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(org)
    }

    #[instrument(skip(self, update), fields(organization_id = %abbrev_uuid(&id)), err)]
    pub async fn update_integrations(
        &mut self,
        id: OrganizationId,
        update: &OrganizationIntegrationsUpdate,
    ) -> Result<OrganizationDBResponse> {
        let org = sqlx::query_as::<_, OrganizationDBResponse>(&format!(
            "UPDATE organizations SET
                payment_customer_id = COALESCE($2, payment_customer_id),
                telephony_account_id = COALESCE($3, telephony_account_id),
                sms_from_number = COALESCE($4, sms_from_number),
                voice_account_id = COALESCE($5, voice_account_id),
                email_domain_id = COALESCE($6, email_domain_id),
                email_domain = COALESCE($7, email_domain),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {ORGANIZATION_COLUMNS}"
        ))
        .bind(id)
        .bind(&update.payment_customer_id)
        .bind(&update.telephony_account_id)
        .bind(&update.sms_from_number)
        .bind(&update.voice_account_id)
        .bind(&update.email_domain_id)
        .bind(&update.email_domain)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(org)
    }

    #[instrument(skip(self, note), fields(organization_id = %abbrev_uuid(&id)), err)]
    pub async fn set_approval_status(
        &mut self,
        id: OrganizationId,
        status: ApprovalStatus,
        note: Option<&str>,
    ) -> Result<OrganizationDBResponse> {
        let org = sqlx::query_as::<_, OrganizationDBResponse>(&format!(
            "UPDATE organizations SET
                approval_status = $2,
                approval_note = $3,
                approved_at = CASE WHEN $2 = 'approved' THEN NOW() ELSE NULL END,
                updated_at = NOW()
             WHERE id = $1
             RETURNING {ORGANIZATION_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .bind(note)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(org)
    }

    /// Delete the organization row; tenant-scoped tables cascade.
    #[instrument(skip(self), fields(organization_id = %abbrev_uuid(&id)), err)]
    pub async fn delete(&mut self, id: OrganizationId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    pub async fn add_member(&mut self, organization_id: OrganizationId, user_id: UserId, role: MemberRole) -> Result<()> {
        sqlx::query("INSERT INTO organization_members (organization_id, user_id, role) VALUES ($1, $2, $3)")
            .bind(organization_id)
            .bind(user_id)
            .bind(role)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    /// The caller's single membership, if any
    pub async fn membership_for_user(&mut self, user_id: UserId) -> Result<Option<MemberDBResponse>> {
        let member = sqlx::query_as::<_, MemberDBResponse>(
            "SELECT m.organization_id, m.user_id, m.role, u.email, u.display_name, m.joined_at
             FROM organization_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(member)
    }

    pub async fn list_members(&mut self, organization_id: OrganizationId) -> Result<Vec<MemberDBResponse>> {
        let members = sqlx::query_as::<_, MemberDBResponse>(
            "SELECT m.organization_id, m.user_id, m.role, u.email, u.display_name, m.joined_at
             FROM organization_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.organization_id = $1
             ORDER BY m.joined_at, u.email",
        )
        .bind(organization_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(members)
    }

    pub async fn count_owners(&mut self, organization_id: OrganizationId) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM organization_members WHERE organization_id = $1 AND role = 'owner'",
        )
        .bind(organization_id)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    pub async fn update_member_role(
        &mut self,
        organization_id: OrganizationId,
        user_id: UserId,
        role: MemberRole,
    ) -> Result<Option<MemberDBResponse>> {
        let updated = sqlx::query("UPDATE organization_members SET role = $3 WHERE organization_id = $1 AND user_id = $2")
            .bind(organization_id)
            .bind(user_id)
            .bind(role)
            .execute(&mut *self.db)
            .await?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.membership_for_user(user_id).await
    }

    pub async fn remove_member(&mut self, organization_id: OrganizationId, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM organization_members WHERE organization_id = $1 AND user_id = $2")
            .bind(organization_id)
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
