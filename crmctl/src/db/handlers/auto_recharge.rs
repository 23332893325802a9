//! Auto-recharge settings, the attempt journal and the per-tenant check lock.

use crate::db::{
    errors::Result,
    models::auto_recharge::{
        AttemptCreateDBRequest, AttemptDBResponse, AttemptStatus, AutoRechargeSettingsDBResponse, AutoRechargeSettingsUpsertDBRequest,
    },
};
use crate::types::{AttemptId, OrganizationId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const SETTINGS_COLUMNS: &str =
    "organization_id, enabled, minimum_balance, package_id, payment_method_id, last_triggered_at, last_status, last_error, updated_at";
const ATTEMPT_COLUMNS: &str = "id, organization_id, trigger, package_id, amount_cents, credits, balance_before, status, \
     payment_reference, error, created_at, completed_at";

/// Mixed into every auto-recharge lock key
const RECHARGE_LOCK_NAMESPACE: u64 = 0x4352_4d01_0000_0000;

/// Derive a 64-bit advisory lock key from an organization id
pub fn recharge_lock_key(organization_id: &OrganizationId) -> i64 {
    let (high, low) = organization_id.as_u64_pair();
    (high ^ low ^ RECHARGE_LOCK_NAMESPACE) as i64
}

pub struct AutoRecharge<'c> {
    db: &'c mut PgConnection,
}

impl<'c> AutoRecharge<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Settings for an organization, or disabled defaults when none were saved
    pub async fn get_settings(&mut self, organization_id: OrganizationId) -> Result<AutoRechargeSettingsDBResponse> {
        let settings = sqlx::query_as::<_, AutoRechargeSettingsDBResponse>(&format!(
            "SELECT {SETTINGS_COLUMNS} FROM auto_recharge_settings WHERE organization_id = $1"
        ))
        .bind(organization_id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(settings.unwrap_or_else(|| AutoRechargeSettingsDBResponse::disabled(organization_id)))
    }

    #[instrument(skip(self, request), fields(organization_id = %abbrev_uuid(&organization_id), enabled = request.enabled), err)]
    pub async fn upsert_settings(
        &mut self,
        organization_id: OrganizationId,
        request: &AutoRechargeSettingsUpsertDBRequest,
    ) -> Result<AutoRechargeSettingsDBResponse> {
        let settings = sqlx::query_as::<_, AutoRechargeSettingsDBResponse>(&format!(
            "INSERT INTO auto_recharge_settings (organization_id, enabled, minimum_balance, package_id, payment_method_id)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (organization_id) DO UPDATE SET
                enabled = EXCLUDED.enabled,
                minimum_balance = EXCLUDED.minimum_balance,
                package_id = EXCLUDED.package_id,
                payment_method_id = EXCLUDED.payment_method_id,
                updated_at = NOW()
             RETURNING {SETTINGS_COLUMNS}"
        ))
        .bind(organization_id)
        .bind(request.enabled)
        .bind(request.minimum_balance)
        .bind(&request.package_id)
        .bind(&request.payment_method_id)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(settings)
    }

    /// Organizations with auto-recharge switched on
    pub async fn list_enabled_organizations(&mut self) -> Result<Vec<OrganizationId>> {
        let ids = sqlx::query_scalar::<_, OrganizationId>(
            "SELECT organization_id FROM auto_recharge_settings WHERE enabled ORDER BY organization_id",
        )
        .fetch_all(&mut *self.db)
        .await?;
        Ok(ids)
    }

    pub async fn record_outcome(&mut self, organization_id: OrganizationId, status: &str, error: Option<&str>) -> Result<()> {
        sqlx::query(
            "UPDATE auto_recharge_settings
             SET last_triggered_at = NOW(), last_status = $2, last_error = $3
             WHERE organization_id = $1",
        )
        .bind(organization_id)
        .bind(status)
        .bind(error)
        .execute(&mut *self.db)
        .await?;
        Ok(())
    }

    /// Try to take the check lock for an organization without waiting.
    ///
    /// Must run inside a transaction; the lock is released when it commits or rolls back.
    pub async fn try_xact_lock(&mut self, organization_id: &OrganizationId) -> Result<bool> {
        let acquired = sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_xact_lock($1::bigint)")
            .bind(recharge_lock_key(organization_id))
            .fetch_one(&mut *self.db)
            .await?;
        Ok(acquired)
    }

    pub async fn create_attempt(&mut self, request: &AttemptCreateDBRequest) -> Result<AttemptDBResponse> {
        let attempt = sqlx::query_as::<_, AttemptDBResponse>(&format!(
            "INSERT INTO auto_recharge_attempts (organization_id, trigger, package_id, amount_cents, credits, balance_before)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(request.organization_id)
        .bind(request.trigger)
        .bind(&request.package_id)
        .bind(request.amount_cents)
        .bind(request.credits)
        .bind(request.balance_before)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(attempt)
    }

    pub async fn complete_attempt(
        &mut self,
        id: AttemptId,
        status: AttemptStatus,
        payment_reference: Option<&str>,
        error: Option<&str>,
    ) -> Result<AttemptDBResponse> {
        let attempt = sqlx::query_as::<_, AttemptDBResponse>(&format!(
            "UPDATE auto_recharge_attempts
             SET status = $2, payment_reference = $3, error = $4, completed_at = NOW()
             WHERE id = $1
             RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .bind(payment_reference)
        .bind(error)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(attempt)
    }

    /// Attach the provider charge id to an attempt that is still settling
    pub async fn set_attempt_reference(&mut self, id: AttemptId, payment_reference: &str) -> Result<()> {
        sqlx::query("UPDATE auto_recharge_attempts SET payment_reference = $2 WHERE id = $1")
            .bind(id)
            .bind(payment_reference)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    /// Mark the attempt carrying a provider charge id as settled
    pub async fn complete_attempt_by_reference(&mut self, payment_reference: &str, status: AttemptStatus) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE auto_recharge_attempts SET status = $2, completed_at = NOW()
             WHERE payment_reference = $1 AND status = 'pending'",
        )
        .bind(payment_reference)
        .bind(status)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected())
    }

    /// Most recent attempt still waiting on the provider, created after `since`
    pub async fn find_pending_attempt(
        &mut self,
        organization_id: OrganizationId,
        since: DateTime<Utc>,
    ) -> Result<Option<AttemptDBResponse>> {
        let attempt = sqlx::query_as::<_, AttemptDBResponse>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM auto_recharge_attempts
             WHERE organization_id = $1 AND status = 'pending' AND created_at > $2
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(organization_id)
        .bind(since)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(attempt)
    }

    pub async fn list_attempts(&mut self, organization_id: OrganizationId, limit: i64) -> Result<Vec<AttemptDBResponse>> {
        let attempts = sqlx::query_as::<_, AttemptDBResponse>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM auto_recharge_attempts
             WHERE organization_id = $1
             ORDER BY created_at DESC
             LIMIT $2"
        ))
        .bind(organization_id)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(attempts)
    }
}

/// Idempotency key sent to the payment provider for a journaled attempt
pub fn attempt_idempotency_key(id: &Uuid) -> String {
    format!("auto-recharge-{id}")
}
