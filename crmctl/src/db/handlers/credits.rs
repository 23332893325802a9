//! Credit ledger repository.
//!
//! Every write goes through the `apply_credit_transaction` SQL function, which bumps the
//! balance row and appends the log row in a single statement. The balance row lock
//! serialises concurrent writers for a tenant and the `credit_balances_balance_non_negative`
//! CHECK constraint rejects any write that would overdraw it.

use crate::db::{
    errors::{DbError, Result},
    models::credits::{CREDIT_SCALE, CreditReconciliationDBResponse, CreditTransactionCreateDBRequest, CreditTransactionDBResponse, CreditTransactionType},
};
use crate::types::{OrganizationId, abbrev_uuid};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use tracing::instrument;

const TRANSACTION_COLUMNS: &str =
    "id, organization_id, transaction_type, amount, balance_after, description, reference, created_by, created_at";

/// Filter for listing credit transactions
#[derive(Debug, Clone)]
pub struct CreditTransactionFilter {
    pub organization_id: OrganizationId,
    pub transaction_type: Option<CreditTransactionType>,
    pub skip: i64,
    pub limit: i64,
}

impl CreditTransactionFilter {
    pub fn new(organization_id: OrganizationId, skip: i64, limit: i64) -> Self {
        Self {
            organization_id,
            transaction_type: None,
            skip,
            limit,
        }
    }
}

pub struct Credits<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Credits<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Apply a ledger transaction.
    ///
    /// `request.amount` must be positive; the transaction type decides whether it is added or
    /// subtracted. Overdrafts fail with a `CheckViolation` on the balance constraint and
    /// duplicate references with a `UniqueViolation`; neither leaves any trace.
    #[instrument(
        skip(self, request),
        fields(
            organization_id = %abbrev_uuid(&request.organization_id),
            transaction_type = request.transaction_type.as_str(),
            amount = %request.amount
        ),
        err
    )]
    pub async fn create_transaction(&mut self, request: &CreditTransactionCreateDBRequest) -> Result<CreditTransactionDBResponse> {
        // Postgres would round the balance and the log row separately
        if request.amount <= Decimal::ZERO || request.amount.normalize().scale() > CREDIT_SCALE {
            return Err(DbError::InvalidAmount { amount: request.amount });
        }

        let signed = request.transaction_type.signed(request.amount);
        let transaction = sqlx::query_as::<_, CreditTransactionDBResponse>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM apply_credit_transaction($1, $2, $3, $4, $5, $6)"
        ))
        .bind(request.organization_id)
        .bind(signed)
        .bind(request.transaction_type)
        .bind(&request.description)
        .bind(&request.reference)
        .bind(request.created_by)
        .fetch_one(&mut *self.db)
        .await?;

        metrics::counter!(
            "crmctl_credit_transactions_total",
            "type" => request.transaction_type.as_str()
        )
        .increment(1);

        Ok(transaction)
    }

    /// Current balance; organizations without a balance row have zero.
    pub async fn get_balance(&mut self, organization_id: OrganizationId) -> Result<Decimal> {
        let balance = sqlx::query_scalar::<_, Decimal>("SELECT balance FROM credit_balances WHERE organization_id = $1")
            .bind(organization_id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(balance.unwrap_or(Decimal::ZERO))
    }

    pub async fn find_by_reference(
        &mut self,
        organization_id: OrganizationId,
        reference: &str,
    ) -> Result<Option<CreditTransactionDBResponse>> {
        let transaction = sqlx::query_as::<_, CreditTransactionDBResponse>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM credit_transactions WHERE organization_id = $1 AND reference = $2"
        ))
        .bind(organization_id)
        .bind(reference)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(transaction)
    }

    /// List transactions for an organization, newest first
    pub async fn list_transactions(&mut self, filter: &CreditTransactionFilter) -> Result<Vec<CreditTransactionDBResponse>> {
        let transactions = sqlx::query_as::<_, CreditTransactionDBResponse>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM credit_transactions
             WHERE organization_id = $1 AND ($2::text IS NULL OR transaction_type = $2)
             ORDER BY created_at DESC, id DESC
             OFFSET $3 LIMIT $4"
        ))
        .bind(filter.organization_id)
        .bind(filter.transaction_type)
        .bind(filter.skip)
        .bind(filter.limit)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(transactions)
    }

    pub async fn count_transactions(&mut self, filter: &CreditTransactionFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM credit_transactions
             WHERE organization_id = $1 AND ($2::text IS NULL OR transaction_type = $2)",
        )
        .bind(filter.organization_id)
        .bind(filter.transaction_type)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    /// Compare the stored balance with the signed sum of the log
    #[instrument(skip(self), fields(organization_id = %abbrev_uuid(&organization_id)), err)]
    pub async fn reconcile(&mut self, organization_id: OrganizationId) -> Result<CreditReconciliationDBResponse> {
        let row = sqlx::query_as::<_, CreditReconciliationDBResponse>(
            "SELECT
                $1::uuid AS organization_id,
                COALESCE((SELECT balance FROM credit_balances WHERE organization_id = $1), 0) AS stored_balance,
                COALESCE((SELECT SUM(amount) FROM credit_transactions WHERE organization_id = $1), 0) AS ledger_sum,
                (SELECT COUNT(*) FROM credit_transactions WHERE organization_id = $1) AS transaction_count",
        )
        .bind(organization_id)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(row)
    }
}
