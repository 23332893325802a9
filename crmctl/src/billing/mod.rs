//! Turning payments into ledger credits.
//!
//! Every charge is credited with the provider charge id as the ledger reference. The
//! synchronous purchase path, auto-recharge and webhook redelivery can therefore all try
//! to fulfil the same charge and only the first write lands.

use sqlx::{PgConnection, PgPool};
use std::collections::BTreeMap;
use tracing::instrument;

use crate::{
    config::{CreditPackage, CreditsConfig},
    db::{
        errors::DbError,
        handlers::{AutoRecharge, Credits, Organizations},
        models::{
            auto_recharge::AttemptStatus,
            credits::{CreditTransactionCreateDBRequest, CreditTransactionDBResponse, CreditTransactionType},
            organizations::OrganizationDBResponse,
        },
    },
    payment_providers::{
        Charge, ChargeRequest, ChargeStatus, METADATA_ORGANIZATION_ID, METADATA_PACKAGE_ID, METADATA_SOURCE, PaymentError,
        PaymentProvider, WebhookEvent,
    },
    types::{OrganizationId, UserId, abbrev_uuid},
};

pub mod auto_recharge;
pub mod scheduler;

pub use auto_recharge::{AutoRecharger, Decision, RechargeOutcome, RechargeSweep, SkipReason, evaluate};

/// Metadata `source` value for charges made by auto-recharge
pub const SOURCE_AUTO_RECHARGE: &str = "auto_recharge";
pub const SOURCE_PURCHASE: &str = "purchase";

/// Credit the ledger for a settled charge.
///
/// Returns `None` when a transaction with this charge id already exists.
#[instrument(skip(conn, package, actor), fields(organization_id = %abbrev_uuid(&organization_id), package_id = %package.id), err)]
pub async fn fulfil_charge(
    conn: &mut PgConnection,
    organization_id: OrganizationId,
    package: &CreditPackage,
    charge_id: &str,
    transaction_type: CreditTransactionType,
    actor: Option<UserId>,
) -> Result<Option<CreditTransactionDBResponse>, DbError> {
    let mut request = CreditTransactionCreateDBRequest::new(organization_id, transaction_type, package.credits)
        .with_description(format!("{} package", package.name))
        .with_reference(charge_id);
    if let Some(actor) = actor {
        request = request.created_by(actor);
    }

    match Credits::new(conn).create_transaction(&request).await {
        Ok(transaction) => {
            tracing::info!("Credited {} for charge {}", package.credits, charge_id);
            Ok(Some(transaction))
        }
        Err(e) if e.is_duplicate_reference() => {
            tracing::trace!("Charge {} already credited, skipping (idempotent)", charge_id);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

pub fn charge_metadata(organization_id: OrganizationId, package: &CreditPackage, source: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (METADATA_ORGANIZATION_ID.to_string(), organization_id.to_string()),
        (METADATA_PACKAGE_ID.to_string(), package.id.clone()),
        (METADATA_SOURCE.to_string(), source.to_string()),
    ])
}

#[derive(Debug, Clone)]
pub struct PurchaseOutcome {
    pub charge: Charge,
    /// `None` while the charge is still settling or when it was already credited
    pub transaction: Option<CreditTransactionDBResponse>,
}

/// Charge a saved card for a package and credit the ledger once the charge settles.
#[instrument(skip_all, fields(organization_id = %abbrev_uuid(&organization.id), package_id = %package.id), err)]
pub async fn purchase_package(
    pool: &PgPool,
    provider: &dyn PaymentProvider,
    organization: &OrganizationDBResponse,
    package: &CreditPackage,
    payment_method_id: &str,
    idempotency_key: String,
    actor: UserId,
) -> Result<PurchaseOutcome, PaymentError> {
    let customer_id = organization.payment_customer_id.clone().ok_or(PaymentError::NoCustomerId)?;

    let charge = provider
        .charge(&ChargeRequest {
            customer_id,
            payment_method_id: payment_method_id.to_string(),
            amount_cents: package.price_cents,
            currency: package.currency.clone(),
            idempotency_key,
            description: format!("{} credit package", package.name),
            metadata: charge_metadata(organization.id, package, SOURCE_PURCHASE),
        })
        .await?;

    let transaction = match charge.status {
        ChargeStatus::Succeeded => {
            let mut conn = pool.acquire().await?;
            fulfil_charge(&mut conn, organization.id, package, &charge.id, CreditTransactionType::Purchase, Some(actor)).await?
        }
        ChargeStatus::Processing => {
            tracing::info!("Charge {} is processing; credits follow via webhook", charge.id);
            None
        }
    };

    Ok(PurchaseOutcome { charge, transaction })
}

/// Apply a verified payment webhook event. Safe to call repeatedly for the same event.
#[instrument(skip_all, err)]
pub async fn process_webhook_event(pool: &PgPool, credits: &CreditsConfig, event: &WebhookEvent) -> Result<(), PaymentError> {
    match event {
        WebhookEvent::PaymentSucceeded {
            charge_id,
            organization_id,
            package_id,
            source,
        } => {
            let package = credits
                .package(package_id)
                .ok_or_else(|| PaymentError::InvalidData(format!("Unknown package {package_id}")))?;

            let mut conn = pool.acquire().await?;
            if Organizations::new(&mut conn).get_by_id(*organization_id).await?.is_none() {
                tracing::warn!("Payment {} for deleted organization {}, not crediting", charge_id, organization_id);
                return Ok(());
            }

            let transaction_type = if source.as_deref() == Some(SOURCE_AUTO_RECHARGE) {
                CreditTransactionType::AutoRecharge
            } else {
                CreditTransactionType::Purchase
            };
            fulfil_charge(&mut conn, *organization_id, package, charge_id, transaction_type, None).await?;

            if transaction_type == CreditTransactionType::AutoRecharge {
                AutoRecharge::new(&mut conn)
                    .complete_attempt_by_reference(charge_id, AttemptStatus::Succeeded)
                    .await?;
            }
            Ok(())
        }
        WebhookEvent::PaymentFailed {
            charge_id,
            organization_id,
            reason,
        } => {
            tracing::warn!(
                organization_id = ?organization_id,
                reason = reason.as_deref().unwrap_or("unknown"),
                "Payment {} failed",
                charge_id
            );
            let mut conn = pool.acquire().await?;
            AutoRecharge::new(&mut conn)
                .complete_attempt_by_reference(charge_id, AttemptStatus::Failed)
                .await?;
            Ok(())
        }
        WebhookEvent::Ignored { event_type } => {
            tracing::debug!("Ignoring payment webhook event {}", event_type);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::organizations::OrganizationIntegrationsUpdate;
    use crate::payment_providers::dummy::{DUMMY_PAYMENT_METHOD, DummyProvider};
    use crate::test_utils::create_test_organization;
    use rust_decimal::Decimal;

    async fn org_with_customer(pool: &PgPool, name: &str) -> (OrganizationDBResponse, UserId) {
        let (org, owner) = create_test_organization(pool, name).await;
        let mut conn = pool.acquire().await.unwrap();
        let org = Organizations::new(&mut conn)
            .update_integrations(
                org.id,
                &OrganizationIntegrationsUpdate {
                    payment_customer_id: Some(format!("dummy_cus_{}", org.id.simple())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        (org, owner.id)
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_purchase_credits_ledger(pool: PgPool) {
        let (org, owner) = org_with_customer(&pool, "Buyer").await;
        let config = CreditsConfig::default();
        let package = config.package("starter").unwrap();
        let provider = DummyProvider::default();

        let outcome = purchase_package(&pool, &provider, &org, package, DUMMY_PAYMENT_METHOD, "purchase-1".to_string(), owner)
            .await
            .unwrap();
        let transaction = outcome.transaction.unwrap();
        assert_eq!(transaction.amount, package.credits);
        assert_eq!(transaction.reference.as_deref(), Some(outcome.charge.id.as_str()));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_purchase_without_customer_fails(pool: PgPool) {
        let (org, owner) = create_test_organization(&pool, "No billing").await;
        let config = CreditsConfig::default();
        let provider = DummyProvider::default();

        let err = purchase_package(
            &pool,
            &provider,
            &org,
            config.package("starter").unwrap(),
            DUMMY_PAYMENT_METHOD,
            "k".to_string(),
            owner.id,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PaymentError::NoCustomerId));
        assert_eq!(provider.charge_count(), 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_webhook_redelivery_does_not_double_credit(pool: PgPool) {
        let (org, _) = create_test_organization(&pool, "Redelivery").await;
        let config = CreditsConfig::default();
        let event = WebhookEvent::PaymentSucceeded {
            charge_id: "pi_redelivered".to_string(),
            organization_id: org.id,
            package_id: "growth".to_string(),
            source: None,
        };

        let mut conn = pool.acquire().await.unwrap();
        let before = Credits::new(&mut conn).get_balance(org.id).await.unwrap();

        for _ in 0..3 {
            process_webhook_event(&pool, &config, &event).await.unwrap();
        }

        let after = Credits::new(&mut conn).get_balance(org.id).await.unwrap();
        assert_eq!(after - before, Decimal::from(5_500));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_webhook_after_synchronous_fulfilment_is_noop(pool: PgPool) {
        let (org, owner) = org_with_customer(&pool, "Both paths").await;
        let config = CreditsConfig::default();
        let package = config.package("starter").unwrap();
        let provider = DummyProvider::default();

        let outcome = purchase_package(&pool, &provider, &org, package, DUMMY_PAYMENT_METHOD, "p-2".to_string(), owner)
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let balance = Credits::new(&mut conn).get_balance(org.id).await.unwrap();

        let event = WebhookEvent::PaymentSucceeded {
            charge_id: outcome.charge.id.clone(),
            organization_id: org.id,
            package_id: "starter".to_string(),
            source: Some(SOURCE_PURCHASE.to_string()),
        };
        process_webhook_event(&pool, &config, &event).await.unwrap();

        assert_eq!(Credits::new(&mut conn).get_balance(org.id).await.unwrap(), balance);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_webhook_unknown_package_rejected(pool: PgPool) {
        let (org, _) = create_test_organization(&pool, "Unknown").await;
        let event = WebhookEvent::PaymentSucceeded {
            charge_id: "pi_x".to_string(),
            organization_id: org.id,
            package_id: "platinum".to_string(),
            source: None,
        };
        let err = process_webhook_event(&pool, &CreditsConfig::default(), &event).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidData(_)));
    }
}
