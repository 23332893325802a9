//! Auto-recharge: top a tenant up when its balance falls below the configured minimum.
//!
//! [`evaluate`] decides from settings and balance alone. [`AutoRecharger::check`] wraps
//! it with a per-tenant advisory lock, journals an attempt, charges with an idempotency
//! key derived from the attempt id and credits the ledger with the charge id as reference.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use super::{SOURCE_AUTO_RECHARGE, charge_metadata, fulfil_charge};
use crate::{
    config::CreditPackage,
    db::{
        errors::DbError,
        handlers::{AutoRecharge, Credits, Organizations, auto_recharge::attempt_idempotency_key},
        models::{
            auto_recharge::{AttemptCreateDBRequest, AttemptStatus, AutoRechargeSettingsDBResponse, RechargeTrigger},
            credits::CreditTransactionType,
        },
    },
    payment_providers::{ChargeRequest, ChargeStatus, PaymentProvider},
    types::{AttemptId, OrganizationId, abbrev_uuid},
};

/// How long an unsettled attempt blocks new charges for its organization
const PENDING_ATTEMPT_WINDOW: Duration = Duration::hours(24);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    AboveThreshold,
    NoPaymentMethod,
    UnknownPackage,
    /// Another check for the same organization holds the lock
    InProgress,
    /// An earlier charge was accepted but has not settled yet
    PendingCharge,
}

impl SkipReason {
    fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Disabled => "disabled",
            SkipReason::AboveThreshold => "above_threshold",
            SkipReason::NoPaymentMethod => "no_payment_method",
            SkipReason::UnknownPackage => "unknown_package",
            SkipReason::InProgress => "in_progress",
            SkipReason::PendingCharge => "pending_charge",
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Decision<'a> {
    Charge {
        package: &'a CreditPackage,
        payment_method_id: &'a str,
    },
    Skip(SkipReason),
}

/// Decide whether a check should charge.
pub fn evaluate<'a>(settings: &'a AutoRechargeSettingsDBResponse, balance: Decimal, packages: &'a [CreditPackage]) -> Decision<'a> {
    if !settings.enabled {
        return Decision::Skip(SkipReason::Disabled);
    }
    if balance >= settings.minimum_balance {
        return Decision::Skip(SkipReason::AboveThreshold);
    }
    let Some(payment_method_id) = settings.payment_method_id.as_deref() else {
        return Decision::Skip(SkipReason::NoPaymentMethod);
    };
    let Some(package) = settings
        .package_id
        .as_deref()
        .and_then(|id| packages.iter().find(|p| p.id == id))
    else {
        return Decision::Skip(SkipReason::UnknownPackage);
    };
    Decision::Charge {
        package,
        payment_method_id,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RechargeOutcome {
    Charged {
        #[schema(value_type = String, format = "uuid")]
        attempt_id: AttemptId,
        charge_id: String,
        #[schema(value_type = String)]
        credits: Decimal,
    },
    /// Charge accepted but not settled; credits arrive with the webhook
    Pending {
        #[schema(value_type = String, format = "uuid")]
        attempt_id: AttemptId,
        charge_id: String,
    },
    Skipped { reason: SkipReason },
    Failed {
        #[schema(value_type = String, format = "uuid")]
        attempt_id: AttemptId,
        error: String,
    },
}

impl RechargeOutcome {
    fn label(&self) -> &'static str {
        match self {
            RechargeOutcome::Charged { .. } => "charged",
            RechargeOutcome::Pending { .. } => "pending",
            RechargeOutcome::Skipped { .. } => "skipped",
            RechargeOutcome::Failed { .. } => "failed",
        }
    }
}

/// Totals for a check across every enabled organization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RechargeSweep {
    pub checked: usize,
    pub charged: usize,
    pub pending: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Checks that could not complete (database errors)
    pub errors: usize,
}

impl RechargeSweep {
    fn record(&mut self, outcome: &RechargeOutcome) {
        self.checked += 1;
        match outcome {
            RechargeOutcome::Charged { .. } => self.charged += 1,
            RechargeOutcome::Pending { .. } => self.pending += 1,
            RechargeOutcome::Skipped { .. } => self.skipped += 1,
            RechargeOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

#[derive(Clone)]
pub struct AutoRecharger {
    db: PgPool,
    provider: Arc<dyn PaymentProvider>,
    packages: Vec<CreditPackage>,
}

impl AutoRecharger {
    pub fn new(db: PgPool, provider: Arc<dyn PaymentProvider>, packages: Vec<CreditPackage>) -> Self {
        Self { db, provider, packages }
    }

    /// Run one check for an organization.
    ///
    /// Payment failures are reported in the outcome; only database errors are returned as `Err`.
    #[instrument(skip(self), fields(organization_id = %abbrev_uuid(&organization_id)), err)]
    pub async fn check(&self, organization_id: OrganizationId, trigger: RechargeTrigger) -> Result<RechargeOutcome, DbError> {
        let mut lock = self.db.begin().await?;
        if !AutoRecharge::new(&mut lock).try_xact_lock(&organization_id).await? {
            tracing::debug!("Auto-recharge check already running");
            return Ok(RechargeOutcome::Skipped {
                reason: SkipReason::InProgress,
            });
        }

        let outcome = self.check_locked(organization_id, trigger).await;
        if let Err(e) = lock.rollback().await {
            tracing::warn!("Failed to release auto-recharge lock: {}", e);
        }

        if let Ok(outcome) = &outcome {
            metrics::counter!("crmctl_auto_recharge_checks_total", "outcome" => outcome.label()).increment(1);
        }
        outcome
    }

    async fn check_locked(&self, organization_id: OrganizationId, trigger: RechargeTrigger) -> Result<RechargeOutcome, DbError> {
        let mut conn = self.db.acquire().await?;
        let settings = AutoRecharge::new(&mut conn).get_settings(organization_id).await?;
        let balance = Credits::new(&mut conn).get_balance(organization_id).await?;

        let (package, payment_method_id) = match evaluate(&settings, balance, &self.packages) {
            Decision::Skip(reason) => {
                tracing::debug!(balance = %balance, "Auto-recharge skipped: {}", reason.as_str());
                return Ok(RechargeOutcome::Skipped { reason });
            }
            Decision::Charge {
                package,
                payment_method_id,
            } => (package.clone(), payment_method_id.to_string()),
        };

        let organization = Organizations::new(&mut conn)
            .get_by_id(organization_id)
            .await?
            .ok_or(DbError::NotFound)?;
        let Some(customer_id) = organization.payment_customer_id else {
            tracing::warn!("Auto-recharge enabled but organization has no billing customer");
            return Ok(RechargeOutcome::Skipped {
                reason: SkipReason::NoPaymentMethod,
            });
        };

        // The balance does not reflect a charge that is still settling
        let since = Utc::now() - PENDING_ATTEMPT_WINDOW;
        if let Some(pending) = AutoRecharge::new(&mut conn).find_pending_attempt(organization_id, since).await? {
            tracing::info!(attempt_id = %pending.id, "Auto-recharge skipped: earlier charge not settled");
            return Ok(RechargeOutcome::Skipped {
                reason: SkipReason::PendingCharge,
            });
        }

        let attempt = AutoRecharge::new(&mut conn)
            .create_attempt(&AttemptCreateDBRequest {
                organization_id,
                trigger,
                package_id: package.id.clone(),
                amount_cents: package.price_cents,
                credits: package.credits,
                balance_before: balance,
            })
            .await?;

        let request = ChargeRequest {
            customer_id,
            payment_method_id,
            amount_cents: package.price_cents,
            currency: package.currency.clone(),
            idempotency_key: attempt_idempotency_key(&attempt.id),
            description: format!("Auto-recharge: {} credit package", package.name),
            metadata: charge_metadata(organization_id, &package, SOURCE_AUTO_RECHARGE),
        };

        match self.provider.charge(&request).await {
            Ok(charge) if charge.status == ChargeStatus::Succeeded => {
                fulfil_charge(&mut conn, organization_id, &package, &charge.id, CreditTransactionType::AutoRecharge, None).await?;
                let mut repo = AutoRecharge::new(&mut conn);
                repo.complete_attempt(attempt.id, AttemptStatus::Succeeded, Some(&charge.id), None)
                    .await?;
                repo.record_outcome(organization_id, "succeeded", None).await?;
                tracing::info!(balance_before = %balance, credits = %package.credits, "Auto-recharge charged {}", charge.id);
                Ok(RechargeOutcome::Charged {
                    attempt_id: attempt.id,
                    charge_id: charge.id,
                    credits: package.credits,
                })
            }
            Ok(charge) => {
                let mut repo = AutoRecharge::new(&mut conn);
                repo.set_attempt_reference(attempt.id, &charge.id).await?;
                repo.record_outcome(organization_id, "pending", None).await?;
                Ok(RechargeOutcome::Pending {
                    attempt_id: attempt.id,
                    charge_id: charge.id,
                })
            }
            Err(e) => {
                let error = e.to_string();
                tracing::warn!("Auto-recharge charge failed: {}", error);
                let mut repo = AutoRecharge::new(&mut conn);
                repo.complete_attempt(attempt.id, AttemptStatus::Failed, None, Some(&error))
                    .await?;
                repo.record_outcome(organization_id, "failed", Some(&error)).await?;
                Ok(RechargeOutcome::Failed {
                    attempt_id: attempt.id,
                    error,
                })
            }
        }
    }

    /// Check every organization with auto-recharge enabled
    #[instrument(skip(self), err)]
    pub async fn check_all(&self, trigger: RechargeTrigger) -> Result<RechargeSweep, DbError> {
        let organization_ids = {
            let mut conn = self.db.acquire().await?;
            AutoRecharge::new(&mut conn).list_enabled_organizations().await?
        };

        let mut sweep = RechargeSweep::default();
        for organization_id in organization_ids {
            match self.check(organization_id, trigger).await {
                Ok(outcome) => sweep.record(&outcome),
                Err(e) => {
                    tracing::error!(organization_id = %organization_id, "Auto-recharge check failed: {}", e);
                    sweep.errors += 1;
                }
            }
        }

        tracing::info!(
            checked = sweep.checked,
            charged = sweep.charged,
            failed = sweep.failed,
            errors = sweep.errors,
            "Auto-recharge sweep finished"
        );
        Ok(sweep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CreditsConfig, DummyConfig};
    use crate::db::models::{auto_recharge::AutoRechargeSettingsUpsertDBRequest, organizations::OrganizationIntegrationsUpdate};
    use crate::payment_providers::dummy::{DUMMY_PAYMENT_METHOD, DummyProvider};
    use crate::payment_providers::{Charge, PaymentMethod, Result as PaymentResult, SetupIntent, WebhookEvent};
    use crate::test_utils::create_test_organization;
    use async_trait::async_trait;
    use axum::http::HeaderMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn settings(enabled: bool, minimum: i64, package: Option<&str>, payment_method: Option<&str>) -> AutoRechargeSettingsDBResponse {
        AutoRechargeSettingsDBResponse {
            enabled,
            minimum_balance: Decimal::from(minimum),
            package_id: package.map(str::to_string),
            payment_method_id: payment_method.map(str::to_string),
            ..AutoRechargeSettingsDBResponse::disabled(Uuid::new_v4())
        }
    }

    #[test]
    fn test_evaluate() {
        let packages = CreditsConfig::default().packages;

        let s = settings(true, 100, Some("starter"), Some("pm_1"));
        assert_eq!(evaluate(&s, Decimal::from(100), &packages), Decision::Skip(SkipReason::AboveThreshold));
        assert_eq!(evaluate(&s, Decimal::from(500), &packages), Decision::Skip(SkipReason::AboveThreshold));
        assert_eq!(
            evaluate(&s, Decimal::new(9999, 2), &packages),
            Decision::Charge {
                package: &packages[0],
                payment_method_id: "pm_1"
            }
        );

        let s = settings(false, 100, Some("starter"), Some("pm_1"));
        assert_eq!(evaluate(&s, Decimal::ZERO, &packages), Decision::Skip(SkipReason::Disabled));

        let s = settings(true, 100, Some("starter"), None);
        assert_eq!(evaluate(&s, Decimal::ZERO, &packages), Decision::Skip(SkipReason::NoPaymentMethod));

        let s = settings(true, 100, Some("platinum"), Some("pm_1"));
        assert_eq!(evaluate(&s, Decimal::ZERO, &packages), Decision::Skip(SkipReason::UnknownPackage));
    }

    /// Organization with a billing customer, auto-recharge enabled and a zero balance
    async fn setup(pool: &PgPool, minimum: i64) -> OrganizationId {
        let (org, _) = create_test_organization(pool, "Recharge").await;
        let mut conn = pool.acquire().await.unwrap();
        Organizations::new(&mut conn)
            .update_integrations(
                org.id,
                &OrganizationIntegrationsUpdate {
                    payment_customer_id: Some("dummy_cus_1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        AutoRecharge::new(&mut conn)
            .upsert_settings(
                org.id,
                &AutoRechargeSettingsUpsertDBRequest {
                    enabled: true,
                    minimum_balance: Decimal::from(minimum),
                    package_id: Some("starter".to_string()),
                    payment_method_id: Some(DUMMY_PAYMENT_METHOD.to_string()),
                },
            )
            .await
            .unwrap();
        org.id
    }

    fn recharger(pool: &PgPool, provider: Arc<DummyProvider>) -> AutoRecharger {
        AutoRecharger::new(pool.clone(), provider, CreditsConfig::default().packages)
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_below_minimum_charges_once_and_credits(pool: PgPool) {
        let org_id = setup(&pool, 500).await;
        let mut conn = pool.acquire().await.unwrap();
        let before = Credits::new(&mut conn).get_balance(org_id).await.unwrap();
        assert!(before < Decimal::from(500));

        let provider = Arc::new(DummyProvider::default());
        let outcome = recharger(&pool, provider.clone()).check(org_id, RechargeTrigger::Manual).await.unwrap();

        assert!(matches!(outcome, RechargeOutcome::Charged { credits, .. } if credits == Decimal::from(1_000)));
        assert_eq!(provider.charge_count(), 1);
        assert_eq!(
            Credits::new(&mut conn).get_balance(org_id).await.unwrap(),
            before + Decimal::from(1_000)
        );

        let attempts = AutoRecharge::new(&mut conn).list_attempts(org_id, 10).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, AttemptStatus::Succeeded);
        let settings = AutoRecharge::new(&mut conn).get_settings(org_id).await.unwrap();
        assert_eq!(settings.last_status.as_deref(), Some("succeeded"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_at_or_above_minimum_never_charges(pool: PgPool) {
        let org_id = setup(&pool, 0).await;
        let provider = Arc::new(DummyProvider::default());

        let outcome = recharger(&pool, provider.clone()).check(org_id, RechargeTrigger::Cron).await.unwrap();
        assert_eq!(
            outcome,
            RechargeOutcome::Skipped {
                reason: SkipReason::AboveThreshold
            }
        );
        assert_eq!(provider.charge_count(), 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_concurrent_checks_charge_once(pool: PgPool) {
        let org_id = setup(&pool, 500).await;
        let provider = Arc::new(DummyProvider::default());
        let recharger = recharger(&pool, provider.clone());

        let mut handles = Vec::new();
        for _ in 0..5 {
            let recharger = recharger.clone();
            handles.push(tokio::spawn(async move { recharger.check(org_id, RechargeTrigger::Scheduler).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(provider.charge_count(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_held_lock_skips_in_progress(pool: PgPool) {
        let org_id = setup(&pool, 500).await;
        let provider = Arc::new(DummyProvider::default());

        let mut held = pool.begin().await.unwrap();
        assert!(AutoRecharge::new(&mut held).try_xact_lock(&org_id).await.unwrap());

        let outcome = recharger(&pool, provider.clone()).check(org_id, RechargeTrigger::Manual).await.unwrap();
        assert_eq!(
            outcome,
            RechargeOutcome::Skipped {
                reason: SkipReason::InProgress
            }
        );
        assert_eq!(provider.charge_count(), 0);
        held.rollback().await.unwrap();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_declined_charge_is_journaled(pool: PgPool) {
        let org_id = setup(&pool, 500).await;
        let provider = Arc::new(DummyProvider::from(DummyConfig {
            decline_suffix: Some("_visa".to_string()),
            webhook_secret: None,
        }));

        let outcome = recharger(&pool, provider).check(org_id, RechargeTrigger::Manual).await.unwrap();
        assert!(matches!(outcome, RechargeOutcome::Failed { .. }));

        let mut conn = pool.acquire().await.unwrap();
        let attempts = AutoRecharge::new(&mut conn).list_attempts(org_id, 10).await.unwrap();
        assert_eq!(attempts[0].status, AttemptStatus::Failed);
        let settings = AutoRecharge::new(&mut conn).get_settings(org_id).await.unwrap();
        assert_eq!(settings.last_status.as_deref(), Some("failed"));
        assert!(settings.last_error.is_some());
    }

    /// Accepts every charge but never settles it synchronously
    #[derive(Default)]
    struct SettlingProvider {
        charges: AtomicUsize,
    }

    #[async_trait]
    impl PaymentProvider for SettlingProvider {
        async fn create_customer(&self, organization_id: OrganizationId, _name: &str, _email: &str) -> PaymentResult<String> {
            Ok(format!("cus_{organization_id}"))
        }

        async fn create_setup_intent(&self, customer_id: &str) -> PaymentResult<SetupIntent> {
            Ok(SetupIntent {
                id: format!("seti_{customer_id}"),
                client_secret: "secret".to_string(),
            })
        }

        async fn list_payment_methods(&self, _customer_id: &str) -> PaymentResult<Vec<PaymentMethod>> {
            Ok(Vec::new())
        }

        async fn detach_payment_method(&self, _payment_method_id: &str) -> PaymentResult<()> {
            Ok(())
        }

        async fn charge(&self, request: &ChargeRequest) -> PaymentResult<Charge> {
            self.charges.fetch_add(1, Ordering::SeqCst);
            Ok(Charge {
                id: format!("pi_{}", request.idempotency_key),
                status: ChargeStatus::Processing,
                amount_cents: request.amount_cents,
            })
        }

        async fn validate_webhook(&self, _headers: &HeaderMap, _body: &str) -> PaymentResult<Option<WebhookEvent>> {
            Ok(None)
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unsettled_charge_blocks_further_charges(pool: PgPool) {
        let org_id = setup(&pool, 500).await;
        let provider = Arc::new(SettlingProvider::default());
        let recharger = AutoRecharger::new(pool.clone(), provider.clone(), CreditsConfig::default().packages);

        let first = recharger.check(org_id, RechargeTrigger::Cron).await.unwrap();
        let RechargeOutcome::Pending { charge_id, .. } = first else {
            panic!("expected a pending charge, got {first:?}");
        };

        let second = recharger.check(org_id, RechargeTrigger::Manual).await.unwrap();
        assert_eq!(
            second,
            RechargeOutcome::Skipped {
                reason: SkipReason::PendingCharge
            }
        );
        assert_eq!(provider.charges.load(Ordering::SeqCst), 1);

        // Once the provider reports the charge failed, the next check may charge again
        let mut conn = pool.acquire().await.unwrap();
        let settled = AutoRecharge::new(&mut conn)
            .complete_attempt_by_reference(&charge_id, AttemptStatus::Failed)
            .await
            .unwrap();
        assert_eq!(settled, 1);

        let third = recharger.check(org_id, RechargeTrigger::Manual).await.unwrap();
        assert!(matches!(third, RechargeOutcome::Pending { .. }));
        assert_eq!(provider.charges.load(Ordering::SeqCst), 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_check_all_covers_enabled_organizations(pool: PgPool) {
        let low = setup(&pool, 500).await;
        let _high = setup(&pool, 0).await;
        let provider = Arc::new(DummyProvider::default());

        let sweep = recharger(&pool, provider.clone()).check_all(RechargeTrigger::Cron).await.unwrap();
        assert_eq!(sweep.checked, 2);
        assert_eq!(sweep.charged, 1);
        assert_eq!(sweep.skipped, 1);
        assert_eq!(provider.charge_count(), 1);

        let mut conn = pool.acquire().await.unwrap();
        assert!(Credits::new(&mut conn).get_balance(low).await.unwrap() >= Decimal::from(1_000));
    }
}
