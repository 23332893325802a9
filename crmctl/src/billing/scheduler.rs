//! In-process auto-recharge scheduler.
//!
//! Runs [`AutoRecharger::check_all`] on a fixed interval until cancelled. Only the replica
//! holding leadership runs it (see [`crate::leader_election`]).

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::AutoRecharger;
use crate::db::models::auto_recharge::RechargeTrigger;

#[instrument(skip(recharger, shutdown))]
pub async fn run_scheduler(recharger: AutoRecharger, interval: Duration, shutdown: CancellationToken) {
    info!(interval = ?interval, "Auto-recharge scheduler started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Auto-recharge scheduler stopped");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = recharger.check_all(RechargeTrigger::Scheduler).await {
                    tracing::error!("Scheduled auto-recharge sweep failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CreditsConfig;
    use crate::payment_providers::dummy::DummyProvider;
    use sqlx::PgPool;
    use std::sync::Arc;

    #[sqlx::test]
    #[test_log::test]
    async fn test_scheduler_stops_on_cancel(pool: PgPool) {
        let recharger = AutoRecharger::new(pool, Arc::new(DummyProvider::default()), CreditsConfig::default().packages);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_scheduler(recharger, Duration::from_millis(10), shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
