use sqlx::PgPool;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Advisory lock key held by the leader replica
pub const LEADER_LOCK_ID: i64 = 0x4352_4d00_0000_0001;

/// Background task for leader election
/// Runs periodically to maintain leadership or attempt to acquire it
///
/// The leader runs the background auto-recharge scheduler so that only one replica sweeps
/// the tenants at a time.
///
/// PostgreSQL advisory locks are session-based, so we need to maintain a dedicated connection
/// for the entire duration we want to hold the lock.
#[instrument(skip(pool, is_leader, shutdown, on_gain_leadership, on_lose_leadership))]
pub async fn leader_election_task<F1, F2, Fut1, Fut2>(
    pool: PgPool,
    is_leader: Arc<AtomicBool>,
    lock_id: i64,
    check_interval: Duration,
    shutdown: CancellationToken,
    on_gain_leadership: F1,
    on_lose_leadership: F2,
) where
    F1: Fn() -> Fut1 + Send + 'static,
    F2: Fn() -> Fut2 + Send + 'static,
    Fut1: std::future::Future<Output = ()> + Send + 'static,
    Fut2: std::future::Future<Output = ()> + Send + 'static,
{
    let mut interval = tokio::time::interval(check_interval);
    let mut leader_conn: Option<sqlx::pool::PoolConnection<sqlx::Postgres>> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if leader_conn.take().is_some() {
                    is_leader.store(false, Ordering::Relaxed);
                    on_lose_leadership().await;
                }
                info!("Leader election stopped");
                return;
            }
            _ = interval.tick() => {}
        }

        // If we're not leader, try to acquire the lock
        if !is_leader.load(Ordering::Relaxed) {
            match pool.acquire().await {
                Ok(mut conn) => {
                    match sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
                        .bind(lock_id)
                        .fetch_one(&mut *conn)
                        .await
                    {
                        Ok(true) => {
                            info!("Gained leadership");
                            is_leader.store(true, Ordering::Relaxed);
                            leader_conn = Some(conn); // Keep connection alive
                            on_gain_leadership().await;
                        }
                        Ok(false) => {
                            debug!("Following - will retry");
                        }
                        Err(e) => {
                            tracing::error!("Failed to check leader lock: {}", e);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to acquire connection for leader election: {}", e);
                }
            }
        } else if let Some(conn) = leader_conn.as_mut() {
            // Ping the connection; if it died the advisory lock went with it
            if let Err(e) = sqlx::query("SELECT 1").execute(&mut **conn).await {
                tracing::warn!("Lost leadership (connection died): {}", e);
                is_leader.store(false, Ordering::Relaxed);
                leader_conn = None;
                on_lose_leadership().await;
            } else {
                debug!("Leadership renewed (connection alive)");
            }
        } else {
            tracing::error!("Inconsistent state: is_leader=true but no connection");
            is_leader.store(false, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[sqlx::test]
    #[test_log::test]
    async fn test_single_leader_among_replicas(pool: PgPool) {
        let shutdown = CancellationToken::new();
        let gained = Arc::new(AtomicUsize::new(0));
        let flags: Vec<Arc<AtomicBool>> = (0..3).map(|_| Arc::new(AtomicBool::new(false))).collect();

        let mut handles = Vec::new();
        for flag in &flags {
            let gained = gained.clone();
            handles.push(tokio::spawn(leader_election_task(
                pool.clone(),
                flag.clone(),
                LEADER_LOCK_ID,
                Duration::from_millis(20),
                shutdown.clone(),
                move || {
                    let gained = gained.clone();
                    async move {
                        gained.fetch_add(1, Ordering::SeqCst);
                    }
                },
                || async {},
            )));
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        let leaders = flags.iter().filter(|f| f.load(Ordering::Relaxed)).count();
        assert_eq!(leaders, 1);
        assert_eq!(gained.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
