use crate::metrics;
use std::{future::Future, sync::Arc, time::Instant};
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        // Spawn cleanup tasks
        tokio::spawn(Self::expired_session_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::gate_pass_expiry_job(Arc::clone(&self)));
        tokio::spawn(Self::payment_reconciliation_job(Arc::clone(&self)));

        // Spawn monitoring tasks
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Cleanup expired sessions (runs every hour)
    async fn expired_session_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600)); // Every hour

        loop {
            interval.tick().await;
            info!("Running expired session cleanup");

            match timed("session_cleanup", tasks::cleanup_expired_sessions(&scheduler.context)).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => error!("Failed to cleanup expired sessions: {}", e),
            }
        }
    }

    /// Expire gate passes and invitations past their window (runs every 15 minutes)
    async fn gate_pass_expiry_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(900)); // Every 15 minutes

        loop {
            interval.tick().await;

            match timed("gate_pass_expiry", tasks::expire_overdue(&scheduler.context)).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Expired {} overdue passes and invitations", count);
                    }
                }
                Err(e) => error!("Failed to expire overdue gate passes: {}", e),
            }
        }
    }

    /// Fail payments the provider never settled (runs every 10 minutes)
    async fn payment_reconciliation_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(600)); // Every 10 minutes

        loop {
            interval.tick().await;

            match timed("payment_reconciliation", tasks::reconcile_payments(&scheduler.context)).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Marked {} stale payment transactions as failed", count);
                    }
                }
                Err(e) => error!("Failed to reconcile payments: {}", e),
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300)); // Every 5 minutes

        loop {
            interval.tick().await;

            if let Err(e) = timed("health_check", tasks::health_check(&scheduler.context)).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}

/// Run a task and record its outcome and duration
async fn timed<T, E, F>(job_type: &str, task: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let result = task.await;
    let status = if result.is_ok() { "success" } else { "failure" };
    metrics::record_background_job(job_type, status, started.elapsed().as_secs_f64());
    result
}
