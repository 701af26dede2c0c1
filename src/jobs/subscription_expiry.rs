use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::models::{gym::Gym, member_subscription::MemberSubscription};

#[derive(Debug, Default, Clone, Serialize)]
pub struct ExpiryStats {
    pub ended_subscriptions: u64,
    pub exhausted_subscriptions: u64,
    pub lapsed_gyms: u64,
}

/// Sweeps statuses that have fallen behind the calendar.
///
/// 1. Member subscriptions past their end date become expired
/// 2. Session packs with no sessions left become expired
/// 3. Gyms whose trial or paid period is over become past_due
///
/// Steps run one after the other; a failure stops the sweep and the next
/// run picks up where it left off.
pub async fn expire_subscriptions(pool: &PgPool, now: DateTime<Utc>) -> Result<ExpiryStats, sqlx::Error> {
    let today = now.date_naive();

    tracing::info!(%today, "Starting subscription expiry sweep");

    let stats = ExpiryStats {
        ended_subscriptions: MemberSubscription::expire_ended(pool, today).await?,
        exhausted_subscriptions: MemberSubscription::expire_exhausted(pool).await?,
        lapsed_gyms: Gym::mark_lapsed_billing(pool, now).await?,
    };

    tracing::info!(?stats, "Subscription expiry sweep completed");

    Ok(stats)
}

/// Starts the in-process scheduler running the sweep on `schedule` (cron syntax with seconds)
pub async fn start_scheduler(pool: PgPool, schedule: &str) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_id, _lock| {
        let pool = pool.clone();
        Box::pin(async move {
            if let Err(e) = expire_subscriptions(&pool, Utc::now()).await {
                tracing::error!(error = %e, "Scheduled expiry sweep failed");
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!(schedule = %schedule, "Expiry sweep scheduled");

    Ok(scheduler)
}
