//! Background jobs

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::users::UserService;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

/// Run the counter audit on `cron` until the returned scheduler is dropped
/// or shut down. Drift is reported by [`UserService::counter_audit`].
pub async fn start_counter_audit(
    cron: &str,
    users: Arc<UserService>,
) -> Result<JobScheduler, JobError> {
    let scheduler = JobScheduler::new().await?;
    let job = Job::new_async(cron, move |_id, _scheduler| {
        let users = users.clone();
        Box::pin(async move {
            match users.counter_audit().await {
                Ok(drift) if drift.is_empty() => tracing::debug!("Counter audit clean"),
                Ok(drift) => tracing::error!(users = drift.len(), "Counter audit found drift"),
                Err(e) => tracing::warn!("Counter audit failed: {}", e),
            }
        })
    })?;
    scheduler.add(job).await?;
    scheduler.start().await?;
    tracing::info!(cron, "Counter audit scheduled");
    Ok(scheduler)
}
