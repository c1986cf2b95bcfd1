//! Claim loop.

use std::time::Duration;

use sqlx::PgPool;

use finback_db::repositories::job_queue_repo::JobQueueRepo;

use crate::jobs;

/// Claim and execute at most one due job. Returns whether a job was
/// claimed; callers poll again immediately when the queue was non-empty.
pub async fn run_once(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let Some(job) = JobQueueRepo::claim_next(pool).await? else {
        return Ok(false);
    };

    tracing::info!(
        job_id = job.id,
        name = %job.name,
        attempt = job.attempts,
        key = %job.idempotency_key,
        "Claimed job"
    );

    match jobs::execute(pool, &job.name, &job.payload).await {
        Ok(()) => {
            JobQueueRepo::complete(pool, job.id).await?;
            tracing::info!(job_id = job.id, name = %job.name, "Job completed");
        }
        Err(error) => {
            tracing::warn!(
                job_id = job.id,
                name = %job.name,
                attempt = job.attempts,
                error = %error,
                "Job failed"
            );
            JobQueueRepo::fail(pool, job.id, &error.to_string()).await?;
        }
    }

    Ok(true)
}

/// Poll the queue until the process is stopped. Drains due jobs back to
/// back, then sleeps for `poll_interval` when the queue is empty.
pub async fn run(pool: PgPool, poll_interval: Duration) {
    loop {
        match run_once(&pool).await {
            Ok(true) => {}
            Ok(false) => tokio::time::sleep(poll_interval).await,
            Err(error) => {
                // Queue access failed; back off rather than spin.
                tracing::error!(error = %error, "Queue poll failed");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}
