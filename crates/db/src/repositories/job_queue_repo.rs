//! Repository for the `downstream_jobs` queue.
//!
//! Enqueue is idempotent via the unique index on `idempotency_key`;
//! claiming uses `FOR UPDATE SKIP LOCKED` so concurrent workers never
//! double-claim a job.

use finback_core::types::DbId;
use sqlx::PgPool;

use crate::models::job::{EnqueueJob, JobStatus, QueuedJob};

/// Column list for `downstream_jobs` queries.
const COLUMNS: &str = "\
    id, name, payload, idempotency_key, status, \
    attempts, max_attempts, backoff_secs, run_after, \
    last_error, created_at, updated_at";

pub struct JobQueueRepo;

impl JobQueueRepo {
    /// Enqueue a job unless its idempotency key is already present.
    /// Returns whether a row was actually inserted.
    pub async fn enqueue(pool: &PgPool, job: &EnqueueJob) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO downstream_jobs \
             (name, payload, idempotency_key, status, max_attempts, backoff_secs, run_after) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW() + make_interval(secs => $7)) \
             ON CONFLICT (idempotency_key) DO NOTHING",
        )
        .bind(&job.name)
        .bind(&job.payload)
        .bind(&job.idempotency_key)
        .bind(JobStatus::Pending.as_str())
        .bind(job.max_attempts)
        .bind(job.backoff_secs)
        .bind(job.delay_secs as f64)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically claim the next due pending job.
    pub async fn claim_next(pool: &PgPool) -> Result<Option<QueuedJob>, sqlx::Error> {
        let query = format!(
            "UPDATE downstream_jobs \
             SET status = $1, attempts = attempts + 1, updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM downstream_jobs \
                 WHERE status = $2 AND run_after <= NOW() \
                 ORDER BY run_after ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueuedJob>(&query)
            .bind(JobStatus::Running.as_str())
            .bind(JobStatus::Pending.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Mark a claimed job as successfully executed.
    pub async fn complete(pool: &PgPool, job_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE downstream_jobs SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .bind(JobStatus::Completed.as_str())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a failed execution. The job goes back to pending with a
    /// linear backoff until its attempts are exhausted, then to dead.
    pub async fn fail(pool: &PgPool, job_id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE downstream_jobs \
             SET status = CASE WHEN attempts >= max_attempts THEN $2 ELSE $3 END, \
                 run_after = NOW() + make_interval(secs => (backoff_secs * attempts)::double precision), \
                 last_error = $4, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(JobStatus::Dead.as_str())
        .bind(JobStatus::Pending.as_str())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }
}
