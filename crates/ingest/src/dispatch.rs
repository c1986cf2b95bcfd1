//! Downstream job dispatch.
//!
//! After a successful run, the pipeline enqueues recomputation jobs from
//! the report type's templates. Dispatch is fire-and-forget: the pipeline
//! never reads a job back or waits for completion. Idempotency comes from
//! a deterministic key -- re-running the same day's import produces the
//! same keys, and the queue drops enqueue attempts it has already seen.

use async_trait::async_trait;
use chrono::NaiveDate;
use finback_core::registry::ReportTypeConfig;
use serde::Serialize;

use crate::error::ImportError;
use crate::store::Scope;

/// A queued downstream recomputation task.
#[derive(Debug, Clone, Serialize)]
pub struct DownstreamJob {
    pub name: String,
    pub payload: serde_json::Value,
    /// Deterministic: `{name}:{scope values...}:{business_date}`.
    pub idempotency_key: String,
    pub max_attempts: i32,
    pub backoff_secs: i64,
    /// Soft ordering for chained jobs; the queue schedules the job this
    /// many seconds in the future.
    pub delay_secs: i64,
}

/// Abstract enqueue-with-idempotency-key contract, independent of any
/// broker. Returns `false` when the queue already holds a job with the
/// same idempotency key.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &DownstreamJob) -> Result<bool, ImportError>;
}

/// Build the jobs a successful run of `config` fans out.
pub fn build_jobs(
    config: &ReportTypeConfig,
    scope: &Scope,
    business_date: NaiveDate,
) -> Vec<DownstreamJob> {
    config
        .jobs
        .iter()
        .map(|template| {
            let mut key_parts = vec![template.name.to_string()];
            key_parts.extend(scope.iter().map(|(_, v)| v.clone()));
            key_parts.push(business_date.format("%Y-%m-%d").to_string());

            let mut payload = serde_json::json!({
                "reportType": config.key,
                "businessDate": business_date.format("%Y-%m-%d").to_string(),
            });
            for (field, value) in scope {
                payload[field] = serde_json::Value::String(value.clone());
            }

            DownstreamJob {
                name: template.name.to_string(),
                payload,
                idempotency_key: key_parts.join(":"),
                max_attempts: template.max_attempts,
                backoff_secs: template.backoff_secs,
                delay_secs: template.delay_secs,
            }
        })
        .collect()
}

/// Enqueue all jobs, logging deduplicated attempts. Queue failures are
/// fatal to the caller (the load already committed; the caller surfaces
/// the error with the partial counts).
pub async fn dispatch_jobs(
    queue: &dyn JobQueue,
    jobs: &[DownstreamJob],
) -> Result<(), ImportError> {
    for job in jobs {
        let enqueued = queue.enqueue(job).await?;
        if enqueued {
            tracing::info!(job = %job.name, key = %job.idempotency_key, "Enqueued downstream job");
        } else {
            tracing::info!(job = %job.name, key = %job.idempotency_key, "Downstream job already queued, skipped");
        }
    }
    Ok(())
}
