//! Downstream job entity, create DTO, and status values.

use serde::Serialize;
use sqlx::FromRow;

use finback_core::types::{DbId, Timestamp};

/// Lifecycle states of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    /// Exhausted its retry budget.
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Dead => "dead",
        }
    }
}

/// A row from `downstream_jobs`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueuedJob {
    pub id: DbId,
    pub name: String,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub backoff_secs: i64,
    pub run_after: Timestamp,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for enqueueing a job.
#[derive(Debug, Clone)]
pub struct EnqueueJob {
    pub name: String,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
    pub max_attempts: i32,
    pub backoff_secs: i64,
    /// Seconds from now until the job becomes claimable.
    pub delay_secs: i64,
}
