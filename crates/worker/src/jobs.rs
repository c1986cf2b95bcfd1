//! Job handlers.
//!
//! Each handler recomputes one derived table from the imported report
//! tables. Handlers are idempotent upserts keyed on the derived table's
//! natural key, so replays (retries, duplicate dispatch across days) are
//! harmless.

use chrono::NaiveDate;
use sqlx::PgPool;

/// Why a claimed job could not be executed.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The job name has no registered handler.
    #[error("unknown job: {0}")]
    UnknownJob(String),

    /// The payload is missing or malformed.
    #[error("bad payload: {0}")]
    BadPayload(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Execute one claimed job by name.
pub async fn execute(pool: &PgPool, name: &str, payload: &serde_json::Value) -> Result<(), JobError> {
    match name {
        "client-daily-aggregates" => client_daily_aggregates(pool, payload).await,
        "not-traded-days" => not_traded_days(pool, payload).await,
        "monthly-client-summary" => monthly_client_summary(pool, payload).await,
        other => Err(JobError::UnknownJob(other.to_string())),
    }
}

fn payload_str<'a>(payload: &'a serde_json::Value, field: &str) -> Result<&'a str, JobError> {
    payload[field]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| JobError::BadPayload(format!("missing field '{field}'")))
}

fn payload_date(payload: &serde_json::Value, field: &str) -> Result<NaiveDate, JobError> {
    let raw = payload_str(payload, field)?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| JobError::BadPayload(format!("invalid date in '{field}': {raw}")))
}

/// Recompute per-client, per-day buy/sell quantities and gross turnover
/// from the trade reports in one financial year + region partition.
async fn client_daily_aggregates(
    pool: &PgPool,
    payload: &serde_json::Value,
) -> Result<(), JobError> {
    let financial_year = payload_str(payload, "financial_year")?;
    let region = payload_str(payload, "region")?;

    let result = sqlx::query(
        "INSERT INTO client_daily_aggregates \
             (client_code, trade_date, buy_quantity, sell_quantity, gross_turnover) \
         SELECT client_code, trade_date, \
                COALESCE(SUM(quantity) FILTER (WHERE side = 'BUY'), 0), \
                COALESCE(SUM(quantity) FILTER (WHERE side = 'SELL'), 0), \
                COALESCE(SUM(quantity * price), 0) \
         FROM trade_reports \
         WHERE financial_year = $1 AND region = $2 \
         GROUP BY client_code, trade_date \
         ON CONFLICT (client_code, trade_date) DO UPDATE SET \
             buy_quantity = EXCLUDED.buy_quantity, \
             sell_quantity = EXCLUDED.sell_quantity, \
             gross_turnover = EXCLUDED.gross_turnover, \
             updated_at = NOW()",
    )
    .bind(financial_year)
    .bind(region)
    .execute(pool)
    .await?;

    tracing::info!(
        financial_year,
        region,
        rows = result.rows_affected(),
        "Recomputed client daily aggregates"
    );
    Ok(())
}

/// Record which clients from the master had no trade on the business date
/// in the given partition. Inserts are keep-first: a day already recorded
/// stays recorded.
async fn not_traded_days(pool: &PgPool, payload: &serde_json::Value) -> Result<(), JobError> {
    let financial_year = payload_str(payload, "financial_year")?;
    let region = payload_str(payload, "region")?;
    let business_date = payload_date(payload, "businessDate")?
        .format("%Y-%m-%d")
        .to_string();

    let result = sqlx::query(
        "INSERT INTO not_traded_days (client_code, business_date) \
         SELECT c.client_code, $3 \
         FROM clients c \
         WHERE NOT EXISTS ( \
             SELECT 1 FROM trade_reports t \
             WHERE t.client_code = c.client_code \
               AND t.trade_date = $3 \
               AND t.financial_year = $1 AND t.region = $2 \
         ) \
         ON CONFLICT (client_code, business_date) DO NOTHING",
    )
    .bind(financial_year)
    .bind(region)
    .bind(&business_date)
    .execute(pool)
    .await?;

    tracing::info!(
        business_date,
        rows = result.rows_affected(),
        "Recorded not-traded days"
    );
    Ok(())
}

/// Recompute the month-to-date brokerage and charges per client for the
/// business date's month from the daily revenue feed.
async fn monthly_client_summary(
    pool: &PgPool,
    payload: &serde_json::Value,
) -> Result<(), JobError> {
    let month = payload_date(payload, "businessDate")?
        .format("%Y-%m")
        .to_string();

    let result = sqlx::query(
        "INSERT INTO monthly_client_summary (client_code, month, brokerage, charges) \
         SELECT client_code, $1, \
                COALESCE(SUM(brokerage), 0), \
                COALESCE(SUM(charges), 0) \
         FROM daily_revenue \
         WHERE LEFT(revenue_date, 7) = $1 \
         GROUP BY client_code \
         ON CONFLICT (client_code, month) DO UPDATE SET \
             brokerage = EXCLUDED.brokerage, \
             charges = EXCLUDED.charges, \
             updated_at = NOW()",
    )
    .bind(&month)
    .execute(pool)
    .await?;

    tracing::info!(
        month,
        rows = result.rows_affected(),
        "Recomputed monthly client summary"
    );
    Ok(())
}
