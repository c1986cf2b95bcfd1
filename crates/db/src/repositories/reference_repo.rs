//! Lookups against the reference masters (clients, scrips).

use finback_core::types::DbId;
use sqlx::PgPool;

pub struct ReferenceRepo;

impl ReferenceRepo {
    /// Resolve a cleaned client code to its internal id.
    pub async fn client_id_by_code(
        pool: &PgPool,
        code: &str,
    ) -> Result<Option<DbId>, sqlx::Error> {
        let row: Option<(DbId,)> =
            sqlx::query_as("SELECT id FROM clients WHERE client_code = $1")
                .bind(code)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }

    /// Resolve a cleaned scrip code to its internal id.
    pub async fn scrip_id_by_code(
        pool: &PgPool,
        code: &str,
    ) -> Result<Option<DbId>, sqlx::Error> {
        let row: Option<(DbId,)> =
            sqlx::query_as("SELECT id FROM scrips WHERE scrip_code = $1")
                .bind(code)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }
}
