//! Dynamic-SQL access to the report target tables.
//!
//! The importer works against whichever table its report type names, so
//! the SQL here is built from the registry's table and column names.
//! Identifiers are interpolated only from `&'static` registry strings,
//! never from request input; all values go through bind parameters, with
//! nulls emitted as literal NULL so a single statement can mix column
//! types.

use finback_core::keys::{KEY_SEPARATOR, NULL_SENTINEL};
use finback_core::rows::FieldValue;
use finback_ingest::strategy::UPSERT_SUB_BATCH;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};

/// One materialized row in insert column order.
pub type Row = Vec<FieldValue>;

/// Scope filter: `(column, value)` pairs, ANDed together.
pub type ScopeFilter = [(String, String)];

pub struct ReportTableRepo;

impl ReportTableRepo {
    pub async fn count(pool: &PgPool, table: &str) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// Atomically snapshot and delete all rows matching `scope`.
    ///
    /// The snapshot carries only the configured columns (generated id and
    /// timestamps are regenerated on restore), decoded via `to_jsonb` so
    /// one query shape covers every table.
    pub async fn take_scope(
        pool: &PgPool,
        table: &str,
        columns: &[&str],
        scope: &ScopeFilter,
    ) -> Result<(Vec<Row>, u64), sqlx::Error> {
        let mut tx = pool.begin().await?;
        let filter = scope_where(scope);

        let select = format!("SELECT to_jsonb(t) FROM {table} t{filter}");
        let mut query = sqlx::query_as::<_, (serde_json::Value,)>(&select);
        for (_, value) in scope {
            query = query.bind(value);
        }
        let json_rows = query.fetch_all(&mut *tx).await?;

        let delete = format!("DELETE FROM {table}{filter}");
        let mut query = sqlx::query(&delete);
        for (_, value) in scope {
            query = query.bind(value);
        }
        let deleted = query.execute(&mut *tx).await?.rows_affected();

        tx.commit().await?;

        let rows = json_rows
            .iter()
            .map(|(value,)| json_to_row(value, columns))
            .collect();
        Ok((rows, deleted))
    }

    pub async fn delete_scope(
        pool: &PgPool,
        table: &str,
        scope: &ScopeFilter,
    ) -> Result<u64, sqlx::Error> {
        let sql = format!("DELETE FROM {table}{}", scope_where(scope));
        let mut query = sqlx::query(&sql);
        for (_, value) in scope {
            query = query.bind(value);
        }
        Ok(query.execute(pool).await?.rows_affected())
    }

    pub async fn truncate(pool: &PgPool, table: &str) -> Result<(), sqlx::Error> {
        sqlx::query(&format!("TRUNCATE {table}")).execute(pool).await?;
        Ok(())
    }

    /// Insert `rows` with one multi-row statement (atomic by itself).
    pub async fn insert_rows(
        pool: &PgPool,
        table: &str,
        columns: &[&str],
        rows: &[Row],
    ) -> Result<u64, sqlx::Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = build_insert(table, columns, rows);
        let mut query = sqlx::query(&sql);
        for row in rows {
            for value in row {
                query = bind_value(query, value);
            }
        }
        Ok(query.execute(pool).await?.rows_affected())
    }

    /// Insert-or-update on the table's unique index over `key_columns`.
    ///
    /// Statements are chunked to stay within bind-parameter limits, but
    /// the whole set commits in one transaction. Upsert target tables all
    /// carry an `updated_at` column.
    pub async fn upsert_rows(
        pool: &PgPool,
        table: &str,
        columns: &[&str],
        key_columns: &[&str],
        rows: &[Row],
    ) -> Result<u64, sqlx::Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let update_columns: Vec<String> = columns
            .iter()
            .filter(|col| !key_columns.contains(col))
            .map(|col| format!("{col} = EXCLUDED.{col}"))
            .collect();
        let conflict = if update_columns.is_empty() {
            format!(" ON CONFLICT ({}) DO NOTHING", key_columns.join(", "))
        } else {
            format!(
                " ON CONFLICT ({}) DO UPDATE SET {}, updated_at = NOW()",
                key_columns.join(", "),
                update_columns.join(", ")
            )
        };

        let mut tx = pool.begin().await?;
        let mut affected = 0;
        for chunk in rows.chunks(UPSERT_SUB_BATCH) {
            let sql = format!("{}{conflict}", build_insert(table, columns, chunk));
            let mut query = sqlx::query(&sql);
            for row in chunk {
                for value in row {
                    query = bind_value(query, value);
                }
            }
            affected += query.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    /// Of `keys` (composite keys in the pipeline's normalized form),
    /// return those already present in `table`.
    pub async fn existing_keys(
        pool: &PgPool,
        table: &str,
        key_columns: &[&str],
        keys: &[String],
    ) -> Result<Vec<String>, sqlx::Error> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let expr = key_expression(key_columns);
        let sql = format!("SELECT DISTINCT {expr} FROM {table} WHERE {expr} = ANY($1)");
        let found: Vec<(String,)> = sqlx::query_as(&sql).bind(keys).fetch_all(pool).await?;
        Ok(found.into_iter().map(|(key,)| key).collect())
    }
}

fn scope_where(scope: &ScopeFilter) -> String {
    if scope.is_empty() {
        return String::new();
    }
    let conditions: Vec<String> = scope
        .iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{column} = ${}", i + 1))
        .collect();
    format!(" WHERE {}", conditions.join(" AND "))
}

fn build_insert(table: &str, columns: &[&str], rows: &[Row]) -> String {
    let mut sql = format!("INSERT INTO {table} ({}) VALUES ", columns.join(", "));
    let mut param = 1usize;
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for (j, value) in row.iter().enumerate() {
            if j > 0 {
                sql.push_str(", ");
            }
            if matches!(value, FieldValue::Null) {
                sql.push_str("NULL");
            } else {
                sql.push_str(&format!("${param}"));
                param += 1;
            }
        }
        sql.push(')');
    }
    sql
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q FieldValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        FieldValue::Text(s) => query.bind(s.as_str()),
        FieldValue::Int(i) => query.bind(*i),
        FieldValue::Float(f) => query.bind(*f),
        // Emitted as a literal in the statement.
        FieldValue::Null => query,
    }
}

/// SQL rendering of the composite key, matching
/// [`finback_core::keys::composite_key`]: uppercased text components with
/// null/empty substituted by the sentinel, joined by the separator.
fn key_expression(key_columns: &[&str]) -> String {
    let parts: Vec<String> = key_columns
        .iter()
        .map(|col| format!("UPPER(COALESCE(NULLIF({col}::text, ''), '{NULL_SENTINEL}'))"))
        .collect();
    parts.join(&format!(" || '{KEY_SEPARATOR}' || "))
}

fn json_to_row(value: &serde_json::Value, columns: &[&str]) -> Row {
    columns
        .iter()
        .map(|col| match value.get(col) {
            Some(serde_json::Value::String(s)) => FieldValue::Text(s.clone()),
            Some(serde_json::Value::Number(n)) => n
                .as_i64()
                .map(FieldValue::Int)
                .or_else(|| n.as_f64().map(FieldValue::Float))
                .unwrap_or(FieldValue::Null),
            _ => FieldValue::Null,
        })
        .collect()
}
