pub mod health;
pub mod imports;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /imports/{report_type}    upload a report file (POST, multipart)
/// /imports/status           last run per report type (GET)
/// /imports/runs             recent run history (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(imports::router())
}
