use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Mount the import routes under `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/imports/{report_type}",
            post(handlers::imports::upload_report),
        )
        .route("/imports/status", get(handlers::imports::import_status))
        .route("/imports/runs", get(handlers::imports::run_history))
}
