use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use finback_worker::runner;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "finback_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = finback_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    finback_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let poll_secs: u64 = std::env::var("WORKER_POLL_SECS")
        .unwrap_or_else(|_| "5".into())
        .parse()
        .expect("WORKER_POLL_SECS must be a valid u64");

    tracing::info!(poll_secs, "Worker starting");

    tokio::select! {
        () = runner::run(pool, Duration::from_secs(poll_secs)) => {}
        result = tokio::signal::ctrl_c() => {
            result.expect("Failed to install Ctrl-C handler");
            tracing::info!("Received SIGINT (Ctrl-C), stopping worker");
        }
    }
}
