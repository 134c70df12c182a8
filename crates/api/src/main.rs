use anyhow::Result;
use tracing::info;

use family_ledger_api::app::{build_sweeper, create_app};
use family_ledger_api::config::Config;
use family_ledger_api::jobs::{ExpireJoinRequestsJob, JobScheduler, PoolMetricsJob};
use family_ledger_api::middleware::{init_metrics, logging::init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Family Ledger API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize metrics recorder
    init_metrics().map_err(anyhow::Error::msg)?;

    // Create database pool
    let pool = persistence::db::create_pool(&(&config.database).into()).await?;

    // Run migrations
    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    // Start background jobs
    let mut scheduler = JobScheduler::new();
    scheduler.register(ExpireJoinRequestsJob::new(
        build_sweeper(&config, pool.clone()),
        config.family.sweep_interval_minutes,
    ));
    scheduler.register(PoolMetricsJob::new(pool.clone()));
    scheduler.start();

    // Build application
    let addr = config.socket_addr()?;
    let app = create_app(config, pool);

    // Start server
    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    // Wind down jobs once the server loop exits
    scheduler.shutdown();
    scheduler
        .wait_for_shutdown(std::time::Duration::from_secs(10))
        .await;

    Ok(())
}
