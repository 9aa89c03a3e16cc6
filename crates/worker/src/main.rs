use courier_common::config::AppConfig;
use courier_common::db;
use courier_common::redis_pool::create_redis_pool;
use courier_engine::services::NotificationServices;
use courier_worker::runner::PeriodicRunner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_worker=info,courier_engine=info,courier_notifier=info".into()),
        )
        .json()
        .init();

    tracing::info!("Courier worker starting...");

    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;

    let redis = create_redis_pool(&config.redis_url).await?;

    let services = NotificationServices::postgres(pool, redis, &config)?;
    let runner = PeriodicRunner::from_config(services, &config)?;

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        _ = runner.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Courier worker stopped.");
    Ok(())
}
