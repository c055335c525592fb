use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;

use leadserver::core::config::AppConfig;
use leadserver::core::shared::state::AppState;
use leadserver::core::shared::utils::{create_conn, run_migrations};
use leadserver::main_module::run_axum_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::load().map_err(|e| {
        error!("Failed to load configuration: {e}");
        e
    })?;
    info!(
        "Starting leadserver {} (reference offset {} min, daily call limit {:?})",
        env!("CARGO_PKG_VERSION"),
        config.engagement.reference_utc_offset_minutes,
        config.engagement.daily_call_limit
    );

    let pool = create_conn(&config.database).map_err(|e| {
        error!("Failed to create database pool: {e}");
        e
    })?;

    if config.database.run_migrations {
        run_migrations(&pool).map_err(|e| anyhow::anyhow!("Failed to run migrations: {e}"))?;
    }

    let state = Arc::new(AppState::new(pool, config));
    run_axum_server(state).await?;
    info!("leadserver stopped");
    Ok(())
}
