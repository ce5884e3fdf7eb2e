/// API сервер обучения и прогнозирования

use signal_forecast::{
    api::{router, AppState},
    config::AppConfig,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    // Инициализация логирования; RUST_LOG важнее SIGNAL_FORECAST_LOG_LEVEL
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    match &config.model_dir {
        Some(dir) => tracing::info!("Models are stored in {}", dir.display()),
        None => tracing::info!("Model directory not set, models are kept in memory"),
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, router(AppState::new(config))).await?;
    Ok(())
}
