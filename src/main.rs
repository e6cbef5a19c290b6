use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use weatherdeck::config::{LoggingConfig, WeatherdeckConfig};
use weatherdeck::location_resolver::{LocationResolver, NoDevicePosition};
use weatherdeck::provider::WeatherstackClient;
use weatherdeck::session::SessionController;
use weatherdeck::{ResponseCache, View};

fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    match config.format.as_str() {
        "json" => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = WeatherdeckConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);
    info!(version = weatherdeck::VERSION, "starting weatherdeck session core");

    let provider =
        WeatherstackClient::new(&config.provider).context("Failed to build weather client")?;
    let resolver = LocationResolver::new(
        reqwest::Client::new(),
        Arc::new(NoDevicePosition),
        config.location.clone(),
    );
    let cache = ResponseCache::from_config(&config.cache);
    let controller =
        SessionController::new(Arc::new(provider), resolver, cache, config.session.clone());

    let outcome = controller.initialize().await;
    let state = controller.state();
    info!(
        ?outcome,
        query = %state.current_query,
        view = %state.active_view,
        "session initialized"
    );
    if let Some(snapshot) = state.snapshot(View::Current) {
        info!(
            location = %snapshot.location.name,
            country = %snapshot.location.country,
            "current conditions loaded"
        );
    }

    let tasks = controller.start();
    info!(
        auto_refresh_minutes = config.session.auto_refresh_minutes,
        drift_check_seconds = config.session.drift_check_seconds,
        "background tasks running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("shutting down");
    tasks.shutdown();

    Ok(())
}
