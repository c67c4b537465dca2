use tracing::info;

use roomcore::config::Config;
use roomcore::watcher;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    roomcore::observability::init(config.metrics_port);

    let app = roomcore::bootstrap(&config)?;
    info!("roomcore started");
    info!("  users service: {}", config.users_service_url);
    info!("  rooms service: {}", config.rooms_service_url);
    info!(
        "  breaker: {} failures / {}s recovery",
        config.failure_threshold,
        config.recovery_timeout.as_secs()
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let watcher_handle = tokio::spawn(watcher::run_watcher(
        app.engine.clone(),
        config.watcher_interval,
    ));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    watcher_handle.abort();

    for status in app.breakers.status_all() {
        info!(
            "  breaker {}: {} ({}/{} failures)",
            status.name, status.state, status.failure_count, status.failure_threshold
        );
    }
    info!("roomcore stopped");
    Ok(())
}
