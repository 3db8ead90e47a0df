//! Checkout gateway entry point.

use std::sync::Arc;

use gateway::{AppState, CheckoutSystem, Config, GatewayBridge};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    let bridge = Arc::new(GatewayBridge::new(config.checkout_timeout));
    let system = CheckoutSystem::start(&config, bridge.clone()).await?;
    let app = gateway::create_app(AppState::for_system(&system, bridge.clone()), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, shards = ?config.shards, "starting checkout gateway");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    gateway::serve(listener, app, bridge, shutdown_signal()).await?;

    system.shutdown().await;
    tracing::info!("server shut down gracefully");
    Ok(())
}
