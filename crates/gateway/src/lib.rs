//! HTTP checkout gateway for the saga orchestrator.
//!
//! `/checkout/{order_id}` blocks until the order's checkout saga finishes
//! and answers with its outcome; the [`GatewayBridge`] pairs each waiting
//! request with the orchestrator's release. [`CheckoutSystem`] wires the
//! transport, saga log, orchestrator and participants of one process.

pub mod bridge;
pub mod config;
pub mod error;
pub mod routes;
pub mod system;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{CheckoutInitiator, Orchestrator};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use bridge::{GatewayBridge, PendingCheckout};
pub use config::{Config, ShardCounts};
pub use error::{ApiError, BridgeError, GatewayError, Result};
pub use system::{CheckoutSystem, SagaLog};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub bridge: Arc<GatewayBridge>,
    pub initiator: Arc<dyn CheckoutInitiator>,
    pub orchestrator: Arc<Orchestrator<SagaLog>>,
}

impl AppState {
    /// State serving the checkouts of `system`.
    pub fn for_system(system: &CheckoutSystem, bridge: Arc<GatewayBridge>) -> Arc<Self> {
        Arc::new(Self {
            bridge,
            initiator: system.orders.clone(),
            orchestrator: system.orchestrator.clone(),
        })
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health))
        .route(
            "/checkout/{order_id}",
            get(routes::checkout::checkout).post(routes::checkout::checkout),
        )
        .route(
            "/release/{order_id}/{status}",
            post(routes::checkout::release),
        )
        .route("/sagas/{saga_id}", get(routes::sagas::get))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Serves `app` on `listener` until `shutdown` resolves.
///
/// Blocked checkouts must be released before in-flight requests can drain,
/// so the bridge is closed first and every waiting request answers with
/// failure.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    bridge: Arc<GatewayBridge>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            bridge.close();
        })
        .await
}
