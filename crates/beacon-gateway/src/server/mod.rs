//! Gateway server setup
//!
//! Provides the WebSocket server configuration, routes, and lifecycle.

mod handler;
mod state;

pub use handler::gateway_handler;
pub use state::GatewayState;

use crate::registry::ConnectionRegistry;
use crate::store::MemoryNotificationStore;
use axum::{routing::get, Router};
use beacon_common::{AppConfig, AppError, JwtIdentityProvider, JwtService};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Create the gateway router
pub fn create_router() -> Router<GatewayState> {
    Router::new()
        .route("/gateway", get(gateway_handler))
        .route("/health", get(health_check))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Build the complete application
pub fn create_app(state: GatewayState) -> Router {
    create_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire the default collaborators and create a `GatewayState`
///
/// The shipped binary verifies bearer credentials as JWTs and serves
/// notifications from the process-local store; other deployments build the
/// state by hand with their own collaborator implementations.
pub fn create_gateway_state(config: AppConfig) -> GatewayState {
    let registry = ConnectionRegistry::new_shared(config.limits, config.liveness);

    let jwt = JwtService::new(&config.jwt.secret, config.jwt.access_token_expiry);
    let identity = Arc::new(JwtIdentityProvider::new(jwt));

    let store = Arc::new(MemoryNotificationStore::new());

    GatewayState::new(
        registry,
        identity,
        store.clone(),
        store,
        Arc::new(config),
    )
}

/// Run the gateway server until the shutdown signal arrives
pub async fn run_server(app: Router, addr: SocketAddr, state: &GatewayState) -> Result<(), AppError> {
    tracing::info!("Starting gateway server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Gateway listening on ws://{}/gateway", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Close every connection and stop the sweep before exiting
    state.registry().shutdown();

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}

/// Run the complete gateway server with configuration
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let host: IpAddr = config
        .gateway
        .host
        .parse()
        .map_err(|_| AppError::Config(format!("invalid gateway host: {}", config.gateway.host)))?;
    let addr = SocketAddr::from((host, config.gateway.port));

    let state = create_gateway_state(config);
    state.registry().start();

    let app = create_app(state.clone());

    run_server(app, addr, &state).await
}
