//! HTTP server implementation using Axum.

use crate::handlers::{handle_health, handle_rpc, handle_tools};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tierflow_core::{CancellationToken, TierflowApi};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    pub api: TierflowApi,
}

/// Build the router without binding it.
pub fn router(api: TierflowApi, max_concurrent_requests: usize) -> Router {
    let state = Arc::new(AppState { api });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/tools", get(handle_tools))
        .route("/rpc", post(handle_rpc))
        .layer(ConcurrencyLimitLayer::new(max_concurrent_requests.max(1)))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the JSON-RPC HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
/// The server drains in-flight requests and stops when `shutdown` fires.
pub async fn start_server(
    api: TierflowApi,
    host: &str,
    port: u16,
    max_concurrent_requests: usize,
    shutdown: CancellationToken,
) -> anyhow::Result<SocketAddr> {
    let app = router(api, max_concurrent_requests);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
