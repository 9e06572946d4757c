//! Axum server setup and router configuration.

use crate::state::AppState;
use crate::ws::{activity_ws, lottery_ws};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use olst_core::store::{StateSink, StoreValue};
use olst_sdk::keys::StreamKey;
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        // Point read of the projected cache
        .route("/lotteries/{id}", get(get_lottery))
        // Streaming endpoints
        .route("/lotteries/{id}/ws", get(lottery_ws))
        .route("/activity/ws", get(activity_ws))
        // Add state to all routes
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Simple health check - returns OK if the server is running.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /lotteries/{id}` — point read of one projected cache entry.
///
/// Serves only the push-cache tier; a 404 means the entity has never
/// been projected, not that it does not exist on chain.
async fn get_lottery(State(state): State<AppState>, Path(id): Path<u64>) -> impl IntoResponse {
    match state.store.read(StreamKey::Entity(id)).await {
        Some(StoreValue::Lottery(cache)) => (StatusCode::OK, Json(json!(cache))),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "lottery not found" })),
        ),
    }
}

/// Run the server with graceful shutdown support.
pub async fn run_server(
    router: Router,
    addr: SocketAddr,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
}
