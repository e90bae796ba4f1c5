//! axum server wiring for the control API.

use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{handlers, AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // === RUNTIME CONTROL ===
        .route("/api/runtime", get(handlers::get_all_workers))
        .route("/api/runtime/{instance_id}", get(handlers::get_worker))
        .route(
            "/api/runtime/{instance_id}/start",
            post(handlers::start_worker),
        )
        .route(
            "/api/runtime/{instance_id}/stop",
            post(handlers::stop_worker),
        )
        .route(
            "/api/runtime/{instance_id}/restart",
            post(handlers::restart_worker),
        )
        // === READ-ONLY VIEWS ===
        .route("/api/instances", get(handlers::get_instances))
        .route(
            "/api/instances/{instance_id}/targets",
            get(handlers::get_instance_targets),
        )
        .route(
            "/api/instances/{instance_id}/events",
            get(handlers::get_instance_events),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_web_server(state: AppState, host: &str, port: u16) -> Result<()> {
    let app = create_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Control API listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
}
