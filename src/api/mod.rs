//! Relay HTTP Surface
//!
//! HTTP layer of the relay process, built with Axum.
//!
//! # Endpoints
//!
//! ## WebSocket
//! - `GET /public` - Public viewer channel
//! - `GET /admin?token=<secret>` - Admin channel
//!
//! Every other path also reaches the upgrade handler and is answered with
//! `404` before any handshake takes place.
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use pagecast::api::{serve, AppState};
//! use pagecast::config::Config;
//! use pagecast::websocket::Hub;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let (hub, handle) = Hub::new();
//!     hub.spawn();
//!
//!     serve(AppState::new(handle, &config), &config.server).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::websocket::websocket_handler;

/// Build the relay router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .nest("/health", health_routes)
        .fallback(websocket_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state)
}

/// Start the relay server
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<(), ApiError> {
    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Pagecast relay listening on {}", addr);
    tracing::info!("Public channel: ws://{}/public", addr);
    tracing::info!("Admin channel: ws://{}/admin?token=<token>", addr);

    serve_on(listener, state, shutdown_signal()).await?;

    tracing::info!("Pagecast relay shut down gracefully");
    Ok(())
}

/// Serve the relay on an already-bound listener until `shutdown` resolves
pub async fn serve_on<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ApiError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let router = build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))
}

/// Wait for shutdown signal
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::websocket::Hub;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let (hub, handle) = Hub::new();
        hub.spawn();
        build_router(AppState::new(handle, &Config::default()))
    }

    async fn get_status(uri: &str) -> (StatusCode, Option<String>) {
        let response = create_test_app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let connection = response
            .headers()
            .get(header::CONNECTION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        (response.status(), connection)
    }

    #[tokio::test]
    async fn test_health_live() {
        let (status, _) = get_status("/health/live").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready() {
        let (status, _) = get_status("/health/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full() {
        let response = create_test_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["public_connections"], 0);
        assert_eq!(json["admin_connections"], 0);
        assert_eq!(json["clustered"], false);
    }

    #[tokio::test]
    async fn test_unknown_path_rejected() {
        let (status, connection) = get_status("/chat").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(connection.as_deref(), Some("close"));
    }

    #[tokio::test]
    async fn test_admin_bad_token_rejected() {
        let (status, connection) = get_status("/admin?token=wrong").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(connection.as_deref(), Some("close"));

        let (status, _) = get_status("/admin").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = get_status("/admin?token=wrong&token=admin-secret-token").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_good_token_without_upgrade_is_not_auth_failure() {
        let (status, _) = get_status("/admin?token=admin-secret-token").await;
        assert_ne!(status, StatusCode::UNAUTHORIZED);
        assert_ne!(status, StatusCode::NOT_FOUND);
        assert!(status.is_client_error() || status.is_server_error());
    }
}
