// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use pendo_core::PendoError;
use pendo_router::SessionRouter;

use crate::auth::{auth_middleware, AuthConfig};
use crate::handlers;
use crate::ws;

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// The session router behind every endpoint.
    pub router: Arc<SessionRouter>,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Health state for unauthenticated endpoints.
    pub health: HealthState,
}

/// Gateway server configuration (mirrors ServerConfig from pendo-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

/// Build the gateway route tree.
///
/// - Public: `GET /health`, `GET /metrics`
/// - Authenticated `/v1`: every boundary operation of the chat core
/// - `GET /ws`: room subscriptions (auth via query param during the handshake)
pub fn build_router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    // Unauthenticated public routes (health + metrics for systemd and Prometheus).
    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .route("/metrics", get(handlers::get_public_metrics))
        .with_state(state.clone());

    // Routes requiring authentication.
    let api_routes = Router::new()
        .route(
            "/v1/conversations",
            post(handlers::post_conversations).get(handlers::get_conversations),
        )
        .route("/v1/conversations/{id}", get(handlers::get_conversation))
        .route(
            "/v1/conversations/{id}/messages",
            post(handlers::post_message),
        )
        .route("/v1/conversations/{id}/claim", post(handlers::post_claim))
        .route("/v1/conversations/{id}/end", post(handlers::post_end))
        .route(
            "/v1/conversations/{id}/escalate",
            post(handlers::post_escalate),
        )
        .route("/v1/queue", get(handlers::get_queue))
        .route(
            "/v1/counsellors/{id}/conversations",
            get(handlers::get_counsellor_conversations),
        )
        .route(
            "/v1/notifications/video",
            post(handlers::post_video_notification),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state.clone());

    // WebSocket route (auth happens during handshake, not via middleware).
    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(ws_routes)
        .layer(CorsLayer::permissive())
}

/// Start the gateway HTTP/WebSocket server and serve until the shutdown
/// token fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), PendoError> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PendoError::Channel {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| PendoError::Channel {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pendo_bus::RoomBus;
    use pendo_config::model::StorageConfig;
    use pendo_storage::SqliteStore;
    use tempfile::tempdir;
    use tower::util::ServiceExt;

    const TEST_TOKEN: &str = "test-token-long-enough";

    async fn test_state(dir: &tempfile::TempDir) -> GatewayState {
        let db_path = dir.path().join("gateway.db");
        let store = SqliteStore::new(StorageConfig {
            database_path: db_path.to_str().unwrap().to_string(),
            wal_mode: true,
        });
        store.initialize().await.unwrap();
        let router = SessionRouter::new(Arc::new(store), Arc::new(RoomBus::new(64)));
        GatewayState {
            router: Arc::new(router),
            auth: AuthConfig {
                bearer_token: Some(TEST_TOKEN.to_string()),
            },
            health: HealthState {
                start_time: std::time::Instant::now(),
                prometheus_render: None,
            },
        }
    }

    #[tokio::test]
    async fn health_is_public() {
        let dir = tempdir().unwrap();
        let app = build_router(test_state(&dir).await);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        let dir = tempdir().unwrap();
        let app = build_router(test_state(&dir).await);

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn v1_routes_reject_missing_token() {
        let dir = tempdir().unwrap();
        let app = build_router(test_state(&dir).await);

        let response = app
            .oneshot(Request::get("/v1/queue").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn v1_routes_accept_bearer_token() {
        let dir = tempdir().unwrap();
        let app = build_router(test_state(&dir).await);

        let response = app
            .oneshot(
                Request::get("/v1/queue")
                    .header("authorization", format!("Bearer {TEST_TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn conversation_endpoints_round_trip() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir).await;
        let app = build_router(state.clone());

        // Open a conversation.
        let response = app
            .clone()
            .oneshot(
                Request::post("/v1/conversations")
                    .header("authorization", format!("Bearer {TEST_TOKEN}"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"student_id": "NRB-1234"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // It appears in the queue.
        let conv = state.router.list_queue().await.unwrap();
        assert_eq!(conv.len(), 1);
        let conv_id = conv[0].id.clone();

        // Claim it over HTTP.
        let response = app
            .clone()
            .oneshot(
                Request::post(format!("/v1/conversations/{conv_id}/claim"))
                    .header("authorization", format!("Bearer {TEST_TOKEN}"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"counsellor_id": "CNSL-9001"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // A second claim races and loses with 409.
        let response = app
            .clone()
            .oneshot(
                Request::post(format!("/v1/conversations/{conv_id}/claim"))
                    .header("authorization", format!("Bearer {TEST_TOKEN}"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"counsellor_id": "CNSL-9002"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // Unknown conversation is 404.
        let response = app
            .oneshot(
                Request::get("/v1/conversations/no-such-id")
                    .header("authorization", format!("Bearer {TEST_TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_student_id_is_bad_request() {
        let dir = tempdir().unwrap();
        let app = build_router(test_state(&dir).await);

        let response = app
            .oneshot(
                Request::post("/v1/conversations")
                    .header("authorization", format!("Bearer {TEST_TOKEN}"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"student_id": "  "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
