// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.
//!
//! Thin adapters from HTTP to the session router: deserialize, call,
//! map the error taxonomy onto status codes. NotFound -> 404,
//! Conflict -> 409 (a lost claim is a refresh trigger, not a failure),
//! Storage -> 503 (transient, retry with backoff).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use pendo_core::types::{ChatMessage, Conversation, ConversationState, RiskLevel, SenderRole};
use pendo_core::{PendoError, VideoNotification};

use crate::server::GatewayState;

/// Request body for POST /v1/conversations.
#[derive(Debug, Deserialize)]
pub struct OpenConversationRequest {
    /// Opaque student access code.
    pub student_id: String,
}

/// Request body for POST /v1/conversations/{id}/messages.
#[derive(Debug, Deserialize)]
pub struct AppendRequest {
    pub role: SenderRole,
    pub sender_id: String,
    pub content: String,
}

/// Response body for POST /v1/conversations/{id}/messages.
///
/// `message` is null when the append was a whitespace no-op.
#[derive(Debug, Serialize)]
pub struct AppendResponse {
    pub message: Option<ChatMessage>,
}

/// Request body for POST /v1/conversations/{id}/claim.
#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub counsellor_id: String,
}

/// Request body for POST /v1/conversations/{id}/escalate.
#[derive(Debug, Deserialize)]
pub struct EscalateRequest {
    pub risk_level: RiskLevel,
}

/// Query parameters for GET /v1/conversations.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub state: Option<ConversationState>,
}

/// Response body for GET /v1/conversations/{id}.
#[derive(Debug, Serialize)]
pub struct ConversationDetailResponse {
    pub conversation: Conversation,
    pub messages: Vec<ChatMessage>,
}

/// Request body for POST /v1/notifications/video.
#[derive(Debug, Deserialize)]
pub struct VideoNotifyRequest {
    /// Opaque payload built by the meeting scheduler.
    pub payload: serde_json::Value,
}

/// Response body for POST /v1/notifications/video.
#[derive(Debug, Serialize)]
pub struct VideoNotifyResponse {
    pub notification: VideoNotification,
    /// Connected dashboards the alert reached.
    pub subscribers: usize,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Map a core error onto an HTTP response.
fn error_response(err: PendoError) -> Response {
    let status = match &err {
        PendoError::NotFound { .. } => StatusCode::NOT_FOUND,
        PendoError::Conflict(_) => StatusCode::CONFLICT,
        PendoError::Storage { .. } => StatusCode::SERVICE_UNAVAILABLE,
        PendoError::Channel { .. } => StatusCode::BAD_GATEWAY,
        PendoError::Config(_) | PendoError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// GET /health (public)
pub async fn get_public_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics (public)
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (StatusCode::OK, render()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "metrics disabled".to_string(),
            }),
        )
            .into_response(),
    }
}

/// POST /v1/conversations
///
/// Student entry point: reuses the open conversation for the access code
/// or creates a fresh one.
pub async fn post_conversations(
    State(state): State<GatewayState>,
    Json(body): Json<OpenConversationRequest>,
) -> Response {
    let student_id = body.student_id.trim();
    if student_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "student_id must not be empty".to_string(),
            }),
        )
            .into_response();
    }
    match state.router.get_or_create(student_id).await {
        Ok(conv) => (StatusCode::OK, Json(conv)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /v1/conversations?state=
///
/// Admin audit view over all conversations.
pub async fn get_conversations(
    State(state): State<GatewayState>,
    Query(params): Query<ListParams>,
) -> Response {
    match state.router.list(params.state).await {
        Ok(conversations) => (StatusCode::OK, Json(conversations)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /v1/conversations/{id}
///
/// Full current state: row plus log in append order. Also the refetch
/// endpoint clients hit after reconnecting.
pub async fn get_conversation(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    match state.router.read(&id).await {
        Ok((conversation, messages)) => (
            StatusCode::OK,
            Json(ConversationDetailResponse {
                conversation,
                messages,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/conversations/{id}/messages
pub async fn post_message(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<AppendRequest>,
) -> Response {
    match state
        .router
        .append(&id, body.role, &body.sender_id, &body.content)
        .await
    {
        Ok(message) => (StatusCode::OK, Json(AppendResponse { message })).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /v1/queue
///
/// Snapshot of waiting conversations in priority order.
pub async fn get_queue(State(state): State<GatewayState>) -> Response {
    match state.router.list_queue().await {
        Ok(queue) => (StatusCode::OK, Json(queue)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/conversations/{id}/claim
///
/// 409 means someone else got there first; the client drops the entry
/// from its queue view without showing an error.
pub async fn post_claim(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<ClaimRequest>,
) -> Response {
    match state.router.claim(&id, &body.counsellor_id).await {
        Ok(conv) => (StatusCode::OK, Json(conv)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/conversations/{id}/end
///
/// Idempotent: a duplicate end returns the same terminal state with 200.
pub async fn post_end(State(state): State<GatewayState>, Path(id): Path<String>) -> Response {
    match state.router.end(&id).await {
        Ok(conv) => (StatusCode::OK, Json(conv)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/conversations/{id}/escalate
///
/// Consumed by the external triage classifier; the level arrives
/// pre-computed and only ever raises.
pub async fn post_escalate(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<EscalateRequest>,
) -> Response {
    match state.router.escalate(&id, body.risk_level).await {
        Ok(conv) => (StatusCode::OK, Json(conv)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /v1/counsellors/{id}/conversations
///
/// The reconnect query: everything this counsellor currently owns.
pub async fn get_counsellor_conversations(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    match state.router.owned(&id).await {
        Ok(conversations) => (StatusCode::OK, Json(conversations)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/notifications/video
///
/// Ephemeral fan-out to counsellor dashboards; nothing is persisted.
pub async fn post_video_notification(
    State(state): State<GatewayState>,
    Json(body): Json<VideoNotifyRequest>,
) -> Response {
    let (notification, subscribers) = state.router.notify_video_session(body.payload);
    (
        StatusCode::OK,
        Json(VideoNotifyResponse {
            notification,
            subscribers,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_conversation_request_deserializes() {
        let json = r#"{"student_id": "NRB-1234"}"#;
        let req: OpenConversationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.student_id, "NRB-1234");
    }

    #[test]
    fn append_request_deserializes_roles() {
        let json = r#"{"role": "counsellor", "sender_id": "CNSL-9001", "content": "hello"}"#;
        let req: AppendRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.role, SenderRole::Counsellor);
        assert_eq!(req.sender_id, "CNSL-9001");
    }

    #[test]
    fn append_request_rejects_unknown_role() {
        let json = r#"{"role": "admin", "sender_id": "x", "content": "hello"}"#;
        assert!(serde_json::from_str::<AppendRequest>(json).is_err());
    }

    #[test]
    fn escalate_request_deserializes_level() {
        let json = r#"{"risk_level": "high"}"#;
        let req: EscalateRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.risk_level, RiskLevel::High);
    }

    #[test]
    fn list_params_state_is_optional() {
        let params: ListParams = serde_json::from_str("{}").unwrap();
        assert!(params.state.is_none());
        let params: ListParams = serde_json::from_str(r#"{"state": "ended"}"#).unwrap();
        assert_eq!(params.state, Some(ConversationState::Ended));
    }

    #[test]
    fn append_response_serializes_noop_as_null() {
        let resp = AppendResponse { message: None };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"message":null}"#);
    }

    #[test]
    fn error_taxonomy_maps_to_status_codes() {
        let resp = error_response(PendoError::not_found("conversation", "c-1"));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = error_response(PendoError::Conflict("raced".to_string()));
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = error_response(PendoError::Storage {
            source: "db down".into(),
        });
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = error_response(PendoError::Internal("bug".to_string()));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
