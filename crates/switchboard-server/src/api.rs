//! HTTP endpoints: health, metrics, and server-side publish.
//!
//! The publish endpoints let the application layer push an event after it
//! has stored the underlying record. Bodies are validated exactly like the
//! matching socket events.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::{Value, json};
use switchboard_core::events::{BROADCAST, MESSAGE, NOTIFY_USER};
use switchboard_core::{EventError, InboundEvent};

use crate::relay::{HubError, RouterError};
use crate::server::AppState;

/// `GET /health` response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"` while the hub is running.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live WebSocket connections.
    pub connections: usize,
    /// Non-empty rooms.
    pub rooms: usize,
}

/// `POST /api/*` response body.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PublishResponse {
    /// Connections the event was handed to.
    pub recipients: usize,
}

/// HTTP handler failures.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Body failed validation.
    #[error(transparent)]
    InvalidPayload(#[from] EventError),

    /// The router refused the event for a reason other than validation.
    #[error("{0}")]
    Rejected(RouterError),

    /// The hub is gone (shutting down).
    #[error("relay unavailable")]
    Unavailable,
}

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        match e {
            HubError::Stopped => Self::Unavailable,
            HubError::Rejected(RouterError::Event(e)) => Self::InvalidPayload(e),
            HubError::Rejected(other) => Self::Rejected(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::InvalidPayload(_) | Self::Rejected(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let stats = state.hub.stats().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        connections: stats.connections,
        rooms: stats.rooms,
    }))
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// POST /api/notify `{ userId, message }`
pub async fn notify_user(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    publish(&state, NOTIFY_USER, &body).await
}

/// POST /api/broadcast `{ role, message }`
pub async fn broadcast(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    publish(&state, BROADCAST, &body).await
}

/// POST /api/messages `{ roomId, ... }`
pub async fn message(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    publish(&state, MESSAGE, &body).await
}

async fn publish(
    state: &AppState,
    event: &'static str,
    body: &[u8],
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    let data: Value = serde_json::from_slice(body).map_err(EventError::from)?;
    let event = InboundEvent::from_parts(event, data)?;
    let recipients = state.hub.publish(event).await?;
    Ok((StatusCode::ACCEPTED, Json(PublishResponse { recipients })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_serializes_camel_case() {
        let resp = HealthResponse {
            status: "ok",
            uptime_secs: 12,
            connections: 3,
            rooms: 5,
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            value,
            json!({"status": "ok", "uptimeSecs": 12, "connections": 3, "rooms": 5})
        );
    }

    #[test]
    fn invalid_payload_maps_to_bad_request() {
        let err = ApiError::from(EventError::UnknownEvent("x".into()));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn stopped_hub_maps_to_unavailable() {
        let err = ApiError::from(HubError::Stopped);
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn router_validation_error_unwraps_to_invalid_payload() {
        let err = ApiError::from(HubError::Rejected(RouterError::Event(
            EventError::MissingField {
                event: "broadcast",
                field: "role",
            },
        )));
        assert!(matches!(err, ApiError::InvalidPayload(_)));
    }
}
