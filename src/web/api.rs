//! REST API handlers for usage data

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

use claude_monitor_core::usage::{FetchCoordinator, FetchError};

/// Shared application state for API handlers
pub struct ApiState {
    pub coordinator: FetchCoordinator,
    /// Pre-rendered `Cache-Control` value for successful responses
    pub cache_control: HeaderValue,
}

/// Helper to create JSON error responses
fn json_error(status: StatusCode, message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(serde_json::json!({"error": message})))
}

/// Map a fetch failure to its HTTP status
fn error_status(err: &FetchError) -> StatusCode {
    StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Get the current usage snapshot
pub async fn get_usage(State(state): State<Arc<ApiState>>) -> Response {
    match state.coordinator.get().await {
        Ok(snapshot) => {
            let mut response = Json(snapshot).into_response();
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, state.cache_control.clone());
            response
        }
        Err(e) => {
            let status = error_status(&e);
            tracing::warn!("API: usage fetch failed status={} error={}", status, e);
            let message = match status {
                StatusCode::UNAUTHORIZED => format!("Authentication failed - {}", e),
                _ => e.to_string(),
            };
            json_error(status, &message).into_response()
        }
    }
}
