use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use poller_client::PollerError;
use serde_json::json;

/// `PollerError` as an HTTP response for dashboard clients
#[derive(Debug)]
pub struct ApiError(pub PollerError);

impl From<PollerError> for ApiError {
    fn from(e: PollerError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            PollerError::Validation(_) => StatusCode::BAD_REQUEST,
            PollerError::NotFound(_) => StatusCode::NOT_FOUND,
            PollerError::Network(_) | PollerError::Transport(_) | PollerError::Decode(_) => {
                StatusCode::BAD_GATEWAY
            }
            PollerError::EngineClosed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
