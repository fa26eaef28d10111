use crate::app_error::AppError;
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::InvalidSignature => {
                tracing::warn!(code = self.code().as_str(), "Rejected webhook with invalid signature");
                error_resp(StatusCode::BAD_REQUEST, self.to_string())
            }
            other => {
                // Log the error before it gets converted into a status response.
                tracing::error!(error = ?other, code = other.code().as_str(), "Request failed");
                let message = other.to_string();
                error_resp(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }
}

/// Error bodies carry the message only: `{"error": "..."}`.
fn error_resp(status: StatusCode, message: String) -> Response {
    let body = serde_json::json!({ "error": message });
    (status, Json(body)).into_response()
}
