//! HTTP request handlers.
//!
//! Rejections share one JSON shape, `{"error": {"code", "message"}}`, with
//! codes from the core and runner error taxonomies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub mod health;
pub mod webhook;

pub use health::health_check;
pub use webhook::bitbucket_webhook;

/// Error response with code and message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including code and message
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Error code (E1001-E2002)
    pub code: String,
    /// Human-readable error description
    pub message: String,
}

/// Creates a standardized error response.
pub(crate) fn create_error_response(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
) -> Response {
    let error_response =
        ErrorResponse { error: ErrorDetail { code: code.to_string(), message: message.into() } };

    (status, Json(error_response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn error_response_carries_code_and_message() {
        let response = create_error_response(StatusCode::FORBIDDEN, "E1002", "not trusted");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "E1002");
        assert_eq!(json["error"]["message"], "not trusted");
    }
}
