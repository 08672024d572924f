//! Error responses.
//!
//! Every error the engine writes itself has the same JSON shape:
//!
//! ```text
//! {"error": "<message>"}
//! ```
//!
//! Middleware build an [`HttpError`] and hand it to
//! [`Context::abort_with_error`](crate::http::Context::abort_with_error).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// The JSON error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Body written when a response value cannot be encoded.
pub(crate) const ENCODE_FAILURE_BODY: &[u8] = br#"{"error":"Internal Server Error"}"#;

/// An HTTP status paired with a client-facing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("HTTP {}: {message}", .status.as_u16())]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, message)
    }

    /// The JSON envelope for this error.
    pub fn body(&self) -> ErrorBody {
        ErrorBody::new(self.message.clone())
    }
}

/// For code that answers through axum directly instead of a [`Context`](crate::http::Context).
impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_envelope_shape() {
        let json = serde_json::to_string(&ErrorBody::new("route not found")).unwrap();
        assert_eq!(json, r#"{"error":"route not found"}"#);

        let parsed: ErrorBody = serde_json::from_slice(ENCODE_FAILURE_BODY).unwrap();
        assert_eq!(parsed.error, "Internal Server Error");
    }

    #[test]
    fn test_http_error_display() {
        let err = HttpError::too_many_requests("rate limit exceeded");
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.to_string(), "HTTP 429: rate limit exceeded");
    }

    #[tokio::test]
    async fn test_http_error_into_response() {
        let response = HttpError::forbidden("CORS origin not allowed").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "application/json"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"error":"CORS origin not allowed"}"#);
    }
}
