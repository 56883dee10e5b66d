use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use hostline_core::errors::{ApplicationError, InterfaceError};

/// JSON error body for the non-TwiML routes. `detail` is only filled in debug mode.
#[derive(Debug)]
pub struct ApiError {
    interface: InterfaceError,
    debug: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
    correlation_id: &'a str,
}

impl ApiError {
    pub fn new(error: ApplicationError, correlation_id: impl Into<String>, debug: bool) -> Self {
        Self { interface: error.into_interface(correlation_id), debug }
    }

    pub fn status(&self) -> StatusCode {
        match self.interface {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(
            event_name = "system.http.error",
            correlation_id = self.interface.correlation_id(),
            error = %self.interface,
            "request failed"
        );
        let body = ErrorBody {
            error: self.interface.user_message(),
            detail: self.debug.then(|| self.interface.message()),
            correlation_id: self.interface.correlation_id(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde_json::{json, Value};

    use hostline_core::errors::ApplicationError;

    use super::ApiError;

    async fn body_of(error: ApiError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[tokio::test]
    async fn detail_is_hidden_outside_debug() {
        let (status, body) = body_of(ApiError::new(
            ApplicationError::Persistence("database is locked".to_owned()),
            "req-1",
            false,
        ))
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body,
            json!({
                "error": "The service is temporarily unavailable. Please retry shortly.",
                "correlation_id": "req-1"
            })
        );
    }

    #[tokio::test]
    async fn debug_mode_exposes_detail() {
        let (status, body) = body_of(ApiError::new(
            ApplicationError::Configuration("llm.model is empty".to_owned()),
            "req-2",
            true,
        ))
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "llm.model is empty");
    }
}
