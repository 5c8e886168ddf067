//! Request-side error type and its JSON wire shape.
//!
//! Handlers return `Result<_, ApiError>`. [`ApiError::into_response`] writes the
//! status and JSON body and stashes the error in the response extensions so
//! [`super::middleware::handle_errors`] can log it with request context and
//! decide whether to expose the stack.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};


/// Client-facing message when an error carries none.
pub const GENERIC_MESSAGE: &str = "Internal Server Error";

/// An error raised while handling a request.
///
/// Defaults to `500` and operational. Operational errors are expected failure
/// modes (bad input, missing resource); non-operational ones are defects or
/// unexpected failures from lower layers.
#[derive(Debug, Clone)]
pub struct ApiError {
    message: String,
    status: StatusCode,
    operational: bool,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

impl ApiError {
    /// `500`, operational. The stack points at the caller.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            operational: true,
            location: Location::caller(),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    #[track_caller]
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            ..Self::new(message)
        }
    }

    /// `404` naming the URL that matched no route.
    #[track_caller]
    pub fn not_found(url: impl fmt::Display) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, format!("Not found - {url}"))
    }

    /// `500`, non-operational: wraps a failure nobody planned for.
    #[track_caller]
    pub fn unexpected(err: impl fmt::Display) -> Self {
        Self::new(err.to_string()).operational(false)
    }

    pub fn operational(mut self, operational: bool) -> Self {
        self.operational = operational;
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn is_operational(&self) -> bool {
        self.operational
    }

    /// Message sent to the client. The original message is used as-is, for
    /// non-operational errors too.
    pub fn client_message(&self) -> &str {
        if self.message.is_empty() {
            GENERIC_MESSAGE
        } else {
            &self.message
        }
    }

    /// Creation site, plus the captured backtrace when `RUST_BACKTRACE` is set.
    pub fn stack(&self) -> String {
        let head = format!("ApiError: {}\n    at {}", self.client_message(), self.location);
        match self.backtrace.status() {
            BacktraceStatus::Captured => format!("{head}\n{}", self.backtrace),
            _ => head,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.client_message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody::from_error(&self, false);
        let mut response = (self.status, Json(body)).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl From<JsonRejection> for ApiError {
    #[track_caller]
    fn from(rejection: JsonRejection) -> Self {
        Self::with_status(rejection.status(), rejection.body_text())
    }
}

impl From<std::io::Error> for ApiError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        Self::unexpected(err)
    }
}

/// `{ "error": { "message", "statusCode", "stack"? } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub message: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorBody {
    pub fn from_error(err: &ApiError, expose_stack: bool) -> Self {
        Self {
            error: ErrorDetail {
                message: err.client_message().to_string(),
                status_code: err.status.as_u16(),
                stack: expose_stack.then(|| err.stack()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_to_500_and_operational() {
        let err = ApiError::new("boom");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_operational());
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn unexpected_is_not_operational() {
        let io = std::io::Error::other("disk on fire");
        let err = ApiError::from(io);
        assert!(!err.is_operational());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.client_message(), "disk on fire");
    }

    #[test]
    fn not_found_names_url() {
        let err = ApiError::not_found("/some/path?x=1");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "Not found - /some/path?x=1");
        assert!(err.is_operational());
    }

    #[test]
    fn empty_message_uses_generic() {
        let err = ApiError::with_status(StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.client_message(), GENERIC_MESSAGE);
        assert_eq!(err.to_string(), "502 Internal Server Error");
    }

    #[test]
    fn stack_points_at_creation_site() {
        let err = ApiError::new("where");
        let stack = err.stack();
        assert!(stack.starts_with("ApiError: where"));
        assert!(stack.contains(file!()), "stack was: {stack}");
    }

    #[test]
    fn body_omits_stack_unless_exposed() {
        let err = ApiError::with_status(StatusCode::FORBIDDEN, "Forbidden");
        let hidden = serde_json::to_value(ErrorBody::from_error(&err, false)).unwrap();
        assert_eq!(hidden, json!({ "error": { "message": "Forbidden", "statusCode": 403 } }));

        let shown = ErrorBody::from_error(&err, true);
        assert!(shown.error.stack.unwrap().contains("Forbidden"));
    }

    #[test]
    fn into_response_sets_status_and_keeps_error() {
        let response = ApiError::with_status(StatusCode::CONFLICT, "taken").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let kept = response.extensions().get::<ApiError>().unwrap();
        assert_eq!(kept.message(), "taken");
    }
}
