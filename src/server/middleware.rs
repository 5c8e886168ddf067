//! Centralized error reporting for every request.
//!
//! [`handle_errors`] is the outermost layer. Whenever the inner response
//! carries an [`ApiError`], or is any other 4xx/5xx (extractor rejections,
//! foreign layers), it emits one structured log record and rewrites the body,
//! adding the stack only when [`ErrorSettings::expose_stack`] is set.

use std::any::Any;
use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use super::error::{ApiError, ErrorBody};
use crate::config::Config;

const UNKNOWN_CLIENT: &str = "unknown";
/// Upper bound on a plain error body adopted as the message.
const MAX_ERROR_BODY: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorSettings {
    /// Include `error.stack` in response bodies (development mode only).
    pub expose_stack: bool,
}

impl ErrorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            expose_stack: config.is_development(),
        }
    }
}

/// Client address from `ConnectInfo`, or `"unknown"` when the server was not
/// started with connect info (e.g. in tests).
pub fn client_ip(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

pub async fn handle_errors(
    State(settings): State<ErrorSettings>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let ip = client_ip(&request);

    let mut response = next.run(request).await;
    let err = match response.extensions_mut().remove::<ApiError>() {
        Some(err) => err,
        None if is_error_status(response.status()) => {
            let (parts, body) = response.into_parts();
            let err = adopt_plain_error(parts.status, body).await;
            response = Response::from_parts(parts, Body::empty());
            err
        }
        None => return response,
    };

    error!(
        status_code = err.status_code().as_u16(),
        message = %err.client_message(),
        stack = %err.stack(),
        path = %path,
        method = %method,
        ip = %ip,
        operational = err.is_operational()
    );

    render(&err, response, settings.expose_stack)
}

fn is_error_status(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}

/// Wrap an error response that did not come from an [`ApiError`], using its
/// body text as the message. 5xx responses are treated as unexpected.
async fn adopt_plain_error(status: StatusCode, body: Body) -> ApiError {
    let message = match axum::body::to_bytes(body, MAX_ERROR_BODY).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Err(_) => String::new(),
    };
    ApiError::with_status(status, message).operational(!status.is_server_error())
}

/// Rebuild the error response body, keeping any headers inner layers set
/// (CORS, `Retry-After`).
fn render(err: &ApiError, original: Response, expose_stack: bool) -> Response {
    let (parts, _) = original.into_parts();
    let body = ErrorBody::from_error(err, expose_stack);
    let mut response = (err.status_code(), Json(body)).into_response();
    for (name, value) in &parts.headers {
        if *name != header::CONTENT_TYPE && *name != header::CONTENT_LENGTH {
            response.headers_mut().append(name.clone(), value.clone());
        }
    }
    response
}

/// Router fallback: no route matched.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(uri)
}

/// `CatchPanicLayer` hook: a panicking handler becomes a non-operational 500.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        String::new()
    };
    ApiError::new(detail).operational(false).into_response()
}
