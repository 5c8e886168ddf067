//! Axum HTTP server — router assembly, error handling layers, serve loop.
//!
//! ## Layer order (outermost first)
//!
//! ```text
//! handle_errors   — logs every ApiError, shapes the JSON body
//! CorsLayer       — from api.cors
//! CatchPanicLayer — panics become non-operational 500s
//! enforce         — fixed-window rate limit from api.rateLimit
//! routes          — /health + caller-supplied routes; unmatched path or method → 404
//! ```

pub mod error;
pub mod middleware;
pub mod rate_limit;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::config::{Config, CorsConfig};
use crate::error::AppError;

pub use error::{ApiError, ErrorBody, ErrorDetail, GENERIC_MESSAGE};
pub use middleware::{handle_errors, not_found, ErrorSettings};
pub use rate_limit::RateLimiter;
pub use routes::routes;

/// Router state injected into every handler via [`axum::extract::State`].
///
/// Cheap to clone — all fields are reference-counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

/// Build the full application router around `extra` feature routes.
pub fn build_router(config: Arc<Config>, extra: Router<AppState>) -> Router {
    let limiter = Arc::new(RateLimiter::new(&config.api.rate_limit));
    let settings = ErrorSettings::from_config(&config);
    let cors = cors_layer(&config.api.cors);
    let state = AppState { config };

    routes()
        .merge(extra)
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .with_state(state)
        .layer(from_fn_with_state(limiter, rate_limit::enforce))
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(cors)
        .layer(from_fn_with_state(settings, handle_errors))
}

/// Translate `api.cors` into a `CorsLayer`.
///
/// A wildcard origin combined with credentials is not allowed by browsers, so
/// in that case the request origin is mirrored instead.
pub fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if cors.allows_any_origin() {
        if cors.credentials {
            warn!("cors: credentials with wildcard origin; mirroring request origin");
            return layer
                .allow_origin(AllowOrigin::mirror_request())
                .allow_credentials(true);
        }
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = cors
        .origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid cors origin");
                None
            }
        })
        .collect();

    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(cors.credentials)
}

// ── Server loop ───────────────────────────────────────────────────────────────

/// Bind `api.host:api.port` and serve until `shutdown` is cancelled.
pub async fn serve(
    config: Arc<Config>,
    extra: Router<AppState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let bind_addr = config.api.bind_addr();

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Server(format!("bind failed on {bind_addr}: {e}")))?;

    info!(
        %bind_addr,
        base_url = %config.api.base_url,
        environment = %config.app.environment,
        "api listening"
    );

    let router = build_router(config, extra);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .map_err(|e| AppError::Server(format!("server error: {e}")))?;

    info!("api shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    use axum::body::Body;
    use axum::extract::Path;
    use axum::http::{Request, StatusCode};
    use axum::routing::{get, post};
    use axum::Json;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn failing_routes() -> Router<AppState> {
        Router::new()
            .route(
                "/forbidden",
                get(|| async {
                    Err::<(), _>(ApiError::with_status(StatusCode::FORBIDDEN, "Forbidden"))
                }),
            )
            .route(
                "/panic",
                get(|| async {
                    if true {
                        panic!("handler exploded");
                    }
                    "unreachable"
                }),
            )
            .route(
                "/io",
                get(|| async {
                    std::fs::read_to_string("/definitely/not/here/pace42")?;
                    Ok::<_, ApiError>("read")
                }),
            )
    }

    async fn call(router: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_service_identity() {
        let config = Arc::new(Config::test_default());
        let (status, _, body) = call(build_router(config, Router::new()), get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "pace42-test");
        assert_eq!(body["environment"], "production");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn operational_error_flows_through_router() {
        let config = Arc::new(Config::test_default());
        let (status, _, body) =
            call(build_router(config, failing_routes()), get_req("/forbidden")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({ "error": { "message": "Forbidden", "statusCode": 403 } }));
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let config = Arc::new(Config::test_default());
        let (status, _, body) =
            call(build_router(config, Router::new()), get_req("/some/path")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body,
            json!({ "error": { "message": "Not found - /some/path", "statusCode": 404 } })
        );
    }

    #[tokio::test]
    async fn wrong_method_is_404() {
        let config = Arc::new(Config::test_default());
        let request = Request::builder()
            .method(Method::POST)
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = call(build_router(config, Router::new()), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "Not found - /health");
    }

    fn extractor_routes() -> Router<AppState> {
        Router::new()
            .route("/echo", post(|Json(body): Json<Value>| async move { Json(body) }))
            .route(
                "/items/{id}",
                get(|Path(id): Path<u32>| async move { id.to_string() }),
            )
    }

    #[tokio::test]
    async fn bare_json_rejection_uses_error_body() {
        let config = Arc::new(Config::test_default());
        let request = Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{ broken"))
            .unwrap();
        let (status, headers, body) =
            call(build_router(config, extractor_routes()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(body["error"]["statusCode"], 400);
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.starts_with("Failed to parse the request body as JSON"));
    }

    #[tokio::test]
    async fn bare_path_rejection_uses_error_body() {
        let config = Arc::new(Config::test_default());
        let (status, headers, body) =
            call(build_router(config, extractor_routes()), get_req("/items/abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(body["error"]["statusCode"], 400);
        assert!(!body["error"]["message"].as_str().unwrap().is_empty());
        assert!(body["error"].get("stack").is_none());
    }

    #[tokio::test]
    async fn extractors_still_accept_valid_input() {
        let config = Arc::new(Config::test_default());
        let (status, _, body) =
            call(build_router(config, extractor_routes()), get_req("/items/7")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(7));
    }

    #[tokio::test]
    async fn panic_becomes_500_json() {
        let config = Arc::new(Config::test_default());
        let (status, _, body) =
            call(build_router(config, failing_routes()), get_req("/panic")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["statusCode"], 500);
        assert_eq!(body["error"]["message"], "handler exploded");
    }

    #[tokio::test]
    async fn unexpected_error_surfaces_original_message() {
        let config = Arc::new(Config::test_default());
        let (status, _, body) = call(build_router(config, failing_routes()), get_req("/io")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["error"]["message"].as_str().unwrap();
        assert!(!message.is_empty());
        assert_ne!(message, GENERIC_MESSAGE);
    }

    #[tokio::test]
    async fn development_config_exposes_stack() {
        let mut config = Config::test_default();
        config.app.environment = Environment::Development;
        let (_, _, body) = call(
            build_router(Arc::new(config), failing_routes()),
            get_req("/forbidden"),
        )
        .await;
        assert!(body["error"]["stack"].is_string());
    }

    #[tokio::test]
    async fn rate_limit_rejects_with_retry_after() {
        let mut config = Config::test_default();
        config.api.rate_limit.max_requests = 1;
        let router = build_router(Arc::new(config), Router::new());

        let (first, _, _) = call(router.clone(), get_req("/health")).await;
        assert_eq!(first, StatusCode::OK);

        let (second, headers, body) = call(router, get_req("/health")).await;
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert!(headers.contains_key(header::RETRY_AFTER));
        assert_eq!(
            body,
            json!({ "error": { "message": rate_limit::LIMIT_MESSAGE, "statusCode": 429 } })
        );
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let mut config = Config::test_default();
        config.api.cors = CorsConfig {
            origins: vec!["http://localhost:5173".into()],
            credentials: true,
        };
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = call(build_router(Arc::new(config), Router::new()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn cors_headers_kept_on_error_responses() {
        let config = Arc::new(Config::test_default());
        let request = Request::builder()
            .uri("/missing")
            .header(header::ORIGIN, "http://elsewhere.test")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = call(build_router(config, Router::new()), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
