//! Built-in routes.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use super::AppState;

/// Routes the service always exposes. Feature routers are merged on top.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<Value> {
    let app = &state.config.app;
    Json(json!({
        "status": "ok",
        "service": app.name,
        "version": app.version,
        "environment": app.environment.as_str(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
