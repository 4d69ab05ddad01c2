//! Route gateway: merges every subrouter and attaches the shared state.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use tracing::error;

use crate::error::RegistryError;
use crate::registry::Registry;
use crate::Config;

mod analytics;
mod health;
mod level;

/// State shared by every route.
pub type RouteState = (Arc<dyn Registry>, Config);

// ---

pub fn router(registry: Arc<dyn Registry>, config: Config) -> Router {
    // ---
    Router::new()
        .merge(analytics::router())
        .merge(level::router())
        .merge(health::router())
        .with_state((registry, config))
}

/// Map a registry failure to a response: missing things are 404, anything
/// else means the upstream is unhealthy.
fn registry_failure(context: &str, e: RegistryError) -> Response {
    // ---
    let status = match e {
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    };
    error!("{}: {}", context, e);
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}
