use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::{registry_failure, RouteState};

// ---

pub fn router() -> Router<RouteState> {
    // ---
    Router::new().route("/tanks/{tank_id}/level", get(handler))
}

/// Current volume from the tank's water level sensor.
#[derive(Debug, Serialize)]
pub struct LevelResponse {
    liters: f64,
    percentage: Option<f64>,
    timestamp: Option<DateTime<Utc>>,
}

async fn handler(
    Path(tank_id): Path<String>,
    State((registry, _config)): State<RouteState>,
) -> impl IntoResponse {
    // ---
    info!("GET /tanks/{}/level", tank_id);

    let tank = match registry.tank(&tank_id).await {
        Ok(tank) => tank,
        Err(e) => return registry_failure("Failed to load tank", e),
    };

    let reading = tank
        .water_level_sensors()
        .find_map(|s| s.value.as_ref().and_then(|v| v.as_f64()).map(|raw| (raw, s.time)));

    let Some((raw, timestamp)) = reading else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("tank {tank_id} has no water level reading") })),
        )
            .into_response();
    };

    let geometry = tank.geometry();
    let response = LevelResponse {
        liters: geometry.liters(raw),
        percentage: geometry.percentage(raw),
        timestamp,
    };
    (StatusCode::OK, Json(response)).into_response()
}
