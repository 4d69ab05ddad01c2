use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{registry_failure, RouteState};
use crate::analytics::{analyze, to_level_series};
use crate::registry::ValuesQuery;

// ---

pub fn router() -> Router<RouteState> {
    // ---
    Router::new().route("/tanks/{tank_id}/analytics", get(handler))
}

/// Query parameters for the analytics window.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    from: Option<String>,
    to: Option<String>,
    limit: Option<u32>,
}

impl AnalyticsQuery {
    /// Query strings decode `+` in an RFC 3339 offset to a space; put it back.
    fn values_query(&self) -> ValuesQuery {
        let restore = |s: &String| s.replace(' ', "+");
        ValuesQuery {
            from: self.from.as_ref().map(restore),
            to: self.to.as_ref().map(restore),
            limit: self.limit,
        }
    }
}

async fn handler(
    Path(tank_id): Path<String>,
    Query(params): Query<AnalyticsQuery>,
    State((registry, config)): State<RouteState>,
) -> impl IntoResponse {
    // ---
    info!("GET /tanks/{}/analytics {:?}", tank_id, params);

    let tank = match registry.tank(&tank_id).await {
        Ok(tank) => tank,
        Err(e) => return registry_failure("Failed to load tank", e),
    };

    let Some(sensor) = tank.water_level_sensors().next() else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("tank {tank_id} has no water level sensor") })),
        )
            .into_response();
    };

    let values = match registry
        .sensor_values(&tank_id, &sensor.id, &params.values_query())
        .await
    {
        Ok(values) => values,
        Err(e) => return registry_failure("Failed to load sensor history", e),
    };

    let levels = to_level_series(&values, &tank.geometry());
    debug!("Analyzing {} samples for tank {}", levels.len(), tank_id);

    let analytics = analyze(&levels, config.smoothing_window);
    (StatusCode::OK, Json(analytics)).into_response()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_offset_plus_is_restored() {
        // ---
        let q = AnalyticsQuery {
            from: Some("2024-05-01T00:00:00 03:00".into()),
            to: Some("2024-05-02T00:00:00Z".into()),
            limit: Some(50),
        };
        let v = q.values_query();

        assert_eq!(v.from.as_deref(), Some("2024-05-01T00:00:00+03:00"));
        assert_eq!(v.to.as_deref(), Some("2024-05-02T00:00:00Z"));
        assert_eq!(v.limit, Some(50));
    }

    #[test]
    fn test_empty_query() {
        // ---
        let v = AnalyticsQuery::default().values_query();
        assert!(v.from.is_none() && v.to.is_none() && v.limit.is_none());
    }
}
