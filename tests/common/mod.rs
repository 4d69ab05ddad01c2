//! In-process fake of the device registry, push relay and SMS gateway.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::FixedOffset;
use parking_lot::Mutex;
use serde_json::{json, Value};

use tankflow::alerts::AlertEngine;
use tankflow::models::ExtremeBounds;
use tankflow::notify::{Dispatcher, PushNotifier, SmsCredentials, SmsNotifier};
use tankflow::registry::{Registry, RegistryClient};

pub const PUSH_TOKENS: [&str; 2] = ["tok-1", "tok-2"];
pub const PHONE: &str = "0712000000";

// ---

#[derive(Default)]
pub struct Backend {
    pub tanks: Mutex<Vec<Value>>,
    pub metas: Mutex<HashMap<String, Value>>,
    pub values: Mutex<Vec<Value>>,
    pub value_queries: Mutex<Vec<HashMap<String, String>>>,
    pub pushes: Mutex<Vec<Value>>,
    pub sms: Mutex<Vec<Value>>,
    pub push_failing: AtomicBool,
    pub registry_down: AtomicBool,
}

type Shared = Arc<Backend>;

impl Backend {
    pub fn with_tanks(tanks: Vec<Value>) -> Shared {
        let backend = Backend::default();
        *backend.tanks.lock() = tanks;
        Arc::new(backend)
    }

    pub fn push_titles(&self) -> Vec<String> {
        self.pushes
            .lock()
            .iter()
            .map(|p| p["title"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn messages(&self, tank_id: &str) -> Vec<Value> {
        self.metas
            .lock()
            .get(tank_id)
            .and_then(|m| m["notifications"]["messages"].as_array().cloned())
            .unwrap_or_default()
    }

    fn find_tank(&self, tank_id: &str) -> Option<Value> {
        self.tanks.lock().iter().find(|t| t["id"] == tank_id).cloned()
    }

    fn is_down(&self) -> bool {
        self.registry_down.load(Ordering::SeqCst)
    }
}

/// Tank document with a single water level sensor called `level`.
pub fn tank_doc(id: &str, name: &str, geometry: (f64, f64, f64), band: (f64, f64)) -> Value {
    let (height, offset, capacity) = geometry;
    json!({
        "id": id,
        "name": name,
        "sensors": [{
            "id": "level",
            "name": "Water level",
            "meta": {
                "kind": "WaterLevel",
                "units": "cm",
                "critical_min": band.0,
                "critical_max": band.1
            },
            "time": "2024-05-01T10:00:00Z",
            "value": 40.0
        }],
        "actuators": [],
        "meta": { "settings": { "height": height, "offset": offset, "capacity": capacity } }
    })
}

/// 100 cm, 1000 L tank `t1` named "Roof": a raw value of `r` means `100 - r` percent.
pub fn roof_tank(band: (f64, f64)) -> Value {
    tank_doc("t1", "Roof", (100.0, 0.0, 1000.0), band)
}

async fn list_tanks(State(b): State<Shared>) -> impl IntoResponse {
    if b.is_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    Json(b.tanks.lock().clone()).into_response()
}

async fn get_tank(Path(id): Path<String>, State(b): State<Shared>) -> impl IntoResponse {
    if b.is_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    match b.find_tank(&id) {
        Some(tank) => Json(tank).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn get_sensor(
    Path((id, sensor_id)): Path<(String, String)>,
    State(b): State<Shared>,
) -> impl IntoResponse {
    let sensor = b.find_tank(&id).and_then(|t| {
        t["sensors"]
            .as_array()
            .and_then(|s| s.iter().find(|s| s["id"] == sensor_id.as_str()).cloned())
    });
    match sensor {
        Some(sensor) => Json(sensor).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn get_values(
    Path((_id, _sensor_id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    State(b): State<Shared>,
) -> impl IntoResponse {
    b.value_queries.lock().push(query);
    Json(b.values.lock().clone())
}

async fn get_meta(Path(id): Path<String>, State(b): State<Shared>) -> impl IntoResponse {
    let meta = b.metas.lock().get(&id).cloned().unwrap_or_else(|| json!({ "settings": {} }));
    Json(meta)
}

async fn post_meta(
    Path(id): Path<String>,
    State(b): State<Shared>,
    Json(meta): Json<Value>,
) -> impl IntoResponse {
    b.metas.lock().insert(id, meta);
    StatusCode::OK
}

async fn gateway_meta() -> impl IntoResponse {
    Json(json!({ "token": PUSH_TOKENS, "profile": { "phone": format!(" {PHONE} ") } }))
}

async fn push(State(b): State<Shared>, Json(body): Json<Value>) -> impl IntoResponse {
    b.pushes.lock().push(body);
    if b.push_failing.load(Ordering::SeqCst) {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

async fn sms(State(b): State<Shared>, Json(body): Json<Value>) -> impl IntoResponse {
    b.sms.lock().push(body);
    StatusCode::OK
}

/// Serve the fake on an ephemeral port and return its base URL.
pub async fn spawn_backend(backend: Shared) -> String {
    // ---
    let app = Router::new()
        .route("/devices", get(list_tanks))
        .route("/devices/{id}", get(get_tank))
        .route("/devices/{id}/sensors/{sensor_id}", get(get_sensor))
        .route("/devices/{id}/sensors/{sensor_id}/values", get(get_values))
        .route("/devices/{id}/meta", get(get_meta).post(post_meta))
        .route("/device/meta", get(gateway_meta))
        .route("/push", post(push))
        .route("/sms", post(sms))
        .with_state(backend);

    serve(app).await
}

pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn registry(base: &str) -> Arc<dyn Registry> {
    Arc::new(RegistryClient::new(reqwest::Client::new(), base))
}

/// Alert engine wired entirely to the fake over real HTTP clients.
pub fn engine(base: &str) -> AlertEngine {
    // ---
    let http = reqwest::Client::new();
    let registry = registry(base);
    let push = Arc::new(PushNotifier::new(http.clone(), format!("{base}/push")));
    let sms = Arc::new(SmsNotifier::new(
        http,
        format!("{base}/sms"),
        SmsCredentials {
            api_key: "test-key".into(),
            partner_id: "1".into(),
            shortcode: "TextSMS".into(),
        },
    ));

    AlertEngine::new(
        registry.clone(),
        Dispatcher::new(registry, push, sms),
        ExtremeBounds::default(),
        FixedOffset::east_opt(3 * 3600).unwrap(),
    )
}
