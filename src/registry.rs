//! Client for the device registry HTTP API.
//!
//! The registry owns all tank and sensor metadata; this core fetches it fresh
//! on every evaluation and never caches it. The [`Registry`] trait is the seam
//! the alert engine and the HTTP routes depend on, so tests can swap in an
//! in-memory implementation.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::RegistryError;
use crate::models::{GatewayProfile, NotificationRecord, Sensor, SensorValue, Tank};

// ---

/// Filters forwarded to the values endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValuesQuery {
    // ---
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[async_trait]
pub trait Registry: Send + Sync {
    /// `GET /devices`
    async fn tanks(&self) -> Result<Vec<Tank>, RegistryError>;

    /// `GET /devices/{tank}`
    async fn tank(&self, tank_id: &str) -> Result<Tank, RegistryError>;

    /// `GET /devices/{tank}/sensors/{sensor}`
    async fn sensor(&self, tank_id: &str, sensor_id: &str) -> Result<Sensor, RegistryError>;

    /// `GET /devices/{tank}/sensors/{sensor}/values`
    async fn sensor_values(
        &self,
        tank_id: &str,
        sensor_id: &str,
        query: &ValuesQuery,
    ) -> Result<Vec<SensorValue>, RegistryError>;

    /// `GET /devices/{tank}/meta`, kept untyped so unknown fields survive a round trip.
    async fn tank_meta(&self, tank_id: &str) -> Result<Value, RegistryError>;

    /// `POST /devices/{tank}/meta`
    async fn update_tank_meta(&self, tank_id: &str, meta: &Value) -> Result<(), RegistryError>;

    /// `GET /device/meta`
    async fn gateway_profile(&self) -> Result<GatewayProfile, RegistryError>;
}

/// Insert `record` at the head of `meta.notifications.messages`, creating
/// the path if it is missing.
pub fn prepend_message(meta: &mut Value, record: &NotificationRecord) -> serde_json::Result<()> {
    // ---
    let entry = serde_json::to_value(record)?;

    if !meta.is_object() {
        *meta = json!({});
    }
    let notifications = &mut meta["notifications"];
    if !notifications.is_object() {
        *notifications = json!({});
    }
    match &mut notifications["messages"] {
        Value::Array(list) => list.insert(0, entry),
        other => *other = Value::Array(vec![entry]),
    }
    Ok(())
}

/// Read-modify-write a tank's message history with a new record first.
pub async fn append_notification(
    registry: &dyn Registry,
    tank_id: &str,
    record: &NotificationRecord,
) -> Result<(), RegistryError> {
    // ---
    let mut meta = registry.tank_meta(tank_id).await?;
    prepend_message(&mut meta, record)?;
    registry.update_tank_meta(tank_id, &meta).await
}

// ---

/// [`Registry`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: Client,
    base_url: String,
}

impl RegistryClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, what: &str, request: RequestBuilder) -> Result<Response, RegistryError> {
        // ---
        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            return Err(RegistryError::Status {
                status,
                url: response.url().to_string(),
            });
        }
        Ok(response)
    }

    async fn get_json<T>(&self, what: &str, path: &str) -> Result<T, RegistryError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self.send(what, self.client.get(&url)).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Registry for RegistryClient {
    async fn tanks(&self) -> Result<Vec<Tank>, RegistryError> {
        self.get_json("device list", "/devices").await
    }

    async fn tank(&self, tank_id: &str) -> Result<Tank, RegistryError> {
        self.get_json(&format!("tank {tank_id}"), &format!("/devices/{tank_id}"))
            .await
    }

    async fn sensor(&self, tank_id: &str, sensor_id: &str) -> Result<Sensor, RegistryError> {
        self.get_json(
            &format!("sensor {sensor_id} on tank {tank_id}"),
            &format!("/devices/{tank_id}/sensors/{sensor_id}"),
        )
        .await
    }

    async fn sensor_values(
        &self,
        tank_id: &str,
        sensor_id: &str,
        query: &ValuesQuery,
    ) -> Result<Vec<SensorValue>, RegistryError> {
        // ---
        let url = self.url(&format!("/devices/{tank_id}/sensors/{sensor_id}/values"));
        debug!("GET {} {:?}", url, query);
        let response = self
            .send(
                &format!("values for sensor {sensor_id}"),
                self.client.get(&url).query(query),
            )
            .await?;
        Ok(response.json().await?)
    }

    async fn tank_meta(&self, tank_id: &str) -> Result<Value, RegistryError> {
        self.get_json(
            &format!("meta for tank {tank_id}"),
            &format!("/devices/{tank_id}/meta"),
        )
        .await
    }

    async fn update_tank_meta(&self, tank_id: &str, meta: &Value) -> Result<(), RegistryError> {
        // ---
        let url = self.url(&format!("/devices/{tank_id}/meta"));
        debug!("POST {}", url);
        self.send(
            &format!("meta for tank {tank_id}"),
            self.client.post(&url).json(meta),
        )
        .await?;
        Ok(())
    }

    async fn gateway_profile(&self) -> Result<GatewayProfile, RegistryError> {
        self.get_json("gateway profile", "/device/meta").await
    }
}
