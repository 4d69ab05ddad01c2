//! Data models for the tank-level core.
//!
//! Two families live here: the registry's wire documents (`Tank`, `Sensor`,
//! `SensorValue`, `GatewayProfile`), deserialized leniently because the
//! registry owns them, and the derived series types the analytics pipeline
//! works on (`LevelSample`, `ConsumptionInterval`, `TrendSummary`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// `meta.kind` value that marks a water-level sensor.
pub const WATER_LEVEL_KIND: &str = "WaterLevel";

// ---

/// Tank geometry in one linear unit, as stored under `meta.settings`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TankGeometry {
    // ---
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub capacity: f64,
}

/// Sensor metadata. `critical_min`/`critical_max` are percentages of capacity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorMeta {
    // ---
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub critical_min: Option<f64>,
    #[serde(default)]
    pub critical_max: Option<f64>,
}

impl SensorMeta {
    /// The configured critical band, `None` unless both ends are set and
    /// `critical_min < critical_max`.
    pub fn thresholds(&self) -> Option<AlertThresholds> {
        let (critical_min, critical_max) = (self.critical_min?, self.critical_max?);
        (critical_min < critical_max).then_some(AlertThresholds {
            critical_min,
            critical_max,
        })
    }
}

/// A sensor value as the registry reports it.
///
/// Devices publish whatever they like, so the last value may be a number, a
/// numeric string, or something else entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl RawValue {
    /// Numeric interpretation, if there is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Number(v) => Some(*v),
            RawValue::Text(s) => s.trim().parse::<f64>().ok(),
            RawValue::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sensor {
    // ---
    pub id: String,
    #[serde(default)]
    pub meta: SensorMeta,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub value: Option<RawValue>,
}

impl Sensor {
    pub fn is_water_level(&self) -> bool {
        self.meta.kind == WATER_LEVEL_KIND
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TankMeta {
    // ---
    #[serde(default)]
    pub settings: TankGeometry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tank {
    // ---
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sensors: Vec<Sensor>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: TankMeta,
}

impl Tank {
    pub fn geometry(&self) -> TankGeometry {
        self.meta.settings
    }

    pub fn water_level_sensors(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.iter().filter(|s| s.is_water_level())
    }
}

/// One entry of `GET /devices/{tank}/sensors/{sensor}/values`.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorValue {
    // ---
    #[serde(alias = "timestamp")]
    pub time: DateTime<Utc>,
    pub value: RawValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    // ---
    #[serde(default)]
    pub phone: String,
}

/// Gateway-wide profile from `GET /device/meta`: push tokens and operator phone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayProfile {
    // ---
    #[serde(default, deserialize_with = "null_as_default")]
    pub token: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub profile: Profile,
}

// ---

/// A raw reading observed on the ingestion stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    // ---
    pub tank_id: String,
    pub sensor_id: String,
    pub raw_value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Volume at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelSample {
    // ---
    pub liters: f64,
    pub timestamp: DateTime<Utc>,
}

/// Signed change between two consecutive smoothed samples. Negative is consumption.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConsumptionInterval {
    // ---
    pub quantity_delta: f64,
    pub duration_hours: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Neutral,
}

impl Direction {
    pub fn of(net_delta: f64) -> Self {
        if net_delta > 0.0 {
            Direction::Up
        } else if net_delta < 0.0 {
            Direction::Down
        } else {
            Direction::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendSummary {
    // ---
    #[serde(rename = "value")]
    pub net_delta: f64,
    #[serde(rename = "amountUsed")]
    pub amount_consumed: f64,
    #[serde(rename = "days")]
    pub window_days: f64,
    #[serde(rename = "indicator")]
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    // ---
    pub critical_min: f64,
    pub critical_max: f64,
}

/// Process-wide extreme bounds shared by every tank.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtremeBounds {
    // ---
    pub full: f64,
    pub empty: f64,
}

impl Default for ExtremeBounds {
    fn default() -> Self {
        Self {
            full: 100.0,
            empty: 20.0,
        }
    }
}

/// Entry of a tank's `meta.notifications.messages` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    // ---
    pub id: i64,
    pub tank_name: String,
    pub time: String,
    pub priority: String,
    pub message: String,
    pub read_status: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tank_document_parsing() {
        // ---
        let doc = json!({
            "id": "tank-1",
            "name": "Roof Tank",
            "sensors": [
                {
                    "id": "s1",
                    "name": "level",
                    "meta": { "kind": "WaterLevel", "critical_min": 20, "critical_max": 90 },
                    "value": 42.5
                },
                {
                    "id": "s2",
                    "name": "temp",
                    "meta": { "kind": "WaterThermometer" },
                    "value": "21.0"
                }
            ],
            "actuators": [],
            "meta": {
                "settings": { "height": 100, "offset": 5, "capacity": 1000 },
                "receivenotifications": true
            }
        });

        let tank: Tank = serde_json::from_value(doc).unwrap();
        assert_eq!(tank.geometry().capacity, 1000.0);
        assert_eq!(tank.geometry().offset, 5.0);

        let levels: Vec<_> = tank.water_level_sensors().map(|s| s.id.as_str()).collect();
        assert_eq!(levels, vec!["s1"]);
        assert_eq!(tank.sensors[0].meta.thresholds().unwrap().critical_max, 90.0);
        assert!(tank.sensors[1].meta.thresholds().is_none());
    }

    #[test]
    fn test_incomplete_band_has_no_thresholds() {
        // ---
        let meta = |doc: serde_json::Value| -> SensorMeta { serde_json::from_value(doc).unwrap() };

        assert!(meta(json!({ "kind": "WaterLevel" })).thresholds().is_none());
        assert!(meta(json!({ "critical_min": 20 })).thresholds().is_none());
        assert!(meta(json!({ "critical_min": 20, "critical_max": null })).thresholds().is_none());
        assert!(meta(json!({ "critical_min": 50, "critical_max": 50 })).thresholds().is_none());
        assert!(meta(json!({ "critical_min": 90, "critical_max": 20 })).thresholds().is_none());

        let band = meta(json!({ "critical_min": 20, "critical_max": 90 })).thresholds();
        assert_eq!(
            band,
            Some(AlertThresholds {
                critical_min: 20.0,
                critical_max: 90.0,
            })
        );
    }

    #[test]
    fn test_tank_with_null_sections() {
        // ---
        let doc = json!({ "id": "bare", "sensors": null, "meta": null });
        let tank: Tank = serde_json::from_value(doc).unwrap();

        assert!(tank.sensors.is_empty());
        assert_eq!(tank.geometry(), TankGeometry::default());
    }

    #[test]
    fn test_raw_value_interpretation() {
        // ---
        let number: RawValue = serde_json::from_value(json!(12.5)).unwrap();
        let text: RawValue = serde_json::from_value(json!(" 30 ")).unwrap();
        let junk: RawValue = serde_json::from_value(json!({ "x": 1 })).unwrap();
        let word: RawValue = serde_json::from_value(json!("offline")).unwrap();

        assert_eq!(number.as_f64(), Some(12.5));
        assert_eq!(text.as_f64(), Some(30.0));
        assert_eq!(junk.as_f64(), None);
        assert_eq!(word.as_f64(), None);
    }

    #[test]
    fn test_sensor_value_accepts_timestamp_alias() {
        // ---
        let v: SensorValue =
            serde_json::from_value(json!({ "timestamp": "2024-05-01T10:00:00Z", "value": 40 }))
                .unwrap();
        assert_eq!(v.value.as_f64(), Some(40.0));
    }

    #[test]
    fn test_direction_classification() {
        // ---
        assert_eq!(Direction::of(2.0), Direction::Up);
        assert_eq!(Direction::of(-0.5), Direction::Down);
        assert_eq!(Direction::of(0.0), Direction::Neutral);
        assert_eq!(serde_json::to_value(Direction::Down).unwrap(), json!("DOWN"));
    }

    #[test]
    fn test_gateway_profile_defaults() {
        // ---
        let p: GatewayProfile = serde_json::from_value(json!({ "token": null })).unwrap();
        assert!(p.token.is_empty());
        assert!(p.profile.phone.is_empty());
    }
}
