//! Raw sensor reading to liters.
//!
//! The sensor reports the distance from itself to the water surface, so a
//! larger raw value means less water. Results are not clamped: a reading past
//! the configured height yields a negative volume and a reading inside the
//! offset yields more than capacity. Both are passed through as-is.

use tracing::debug;

use crate::models::{LevelSample, SensorValue, TankGeometry};

// ---

impl TankGeometry {
    /// Height and capacity are both set.
    pub fn is_configured(&self) -> bool {
        self.height > 0.0 && self.capacity > 0.0
    }

    /// `((height - (raw - offset)) / height) * capacity`, or 0 when unconfigured.
    pub fn liters(&self, raw: f64) -> f64 {
        if !self.is_configured() {
            return 0.0;
        }
        ((self.height - (raw - self.offset)) / self.height) * self.capacity
    }

    /// Fill level as a percentage of capacity, `None` when unconfigured.
    pub fn percentage(&self, raw: f64) -> Option<f64> {
        self.is_configured()
            .then(|| self.liters(raw) / self.capacity * 100.0)
    }
}

/// Convert a registry history to a level series, skipping non-numeric values.
pub fn to_level_series(values: &[SensorValue], geometry: &TankGeometry) -> Vec<LevelSample> {
    // ---
    values
        .iter()
        .filter_map(|v| match v.value.as_f64() {
            Some(raw) => Some(LevelSample {
                liters: geometry.liters(raw),
                timestamp: v.time,
            }),
            None => {
                debug!("Skipping non-numeric value at {}: {:?}", v.time, v.value);
                None
            }
        })
        .collect()
}
