//! Hysteresis alerting per (tank, sensor).
//!
//! Two independent axes gate every reading:
//!
//! - **Critical band**: the sensor's configured `critical_min`/`critical_max`.
//!   Leaving the band fires a push alert once; the axis re-arms only when a
//!   reading lands strictly inside the band again.
//! - **Extreme band**: the process-wide full/empty bounds. Same shape, but
//!   firings go out over push and SMS.
//!
//! State lives in an [`AlertStore`] keyed by `(tank_id, sensor_id)`. Each key
//! has its own async mutex held for the whole evaluation (registry lookups,
//! dispatch, commit), so readings for one key are serialized while different
//! keys run in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::AlertError;
use crate::ingest::ReadingSink;
use crate::models::{AlertThresholds, ExtremeBounds, NotificationRecord, SensorReading, Tank};
use crate::notify::{Dispatcher, Recipients};
use crate::registry::Registry;

const RECORD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    /// At or below `critical_min`.
    AlmostEmpty,
    /// At or above `critical_max`.
    AlmostFilled,
    /// At or above the extreme full bound.
    Full,
    /// At or below the extreme empty bound.
    RunningDry,
}

impl AlertKind {
    pub fn is_extreme(self) -> bool {
        matches!(self, AlertKind::Full | AlertKind::RunningDry)
    }

    /// Extreme alerts also go out by SMS.
    pub fn includes_sms(self) -> bool {
        self.is_extreme()
    }

    pub fn priority(self) -> &'static str {
        if self.is_extreme() {
            "high"
        } else {
            "normal"
        }
    }

    pub fn title(self, tank_name: &str) -> String {
        match self {
            AlertKind::AlmostEmpty => format!("{tank_name} is almost empty"),
            AlertKind::AlmostFilled => format!("{tank_name} is almost filled"),
            AlertKind::Full => format!("{tank_name} is already full"),
            AlertKind::RunningDry => format!("{tank_name} is running dry"),
        }
    }

    pub fn body(self, tank_name: &str, percentage: f64) -> String {
        let p = percentage as i64;
        match self {
            AlertKind::AlmostEmpty | AlertKind::AlmostFilled => {
                format!("Water level for {tank_name} is at {p}%")
            }
            AlertKind::Full => {
                format!("Water level for {tank_name} is at {p}%. Turn off the pump.")
            }
            AlertKind::RunningDry => {
                format!("Water level for {tank_name} is at {p}%. Turn on the pump")
            }
        }
    }
}

/// Notified flags for one (tank, sensor) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertState {
    pub band_notified: bool,
    pub extreme_notified: bool,
}

impl AlertState {
    /// Apply one reading (as a percentage of capacity) and return what fires.
    ///
    /// The two axes are evaluated independently; a single reading can fire
    /// one alert on each. Without `thresholds` the band axis is skipped and
    /// its flag left as it was.
    pub fn evaluate(
        &mut self,
        percentage: f64,
        thresholds: Option<&AlertThresholds>,
        bounds: &ExtremeBounds,
    ) -> Vec<AlertKind> {
        // ---
        let mut fired = Vec::new();

        if let Some(band) = thresholds {
            if let Some(kind) = gate(
                &mut self.band_notified,
                percentage,
                band.critical_min,
                band.critical_max,
                AlertKind::AlmostEmpty,
                AlertKind::AlmostFilled,
            ) {
                fired.push(kind);
            }
        }

        if let Some(kind) = gate(
            &mut self.extreme_notified,
            percentage,
            bounds.empty,
            bounds.full,
            AlertKind::RunningDry,
            AlertKind::Full,
        ) {
            fired.push(kind);
        }

        fired
    }
}

fn gate(
    notified: &mut bool,
    percentage: f64,
    low: f64,
    high: f64,
    low_kind: AlertKind,
    high_kind: AlertKind,
) -> Option<AlertKind> {
    if percentage <= low && !*notified {
        *notified = true;
        Some(low_kind)
    } else if percentage >= high && !*notified {
        *notified = true;
        Some(high_kind)
    } else {
        if percentage > low && percentage < high {
            *notified = false;
        }
        None
    }
}

// ---

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub tank_id: String,
    pub sensor_id: String,
}

impl AlertKey {
    pub fn new(tank_id: impl Into<String>, sensor_id: impl Into<String>) -> Self {
        Self {
            tank_id: tank_id.into(),
            sensor_id: sensor_id.into(),
        }
    }
}

/// Lazily created, never evicted per-key alert state.
#[derive(Debug, Default)]
pub struct AlertStore {
    entries: parking_lot::Mutex<HashMap<AlertKey, Arc<Mutex<AlertState>>>>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the key's state, created on first use.
    pub fn entry(&self, key: &AlertKey) -> Arc<Mutex<AlertState>> {
        self.entries
            .lock()
            .entry(key.clone())
            .or_default()
            .clone()
    }

    pub async fn get(&self, key: &AlertKey) -> Option<AlertState> {
        let entry = self.entries.lock().get(key).cloned()?;
        let state = *entry.lock().await;
        Some(state)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---

/// Evaluates live readings against registry metadata and dispatches alerts.
pub struct AlertEngine {
    registry: Arc<dyn Registry>,
    dispatcher: Dispatcher,
    store: AlertStore,
    bounds: ExtremeBounds,
    local_offset: FixedOffset,
}

impl AlertEngine {
    pub fn new(
        registry: Arc<dyn Registry>,
        dispatcher: Dispatcher,
        bounds: ExtremeBounds,
        local_offset: FixedOffset,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            store: AlertStore::new(),
            bounds,
            local_offset,
        }
    }

    pub fn store(&self) -> &AlertStore {
        &self.store
    }

    /// Evaluate one reading and return the alerts that fired.
    ///
    /// Geometry and thresholds are fetched fresh. If either lookup fails, or
    /// the tank geometry is unusable, the state is left untouched and the
    /// next reading tries again.
    pub async fn handle_reading(
        &self,
        reading: &SensorReading,
    ) -> Result<Vec<AlertKind>, AlertError> {
        // ---
        let key = AlertKey::new(&reading.tank_id, &reading.sensor_id);
        let entry = self.store.entry(&key);
        let mut state = entry.lock().await;

        let tank = self.registry.tank(&reading.tank_id).await?;
        let sensor = self
            .registry
            .sensor(&reading.tank_id, &reading.sensor_id)
            .await?;

        let percentage = tank.geometry().percentage(reading.raw_value).ok_or_else(|| {
            AlertError::GeometryNotConfigured {
                tank_id: reading.tank_id.clone(),
            }
        })?;

        let thresholds = sensor.meta.thresholds();
        if thresholds.is_none() {
            warn!(
                tank_id = %reading.tank_id,
                sensor_id = %reading.sensor_id,
                "No usable critical band configured, checking extreme bounds only"
            );
        }

        let fired = state.evaluate(percentage, thresholds.as_ref(), &self.bounds);
        debug!(
            tank_id = %reading.tank_id,
            sensor_id = %reading.sensor_id,
            "Level {:.1}% -> {:?} (fired {:?})",
            percentage,
            *state,
            fired
        );

        if !fired.is_empty() {
            let recipients = self.dispatcher.recipients().await;
            for kind in &fired {
                self.fire(&tank, *kind, percentage, &recipients).await;
            }
        }

        Ok(fired)
    }

    async fn fire(
        &self,
        tank: &Tank,
        kind: AlertKind,
        percentage: f64,
        recipients: &Recipients,
    ) {
        // ---
        let title = kind.title(&tank.name);
        let body = kind.body(&tank.name, percentage);
        info!(tank_id = %tank.id, "Firing {:?}: {}", kind, title);

        let report = self
            .dispatcher
            .deliver(recipients, &title, &body, kind.includes_sms())
            .await;
        if report.push_sent + report.sms_sent == 0 {
            warn!(tank_id = %tank.id, "{:?} reached no recipient: {:?}", kind, report);
        }

        let now = Utc::now();
        let record = NotificationRecord {
            id: now.timestamp_millis(),
            tank_name: tank.name.clone(),
            time: now
                .with_timezone(&self.local_offset)
                .format(RECORD_TIME_FORMAT)
                .to_string(),
            priority: kind.priority().to_string(),
            message: body,
            read_status: false,
        };
        if let Err(e) = self.dispatcher.record(&tank.id, &record).await {
            warn!(tank_id = %tank.id, "Failed to record notification: {}", e);
        }
    }
}

#[async_trait]
impl ReadingSink for AlertEngine {
    async fn on_reading(&self, reading: SensorReading) {
        if let Err(e) = self.handle_reading(&reading).await {
            warn!(
                tank_id = %reading.tank_id,
                sensor_id = %reading.sensor_id,
                "Dropping reading {}: {}",
                reading.raw_value,
                e
            );
        }
    }
}
