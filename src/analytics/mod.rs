//! On-demand level analytics.
//!
//! A query composes the four stages in order: convert raw history to liters
//! ([`convert`]), smooth it ([`smooth`]), difference it into consumption
//! intervals ([`consumption`]), then derive rates, trend and the time-to-empty
//! projection ([`trend`]).
//!
//! Sparse histories are reported as missing fields rather than zeros, so a
//! client can tell "not enough data" apart from "no consumption".

use serde::Serialize;

use crate::models::{LevelSample, TrendSummary};

pub mod consumption;
pub mod convert;
pub mod smooth;
pub mod trend;

pub use consumption::consumption_intervals;
pub use convert::to_level_series;
pub use smooth::{moving_average, DEFAULT_WINDOW};
pub use trend::{average_rate, days_left, trend_summary, RateUnit, TREND_WINDOW};

/// Consumption intervals required (exclusive) before anything is reported.
pub const MIN_INTERVALS: usize = 2;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AverageConsumption {
    pub hourly: f64,
    pub daily: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Analytics {
    // ---
    pub average: Option<AverageConsumption>,
    pub trend: Option<TrendSummary>,
    #[serde(rename = "durationLeft")]
    pub duration_left: Option<i64>,
}

impl Analytics {
    pub fn is_empty(&self) -> bool {
        self.average.is_none() && self.trend.is_none() && self.duration_left.is_none()
    }
}

/// Run the full pipeline over an ordered level series.
///
/// The projection uses the latest unsmoothed sample as the current volume.
pub fn analyze(levels: &[LevelSample], window: usize) -> Analytics {
    // ---
    let smoothed = moving_average(levels, window);
    let intervals = consumption_intervals(&smoothed);

    if intervals.len() <= MIN_INTERVALS {
        return Analytics::default();
    }

    let average = average_rate(&intervals, RateUnit::Hours).map(|hourly| AverageConsumption {
        hourly,
        daily: hourly * 24.0,
    });
    let current = levels.last().map(|s| s.liters).unwrap_or_default();

    Analytics {
        average,
        trend: Some(trend_summary(&intervals)),
        duration_left: days_left(&intervals, current),
    }
}
