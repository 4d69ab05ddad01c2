//! Consumption rate, trend direction and time-to-empty projection.

use crate::models::{ConsumptionInterval, Direction, TrendSummary};

/// Number of most recent intervals that decide the trend direction.
pub const TREND_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateUnit {
    Minutes,
    Hours,
    Days,
}

fn consumed(intervals: &[ConsumptionInterval]) -> f64 {
    intervals
        .iter()
        .filter(|c| c.quantity_delta < 0.0)
        .map(|c| c.quantity_delta.abs())
        .sum()
}

fn total_hours(intervals: &[ConsumptionInterval]) -> f64 {
    intervals.iter().map(|c| c.duration_hours).sum()
}

/// Liters consumed per `unit`, over the whole interval sequence.
///
/// Only negative deltas count as consumption; inflow is ignored but its
/// duration is not. `None` when the intervals span no time.
pub fn average_rate(intervals: &[ConsumptionInterval], unit: RateUnit) -> Option<f64> {
    // ---
    let hours = total_hours(intervals);
    if hours <= 0.0 {
        return None;
    }

    let per_hour = consumed(intervals) / hours;
    Some(match unit {
        RateUnit::Minutes => per_hour / 60.0,
        RateUnit::Hours => per_hour,
        RateUnit::Days => per_hour * 24.0,
    })
}

/// Amount consumed and elapsed days over the full history, direction over
/// the last [`TREND_WINDOW`] intervals only.
pub fn trend_summary(intervals: &[ConsumptionInterval]) -> TrendSummary {
    // ---
    let recent = &intervals[intervals.len().saturating_sub(TREND_WINDOW)..];
    let net_delta: f64 = recent.iter().map(|c| c.quantity_delta).sum();

    TrendSummary {
        net_delta,
        amount_consumed: consumed(intervals),
        window_days: total_hours(intervals) / 24.0,
        direction: Direction::of(net_delta),
    }
}

/// Whole days until `current_liters` runs out at the average hourly rate.
///
/// Hours are truncated first, then days. `None` for fewer than two intervals
/// or when there is no measurable consumption.
pub fn days_left(intervals: &[ConsumptionInterval], current_liters: f64) -> Option<i64> {
    // ---
    if intervals.len() < 2 {
        return None;
    }

    let rate = average_rate(intervals, RateUnit::Hours).filter(|r| *r > 0.0)?;
    let hours_left = (current_liters / rate) as i64;
    Some(hours_left / 24)
}
