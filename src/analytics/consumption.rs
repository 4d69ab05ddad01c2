//! Smoothed level series to signed consumption intervals.

use chrono::{DateTime, Utc};

use crate::models::{ConsumptionInterval, LevelSample};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Fractional hours from `from` to `to`.
pub fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / MILLIS_PER_HOUR
}

/// One interval per consecutive pair; empty for fewer than two samples.
pub fn consumption_intervals(series: &[LevelSample]) -> Vec<ConsumptionInterval> {
    // ---
    series
        .windows(2)
        .map(|pair| ConsumptionInterval {
            quantity_delta: pair[1].liters - pair[0].liters,
            duration_hours: hours_between(pair[0].timestamp, pair[1].timestamp),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample(liters: f64, timestamp: DateTime<Utc>) -> LevelSample {
        LevelSample { liters, timestamp }
    }

    #[test]
    fn test_single_interval() {
        // ---
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
        let series = vec![
            sample(100.0, t0),
            sample(90.0, t0 + Duration::hours(1)),
        ];

        let intervals = consumption_intervals(&series);
        assert_eq!(
            intervals,
            vec![ConsumptionInterval {
                quantity_delta: -10.0,
                duration_hours: 1.0,
            }]
        );
    }

    #[test]
    fn test_inflow_and_fractional_hours() {
        // ---
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
        let series = vec![
            sample(100.0, t0),
            sample(80.0, t0 + Duration::minutes(30)),
            sample(130.0, t0 + Duration::minutes(120)),
        ];

        let intervals = consumption_intervals(&series);
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].duration_hours, 0.5);
        assert_eq!(intervals[1].quantity_delta, 50.0);
        assert_eq!(intervals[1].duration_hours, 1.5);
    }

    #[test]
    fn test_short_series_is_empty() {
        // ---
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
        assert!(consumption_intervals(&[]).is_empty());
        assert!(consumption_intervals(&[sample(1.0, t0)]).is_empty());
    }
}
