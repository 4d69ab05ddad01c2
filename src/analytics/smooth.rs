//! Sliding-window moving average over a level series.

use crate::models::LevelSample;

/// Window used by the analytics query unless configured otherwise.
pub const DEFAULT_WINDOW: usize = 2;

/// Average `window` consecutive samples.
///
/// Output length is `series.len() - window + 1`. Each output carries the
/// timestamp of the last sample in its window, except the first, which keeps
/// the first sample's timestamp so the series stays anchored at its start.
/// Returns an empty series when `window` is 0 or longer than the input.
pub fn moving_average(series: &[LevelSample], window: usize) -> Vec<LevelSample> {
    // ---
    if window == 0 || series.len() < window {
        return Vec::new();
    }

    series
        .windows(window)
        .enumerate()
        .map(|(i, w)| {
            let sum: f64 = w.iter().map(|s| s.liters).sum();
            let anchor = if i == 0 { &w[0] } else { &w[window - 1] };
            LevelSample {
                liters: sum / window as f64,
                timestamp: anchor.timestamp,
            }
        })
        .collect()
}
