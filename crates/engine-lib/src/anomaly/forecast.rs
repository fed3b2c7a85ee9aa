//! Linear forecasts from baselines and daily history

use crate::baseline::linear_regression_slope;
use crate::models::{Baseline, MetricType, NamespaceSnapshot};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default baseline forecast horizon (7 days)
pub const DEFAULT_FORECAST_HORIZON: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Snapshots required before a daily forecast is attempted
pub const MIN_FORECAST_SNAPSHOTS: usize = 5;

/// Distinct days required before a daily forecast is attempted
pub const MIN_FORECAST_DAYS: usize = 3;

/// History window the daily forecast reads
pub const DAILY_FORECAST_HISTORY_DAYS: i64 = 30;

/// Project a baseline forward; the slope is per second
pub fn forecast(baseline: &Baseline, horizon: Duration) -> f64 {
    let projected = baseline.avg_value + baseline.trend_slope * horizon.as_secs_f64();
    if projected.is_finite() {
        projected.max(0.0)
    } else {
        0.0
    }
}

/// Daily averages of a metric extended `days` into the future
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub namespace: String,
    pub metric_type: MetricType,
    pub historical_dates: Vec<NaiveDate>,
    pub historical_values: Vec<f64>,
    pub forecast_dates: Vec<NaiveDate>,
    pub forecast_values: Vec<f64>,
    /// Slope in metric units per day
    pub trend: f64,
    /// 0-1, lower when daily values are volatile
    pub confidence: f64,
}

/// Fit a line through daily averages and extend it
///
/// `history` must belong to a single namespace. Returns `None` with fewer
/// than five snapshots or three distinct days.
pub fn daily_forecast(
    history: &[NamespaceSnapshot],
    metric: MetricType,
    days: usize,
) -> Option<DailyForecast> {
    if history.len() < MIN_FORECAST_SNAPSHOTS {
        return None;
    }

    let mut by_day: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for snapshot in history {
        let entry = by_day
            .entry(snapshot.timestamp.date_naive())
            .or_insert((0.0, 0));
        entry.0 += snapshot.total(metric);
        entry.1 += 1;
    }

    if by_day.len() < MIN_FORECAST_DAYS {
        return None;
    }

    let historical_dates: Vec<NaiveDate> = by_day.keys().copied().collect();
    let historical_values: Vec<f64> = by_day
        .values()
        .map(|(sum, count)| sum / *count as f64)
        .collect();

    let points: Vec<(f64, f64)> = historical_values
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64, *v))
        .collect();
    let n = points.len() as f64;
    let trend = linear_regression_slope(&points);
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = historical_values.iter().sum::<f64>() / n;
    let intercept = mean_y - trend * mean_x;

    let last_date = *historical_dates.last()?;
    let mut forecast_dates = Vec::with_capacity(days);
    let mut forecast_values = Vec::with_capacity(days);
    for step in 0..days {
        let x = points.len() + step;
        forecast_values.push((intercept + trend * x as f64).max(0.0));
        if let Some(date) = last_date.checked_add_days(chrono::Days::new(step as u64 + 1)) {
            forecast_dates.push(date);
        }
    }

    Some(DailyForecast {
        namespace: history[0].namespace.clone(),
        metric_type: metric,
        historical_dates,
        confidence: confidence(&historical_values, mean_y),
        historical_values,
        forecast_dates,
        forecast_values,
        trend,
    })
}

fn confidence(values: &[f64], mean: f64) -> f64 {
    if values.len() < MIN_FORECAST_DAYS {
        return 0.5;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    let volatility = variance.sqrt() / (mean + 0.01);
    (1.0 - volatility).clamp(0.0, 1.0)
}
