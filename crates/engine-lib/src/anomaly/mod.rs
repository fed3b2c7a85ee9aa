//! Anomaly scoring, trend detection and forecasting
//!
//! This module provides detection for:
//! - Namespace readings far from their baseline (z-score)
//! - Sustained baseline trends
//! - Pod-level anomaly scores at query time
//! - Baseline and daily linear forecasts
//! - Alert construction with configurable deduplication

mod alerter;
mod detector;
mod forecast;
mod pod_score;
mod zscore;

pub use alerter::{AlertDedupPolicy, Alerter};
pub use detector::{AnomalyConfig, AnomalyDetector};
pub use forecast::{
    daily_forecast, forecast, DailyForecast, DAILY_FORECAST_HISTORY_DAYS,
    DEFAULT_FORECAST_HORIZON,
};
pub use pod_score::{pod_anomalies, pod_anomaly, PodAnomaly};
pub use zscore::{
    detect_trend, namespace_anomaly, NamespaceAnomaly, TrendDirection, TrendSignal,
    ANOMALY_Z_THRESHOLD, TREND_SLOPE_THRESHOLD,
};
