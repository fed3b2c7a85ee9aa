//! Namespace z-score and trend checks against the latest baseline

use crate::models::Baseline;
use serde::{Deserialize, Serialize};

/// Z-score above which a namespace reading is anomalous
pub const ANOMALY_Z_THRESHOLD: f64 = 3.0;

/// Absolute slope above which a trend is reported
pub const TREND_SLOPE_THRESHOLD: f64 = 0.1;

/// Score points per standard deviation of deviation
const SCORE_PER_SIGMA: f64 = 20.0;

const MAX_SCORE: f64 = 100.0;

/// Deviation of a current reading from its baseline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NamespaceAnomaly {
    pub current: f64,
    pub expected: f64,
    pub std_dev: f64,
    /// Absolute z-score
    pub z_score: f64,
    /// 0-100, 20 points per sigma
    pub score: f64,
}

impl NamespaceAnomaly {
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.z_score > threshold
    }

    pub fn is_anomalous(&self) -> bool {
        self.exceeds(ANOMALY_Z_THRESHOLD)
    }

    pub fn is_above_expected(&self) -> bool {
        self.current > self.expected
    }
}

/// Score `current` against `baseline`
///
/// Returns `None` when the baseline has no spread to measure against.
pub fn namespace_anomaly(current: f64, baseline: &Baseline) -> Option<NamespaceAnomaly> {
    let std_dev = baseline.std_dev;
    if !std_dev.is_finite() || std_dev <= 0.0 || !current.is_finite() {
        return None;
    }

    let z_score = (current - baseline.avg_value).abs() / std_dev;

    Some(NamespaceAnomaly {
        current,
        expected: baseline.avg_value,
        std_dev,
        z_score,
        score: (z_score * SCORE_PER_SIGMA).min(MAX_SCORE),
    })
}

/// Direction of a sustained trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Increasing => write!(f, "increasing"),
            TrendDirection::Decreasing => write!(f, "decreasing"),
        }
    }
}

/// Trend read from a baseline slope
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendSignal {
    pub slope: f64,
    pub direction: TrendDirection,
}

/// Report a trend when `|slope|` exceeds `threshold`
pub fn detect_trend(baseline: &Baseline, threshold: f64) -> Option<TrendSignal> {
    let slope = baseline.trend_slope;
    if !slope.is_finite() || slope.abs() <= threshold {
        return None;
    }

    let direction = if slope > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    };

    Some(TrendSignal { slope, direction })
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::{Baseline, MetricType};
    use chrono::Utc;

    pub fn baseline(namespace: &str, avg: f64, std_dev: f64, slope: f64) -> Baseline {
        Baseline {
            namespace: namespace.to_string(),
            metric_type: MetricType::Cpu,
            avg_value: avg,
            std_dev,
            min_value: avg - std_dev,
            max_value: avg + std_dev,
            trend_slope: slope,
            sample_count: 20,
            calculated_at: Utc::now(),
        }
    }
}
