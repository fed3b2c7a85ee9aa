//! Descriptive statistics and least-squares trend over a time series

/// Summary statistics over `(timestamp_secs, value)` points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Slope of value against time, in units per second
    pub slope: f64,
}

impl SeriesStats {
    /// Compute statistics; `None` for an empty series
    pub fn from_points(points: &[(f64, f64)]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }

        let n = points.len() as f64;
        let mean = points.iter().map(|(_, v)| v).sum::<f64>() / n;
        let variance = points.iter().map(|(_, v)| (v - mean).powi(2)).sum::<f64>() / n;

        let min = points
            .iter()
            .map(|(_, v)| *v)
            .fold(f64::INFINITY, f64::min);
        let max = points
            .iter()
            .map(|(_, v)| *v)
            .fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            count: points.len(),
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
            slope: linear_regression_slope(points),
        })
    }
}

/// Ordinary least-squares slope of y against x
///
/// Returns 0 with fewer than two points or when every x is identical.
pub fn linear_regression_slope(points: &[(f64, f64)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    // Shift x to the first sample so epoch-sized timestamps keep precision
    let x0 = points[0].0;
    let n = points.len() as f64;

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;

    for (x, y) in points {
        let x = x - x0;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }

    (n * sum_xy - sum_x * sum_y) / denominator
}
