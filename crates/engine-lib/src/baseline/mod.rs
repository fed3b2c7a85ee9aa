//! Namespace baselines and trend statistics
//!
//! This module provides:
//! - Population statistics and least-squares slope over snapshot history
//! - Batch baseline recomputation under a single-writer lock
//! - The periodic scheduler that recomputes baselines and runs detection

mod recompute;
mod scheduler;
mod stats;

pub use recompute::{
    compute_baselines, BaselineConfig, BaselineOutcome, BaselineRecomputer,
    DEFAULT_BASELINE_WINDOW, MIN_SNAPSHOTS_FOR_BASELINE,
};
pub use scheduler::{BaselineScheduler, SchedulerReport, DEFAULT_STATS_INTERVAL};
pub use stats::{linear_regression_slope, SeriesStats};

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Start of a look-back window ending at `now`
pub(crate) fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_start() {
        let now = Utc::now();
        assert_eq!(
            window_start(now, Duration::from_secs(3600)),
            now - chrono::Duration::hours(1)
        );
        assert_eq!(
            window_start(now, Duration::MAX),
            DateTime::<Utc>::MIN_UTC
        );
    }
}
