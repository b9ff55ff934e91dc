//! Progress tracking for multi-station runs.
//!
//! [`FetchProgress`] aggregates [`StationFetchResult`]s as they come off the
//! result channel. It computes completion percentage and a remaining-time
//! estimate, and formats the status line shown next to the progress bar.
//! When no bar is visible, [`FetchProgress::should_emit_update`] throttles
//! equivalent log lines to every 10% or once a minute.

use std::time::{Duration, Instant};

use super::job::StationFetchResult;

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_PERCENTAGE_STEP: f64 = 10.0;

/// Running totals for one fetch run.
#[derive(Debug, Clone)]
pub struct FetchProgress {
    /// Stations in the run.
    pub total: usize,
    /// Results received so far.
    pub completed: usize,
    /// Successful (fetched) stations.
    pub succeeded: usize,
    /// Stations skipped because their chunk already existed.
    pub skipped: usize,
    /// Failed stations.
    pub failed: usize,
    /// Records decoded across all stations.
    pub records: u64,
    /// Run start.
    pub start_time: Instant,
    last_update: Instant,
    last_reported_percentage: f64,
    update_interval: Duration,
    min_percentage_step: f64,
}

impl FetchProgress {
    /// Tracker for a run of `total` stations.
    pub fn new(total: usize) -> Self {
        let now = Instant::now();
        Self {
            total,
            completed: 0,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            records: 0,
            start_time: now,
            last_update: now,
            last_reported_percentage: 0.0,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            min_percentage_step: DEFAULT_PERCENTAGE_STEP,
        }
    }

    /// Fold one station result into the totals.
    pub fn update(&mut self, result: &StationFetchResult) {
        self.completed = self.completed.saturating_add(1);
        if !result.success {
            self.failed += 1;
        } else if result.skipped {
            self.skipped += 1;
        } else {
            self.succeeded += 1;
            self.records = self.records.saturating_add(result.record_count as u64);
        }
    }

    /// Completion percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.completed as f64 / self.total as f64) * 100.0
    }

    /// Remaining time at the current station rate.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        if self.completed == 0 || self.completed >= self.total {
            return None;
        }
        let per_station = self.start_time.elapsed().as_secs_f64() / self.completed as f64;
        let remaining = (self.total - self.completed) as f64 * per_station;
        Some(Duration::from_secs_f64(remaining))
    }

    /// Whether a log line should be emitted now.
    pub fn should_emit_update(&self) -> bool {
        if self.completed == 0 {
            return false;
        }
        if self.completed == self.total {
            return true;
        }
        self.percentage() - self.last_reported_percentage >= self.min_percentage_step
            || self.last_update.elapsed() >= self.update_interval
    }

    /// Reset the emission throttle after logging.
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        self.last_reported_percentage = self.percentage();
    }

    /// Short status line, e.g. `ok 3 | skipped 1 | failed 0 | 1098 records`.
    pub fn status_message(&self) -> String {
        format!(
            "ok {} | skipped {} | failed {} | {} records",
            self.succeeded, self.skipped, self.failed, self.records
        )
    }

    /// Full progress line including percentage and ETA.
    pub fn format_progress(&self) -> String {
        let mut line = format!(
            "Progress: {}/{} stations ({:.0}%) - {}",
            self.completed,
            self.total,
            self.percentage(),
            self.status_message()
        );
        if let Some(eta) = self.estimate_remaining() {
            line.push_str(&format!(" - ETA {}", format_duration(eta)));
        }
        line
    }
}

/// Format a duration as `1h 02m`, `3m 05s` or `12s`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}
