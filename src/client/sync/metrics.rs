//! # Sync Metrics
//!
//! Counters for reconciliation passes and push merges.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct SyncMetrics {
    pub total_passes: u64,
    pub successful_passes: u64,
    pub failed_passes: u64,
    /// Snapshots that arrived after a newer pass had started
    pub stale_snapshots: u64,
    pub average_pass_duration: Duration,
    pub last_pass_duration: Option<Duration>,
    pub last_pass_start: Option<Instant>,
    pub events_applied: u64,
    pub events_already_applied: u64,
    pub events_ignored: u64,
    pub events_dropped: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pass_start(&mut self) {
        self.last_pass_start = Some(Instant::now());
        self.total_passes += 1;
    }

    pub fn record_pass_success(&mut self) {
        if let Some(start) = self.last_pass_start.take() {
            let duration = start.elapsed();
            self.last_pass_duration = Some(duration);
            self.successful_passes += 1;

            // Update rolling average
            let total = self.average_pass_duration * (self.successful_passes - 1) as u32 + duration;
            self.average_pass_duration = total / self.successful_passes as u32;
        }
    }

    pub fn record_pass_failure(&mut self) {
        self.last_pass_start = None;
        self.failed_passes += 1;
    }

    pub fn record_stale_snapshot(&mut self) {
        self.stale_snapshots += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_passes == 0 {
            0.0
        } else {
            self.successful_passes as f64 / self.total_passes as f64
        }
    }
}
