//! # Sync State Management
//!
//! The status published to the UI collaborator, and the health tracker that
//! turns a run of consistency failures into the degraded-sync indicator.

use chrono::{DateTime, Utc};

use super::metrics::SyncMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    /// Waiting on the snapshot fetch
    Fetching,
    /// Applying a snapshot to the local store
    Reconciling,
}

#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub current_pass: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub account_suspended: bool,
    pub consecutive_failures: u32,
    /// Set while sync keeps hitting consistency failures
    pub degraded: bool,
    pub metrics: SyncMetrics,
}

/// Tracks consecutive failing passes and push merges
#[derive(Debug, Clone)]
pub struct SyncHealth {
    threshold: u32,
    consecutive_failures: u32,
}

impl SyncHealth {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures >= self.threshold
    }

    /// Copy health fields into a status
    pub fn apply_to(&self, status: &mut SyncStatus) {
        status.consecutive_failures = self.consecutive_failures;
        status.degraded = self.is_degraded();
    }
}
