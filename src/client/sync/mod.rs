//! # Snapshot Sync
//!
//! Full-snapshot reconciliation and the bookkeeping around it.
//!
//! ## Components
//!
//! - **Reconciliation**: three-way partition and merge of a snapshot into the store
//! - **Passes**: per-pass cancellation tokens so stale fetches are discarded
//! - **Source**: the network collaborator that produces snapshots
//! - **Sync State**: status and degraded-sync tracking published to the UI
//! - **Metrics**: pass and push-merge counters

pub mod reconciliation;
pub mod passes;
pub mod source;
pub mod sync_state;
pub mod metrics;

pub use reconciliation::{Reconciler, ReconciliationReport, SetPartition};
pub use passes::{PassTicket, PassTokens};
pub use source::{FetchError, HttpSnapshotSource, SnapshotSource};
pub use sync_state::{SyncHealth, SyncPhase, SyncStatus};
pub use metrics::SyncMetrics;
