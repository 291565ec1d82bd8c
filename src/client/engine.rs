//! # Sync Engine
//!
//! The top-level controller. It owns the session, the local store, the
//! in-memory projection and the sync bookkeeping, and it is the only place
//! the projection is mutated.
//!
//! ## Channels
//!
//! - **Commands**: a typed mpsc queue of [`EngineCommand`] fed by
//!   [`SyncHandle`]. Push events, reconcile requests, local edits and
//!   shutdown all arrive here, so they are handled one at a time.
//! - **Snapshots**: fetches run on their own tasks and report back on an
//!   internal queue tagged with their pass id. A result from a superseded
//!   pass is discarded.
//! - **Watches**: the latest [`SyncStatus`] and projection are published
//!   through `tokio::sync::watch` for the UI collaborator.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chatmirror::client::config::Session;
//! use chatmirror::client::engine::{LocalChange, SyncEngine};
//! use chatmirror::client::sync::source::HttpSnapshotSource;
//! use chatmirror::shared::config::EngineConfig;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::builder()
//!     .server_url("https://chat.example.com".to_string())
//!     .build()?;
//! let session = Session::new(config, "me@example.com".to_string());
//! let source = HttpSnapshotSource::new(&session)?;
//! let (engine, handle) = SyncEngine::open(session, source).await?;
//! tokio::spawn(engine.run());
//!
//! handle.request_reconcile();
//! handle.local_change(LocalChange::SetNotificationMuted {
//!     chatroom_id: "r1".to_string(),
//!     muted: true,
//! });
//! let rooms = handle.projection().chatrooms.len();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::client::config::Session;
use crate::client::local_db::LocalStore;
use crate::client::push::{MergeOutcome, PushMerger};
use crate::client::state::Projection;
use crate::client::sync::{
    FetchError, PassTicket, PassTokens, ReconciliationReport, Reconciler, SnapshotSource,
    SyncHealth, SyncMetrics, SyncPhase, SyncStatus,
};
use crate::shared::error::StoreError;
use crate::shared::event::PushEvent;
use crate::shared::messaging::{ChatroomBundle, UserMessage};
use crate::shared::snapshot::Snapshot;

/// Work accepted by the engine loop
#[derive(Debug)]
pub enum EngineCommand {
    /// A push-delivered event
    Push(PushEvent),
    /// Start a reconciliation pass, superseding any in flight
    Reconcile,
    /// A user-initiated edit of local-only state
    Local(LocalChange),
    Shutdown,
}

/// Edits the user makes locally
#[derive(Debug, Clone)]
pub enum LocalChange {
    SetTitleOverride {
        chatroom_id: String,
        title: Option<String>,
    },
    SetNotificationMuted {
        chatroom_id: String,
        muted: bool,
    },
    /// Explicit exit from a chatroom
    DeleteChatroom {
        chatroom_id: String,
    },
    UpsertBundle(ChatroomBundle),
    DeleteBundle {
        bundle_id: String,
    },
    AssignToBundle {
        bundle_id: String,
        chatroom_id: String,
    },
    /// Show a sent message before the server acknowledges it
    SendPending {
        chatroom_id: String,
        message: UserMessage,
    },
}

impl LocalChange {
    fn label(&self) -> &'static str {
        match self {
            LocalChange::SetTitleOverride { .. } => "set_title_override",
            LocalChange::SetNotificationMuted { .. } => "set_notification_muted",
            LocalChange::DeleteChatroom { .. } => "delete_chatroom",
            LocalChange::UpsertBundle(_) => "upsert_bundle",
            LocalChange::DeleteBundle { .. } => "delete_bundle",
            LocalChange::AssignToBundle { .. } => "assign_to_bundle",
            LocalChange::SendPending { .. } => "send_pending",
        }
    }
}

#[derive(Debug)]
struct FetchedSnapshot {
    pass_id: String,
    result: Result<Snapshot, FetchError>,
}

/// Client handle to a running [`SyncEngine`]
///
/// Cheap to clone. Sends return false once the engine has stopped.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
    status: watch::Receiver<SyncStatus>,
    projection: watch::Receiver<Arc<Projection>>,
}

impl SyncHandle {
    pub fn request_reconcile(&self) -> bool {
        self.send(EngineCommand::Reconcile)
    }

    pub fn push(&self, event: PushEvent) -> bool {
        self.send(EngineCommand::Push(event))
    }

    /// Decode a raw push payload and queue it
    pub fn push_json(&self, raw: &str) -> Result<bool, serde_json::Error> {
        Ok(self.push(PushEvent::from_json(raw)?))
    }

    pub fn local_change(&self, change: LocalChange) -> bool {
        self.send(EngineCommand::Local(change))
    }

    pub fn shutdown(&self) -> bool {
        self.send(EngineCommand::Shutdown)
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Latest published projection
    pub fn projection(&self) -> Arc<Projection> {
        Arc::clone(&self.projection.borrow())
    }

    pub fn subscribe_projection(&self) -> watch::Receiver<Arc<Projection>> {
        self.projection.clone()
    }

    fn send(&self, command: EngineCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

/// Sync engine
pub struct SyncEngine<S: SnapshotSource> {
    session: Session,
    store: LocalStore,
    projection: Projection,
    reconciler: Reconciler,
    merger: PushMerger,
    source: Arc<S>,
    passes: PassTokens,
    health: SyncHealth,
    metrics: SyncMetrics,
    phase: SyncPhase,
    last_error: Option<String>,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    snapshot_tx: mpsc::UnboundedSender<FetchedSnapshot>,
    snapshot_rx: mpsc::UnboundedReceiver<FetchedSnapshot>,
    status_tx: watch::Sender<SyncStatus>,
    projection_tx: watch::Sender<Arc<Projection>>,
}

impl<S: SnapshotSource> SyncEngine<S> {
    /// Open the session's store, load the projection and wire the channels
    pub async fn open(session: Session, source: S) -> Result<(Self, SyncHandle), StoreError> {
        let store = LocalStore::open(&session.config().database_path).await?;
        let projection = Projection::load(&store).await?;
        let health = SyncHealth::new(session.config().degraded_threshold);

        let (command_tx, commands) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SyncStatus::default());
        let (projection_tx, projection_rx) = watch::channel(Arc::new(projection.clone()));

        let engine = Self {
            reconciler: Reconciler::new(store.clone()),
            merger: PushMerger::new(store.clone()),
            session,
            store,
            projection,
            source: Arc::new(source),
            passes: PassTokens::new(),
            health,
            metrics: SyncMetrics::new(),
            phase: SyncPhase::Idle,
            last_error: None,
            commands,
            snapshot_tx,
            snapshot_rx,
            status_tx,
            projection_tx,
        };
        engine.publish_status();

        let handle = SyncHandle {
            commands: command_tx,
            status: status_rx,
            projection: projection_rx,
        };
        Ok((engine, handle))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Process commands until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        tracing::info!(account = %self.session.account_email(), "sync engine started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(EngineCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(fetched) = self.snapshot_rx.recv() => self.handle_snapshot(fetched).await,
            }
        }
        let cancelled = self.passes.cancel_all();
        tracing::info!(cancelled, "sync engine stopped");
    }

    /// Handle one command inline
    pub async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Push(event) => self.apply_push(event).await,
            EngineCommand::Reconcile => self.start_pass(),
            EngineCommand::Local(change) => {
                let label = change.label();
                if let Err(error) = self.apply_local(change).await {
                    tracing::warn!(change = label, error = %error, "local change failed");
                }
                self.publish_projection();
            }
            EngineCommand::Shutdown => {
                self.passes.cancel_all();
            }
        }
    }

    /// Run one pass to completion without the loop
    ///
    /// Used where no loop is running; the fetch still honours cancellation
    /// from a pass started later.
    pub async fn reconcile_now(&mut self) -> Option<ReconciliationReport> {
        let ticket = self.begin_pass();
        let result = tokio::select! {
            _ = ticket.token.cancelled() => return None,
            result = self.source.fetch_snapshot() => result,
        };
        self.finish_pass(FetchedSnapshot {
            pass_id: ticket.id,
            result,
        })
        .await
    }

    fn begin_pass(&mut self) -> PassTicket {
        let ticket = self.passes.begin_pass();
        self.metrics.record_pass_start();
        self.phase = SyncPhase::Fetching;
        tracing::info!(pass_id = %ticket.id, "reconciliation pass started");
        self.publish_status();
        ticket
    }

    fn start_pass(&mut self) {
        let PassTicket { id, token } = self.begin_pass();
        let source = Arc::clone(&self.source);
        let results = self.snapshot_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(pass_id = %id, "snapshot fetch cancelled");
                }
                result = source.fetch_snapshot() => {
                    let _ = results.send(FetchedSnapshot { pass_id: id, result });
                }
            }
        });
    }

    async fn handle_snapshot(&mut self, fetched: FetchedSnapshot) {
        self.finish_pass(fetched).await;
    }

    async fn finish_pass(&mut self, fetched: FetchedSnapshot) -> Option<ReconciliationReport> {
        let FetchedSnapshot { pass_id, result } = fetched;
        if !self.passes.finish(&pass_id) {
            self.metrics.record_stale_snapshot();
            tracing::debug!(pass_id = %pass_id, "discarding snapshot from superseded pass");
            return None;
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(pass_id = %pass_id, error = %error, "snapshot fetch failed");
                self.metrics.record_pass_failure();
                self.last_error = Some(error.to_string());
                self.phase = SyncPhase::Idle;
                self.publish_status();
                return None;
            }
        };

        self.phase = SyncPhase::Reconciling;
        self.publish_status();
        let report = self.reconciler.reconcile(snapshot, &pass_id).await;

        match Projection::load(&self.store).await {
            Ok(fresh) => self.projection.replace_with(fresh),
            Err(error) => tracing::error!(pass_id = %pass_id, error = %error, "reloading projection failed"),
        }

        if report.is_clean() {
            self.health.record_success();
            self.metrics.record_pass_success();
            self.last_error = None;
        } else {
            self.health.record_failure();
            self.metrics.record_pass_failure();
            self.last_error = Some(failure_summary(&report));
        }
        tracing::info!(
            pass_id = %pass_id,
            changes = report.total_changes(),
            violations = report.violations.len(),
            failures = report.failures.len(),
            "reconciliation pass finished"
        );

        self.phase = SyncPhase::Idle;
        self.publish_projection();
        self.publish_status();
        Some(report)
    }

    async fn apply_push(&mut self, event: PushEvent) {
        let outcome = self.merger.merge(&mut self.projection, event).await;
        match &outcome {
            MergeOutcome::Applied => {
                self.metrics.events_applied += 1;
                self.health.record_success();
            }
            MergeOutcome::AlreadyApplied => self.metrics.events_already_applied += 1,
            MergeOutcome::Ignored => self.metrics.events_ignored += 1,
            MergeOutcome::Dropped(error) => {
                self.metrics.events_dropped += 1;
                self.health.record_failure();
                self.last_error = Some(error.to_string());
            }
        }
        self.publish_projection();
        self.publish_status();
    }

    async fn apply_local(&mut self, change: LocalChange) -> Result<(), StoreError> {
        match change {
            LocalChange::SetTitleOverride { chatroom_id, title } => {
                self.projection.set_title_override(&chatroom_id, title.clone())?;
                self.store.set_title_override(&chatroom_id, title).await?;
            }
            LocalChange::SetNotificationMuted { chatroom_id, muted } => {
                self.projection.set_notification_muted(&chatroom_id, muted)?;
                self.store.set_notification_muted(&chatroom_id, muted).await?;
            }
            LocalChange::DeleteChatroom { chatroom_id } => {
                self.projection.remove_chatroom(&chatroom_id);
                self.store.delete_chatroom(&chatroom_id).await?;
            }
            LocalChange::UpsertBundle(bundle) => {
                self.store.upsert_bundle(bundle).await?;
                self.projection.bundles = self.store.fetch_bundles().await?;
            }
            LocalChange::DeleteBundle { bundle_id } => {
                self.store.delete_bundle(&bundle_id).await?;
                self.projection.bundles = self.store.fetch_bundles().await?;
            }
            LocalChange::AssignToBundle { bundle_id, chatroom_id } => {
                self.store.assign_chatroom_to_bundle(&bundle_id, &chatroom_id).await?;
                self.projection.bundles = self.store.fetch_bundles().await?;
            }
            LocalChange::SendPending { chatroom_id, message } => {
                self.projection.append_pending(&chatroom_id, message)?;
            }
        }
        Ok(())
    }

    fn publish_projection(&self) {
        self.projection_tx.send_replace(Arc::new(self.projection.clone()));
    }

    fn publish_status(&self) {
        let mut status = SyncStatus {
            phase: self.phase,
            current_pass: self.passes.current().map(str::to_string),
            last_sync: self.projection.last_sync_time,
            last_error: self.last_error.clone(),
            account_suspended: self.projection.account_suspended,
            metrics: self.metrics.clone(),
            ..SyncStatus::default()
        };
        self.health.apply_to(&mut status);
        self.status_tx.send_replace(status);
    }
}

fn failure_summary(report: &ReconciliationReport) -> String {
    let mut parts: Vec<String> = report
        .violations
        .iter()
        .map(|violation| violation.to_string())
        .collect();
    parts.extend(
        report
            .failures
            .iter()
            .map(|failure| format!("{}: {}", failure.family, failure.error)),
    );
    parts.join("; ")
}
