//! # Snapshot Reconciliation
//!
//! Brings the local store in line with an authoritative snapshot.
//!
//! Each entity family is partitioned three ways against the local id set:
//!
//! - **create**: ids only on the server, persisted as new entities
//! - **sync**: ids on both sides, server-controlled fields overwritten
//! - **delete**: ids only local, removed
//!
//! A family runs as one store transaction. Inside the chatroom family every
//! room runs under its own savepoint, so a consistency violation in one room
//! rolls back that room alone and the rest of the family still commits. An
//! I/O failure aborts the family; the next family still runs.
//!
//! ## Log merge
//!
//! For a synced chatroom the local log must never be longer than the server
//! log, and every local entry must exist on the server. Server entries not
//! present locally are appended. Read sets are merged by union, so a read
//! observed through a push receipt is never lost to an older snapshot.

use sqlx::{Connection, Sqlite, SqliteConnection, Transaction};
use std::collections::{BTreeMap, BTreeSet};

use crate::client::local_db::{bundles, chatrooms, friends, log_entries, sync, LocalStore};
use crate::shared::error::{ConsistencyViolation, StoreError};
use crate::shared::messaging::{Friend, FriendNotification, LogEntry, WhisperTarget};
use crate::shared::snapshot::{Snapshot, SnapshotChatroom};

/// Three-way split of two id sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetPartition {
    pub to_create: BTreeSet<String>,
    pub to_sync: BTreeSet<String>,
    pub to_delete: BTreeSet<String>,
}

impl SetPartition {
    pub fn compute(local: &BTreeSet<String>, server: &BTreeSet<String>) -> Self {
        Self {
            to_create: server.difference(local).cloned().collect(),
            to_sync: server.intersection(local).cloned().collect(),
            to_delete: local.difference(server).cloned().collect(),
        }
    }
}

/// Per-family counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilyReport {
    pub created: usize,
    /// Ids present on both sides
    pub synced: usize,
    /// Synced ids whose stored value actually changed
    pub updated: usize,
    pub deleted: usize,
}

/// A family whose transaction failed as a whole
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyFailure {
    pub family: &'static str,
    pub error: String,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub pass_id: String,
    pub chatrooms: FamilyReport,
    pub friends: FamilyReport,
    pub entries_appended: usize,
    pub readers_added: usize,
    pub notifications_replaced: bool,
    pub whisper_targets_replaced: bool,
    pub suspension_changed: bool,
    pub account_suspended: bool,
    pub bundle_members_pruned: usize,
    /// Chatrooms rolled back individually
    pub violations: Vec<ConsistencyViolation>,
    pub failures: Vec<FamilyFailure>,
}

impl ReconciliationReport {
    /// Number of stored changes the pass made
    pub fn total_changes(&self) -> usize {
        self.chatrooms.created
            + self.chatrooms.updated
            + self.chatrooms.deleted
            + self.friends.created
            + self.friends.updated
            + self.friends.deleted
            + self.entries_appended
            + self.readers_added
            + usize::from(self.notifications_replaced)
            + usize::from(self.whisper_targets_replaced)
            + usize::from(self.suspension_changed)
            + self.bundle_members_pruned
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
struct ChatroomFamily {
    report: FamilyReport,
    entries_appended: usize,
    readers_added: usize,
    violations: Vec<ConsistencyViolation>,
}

#[derive(Debug, Default)]
struct RoomSync {
    appended: usize,
    readers_added: usize,
    changed: bool,
}

#[derive(Debug, Default)]
struct AccountFamily {
    notifications_replaced: bool,
    whisper_targets_replaced: bool,
    suspension_changed: bool,
    bundle_members_pruned: usize,
}

/// Applies snapshots to the local store
#[derive(Debug, Clone)]
pub struct Reconciler {
    store: LocalStore,
}

impl Reconciler {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Run one pass
    ///
    /// Never fails as a whole: violations and family failures are logged and
    /// collected in the report. The pass is recorded in sync metadata only
    /// when every family committed.
    pub async fn reconcile(&self, snapshot: Snapshot, pass_id: &str) -> ReconciliationReport {
        let mut report = ReconciliationReport {
            pass_id: pass_id.to_string(),
            account_suspended: snapshot.account_suspended,
            ..Default::default()
        };
        tracing::info!(
            pass_id,
            chatrooms = snapshot.chatrooms.len(),
            friends = snapshot.friends.len(),
            "reconciliation pass started"
        );

        let friend_list = snapshot.friends();
        let notifications = snapshot.friend_notifications();
        let whisper_targets = snapshot.whisper_targets();
        let suspended = snapshot.account_suspended;
        let rooms = snapshot.chatrooms;

        match self
            .store
            .mutate("reconcile_chatrooms", move |conn| {
                Box::pin(reconcile_chatrooms(conn, rooms))
            })
            .await
        {
            Ok(family) => {
                report.chatrooms = family.report;
                report.entries_appended = family.entries_appended;
                report.readers_added = family.readers_added;
                report.violations = family.violations;
            }
            Err(error) => record_failure(&mut report, "chatrooms", error),
        }

        match self
            .store
            .mutate("reconcile_friends", move |conn| {
                Box::pin(reconcile_friends(conn, friend_list))
            })
            .await
        {
            Ok(family) => report.friends = family,
            Err(error) => record_failure(&mut report, "friends", error),
        }

        let record_pass = report.failures.is_empty().then(|| pass_id.to_string());
        match self
            .store
            .mutate("reconcile_account", move |conn| {
                Box::pin(reconcile_account(conn, notifications, whisper_targets, suspended, record_pass))
            })
            .await
        {
            Ok(family) => {
                report.notifications_replaced = family.notifications_replaced;
                report.whisper_targets_replaced = family.whisper_targets_replaced;
                report.suspension_changed = family.suspension_changed;
                report.bundle_members_pruned = family.bundle_members_pruned;
            }
            Err(error) => record_failure(&mut report, "account", error),
        }

        tracing::info!(
            pass_id,
            changes = report.total_changes(),
            created = report.chatrooms.created,
            deleted = report.chatrooms.deleted,
            appended = report.entries_appended,
            violations = report.violations.len(),
            failures = report.failures.len(),
            "reconciliation pass finished"
        );
        report
    }
}

fn record_failure(report: &mut ReconciliationReport, family: &'static str, error: StoreError) {
    tracing::error!(pass_id = %report.pass_id, family, error = %error, "family reconciliation rolled back");
    report.failures.push(FamilyFailure {
        family,
        error: error.to_string(),
    });
}

async fn reconcile_chatrooms(
    conn: &mut SqliteConnection,
    rooms: Vec<SnapshotChatroom>,
) -> Result<ChatroomFamily, StoreError> {
    let local = chatrooms::ids(conn).await?;
    let server: BTreeMap<String, SnapshotChatroom> =
        rooms.into_iter().map(|room| (room.id.clone(), room)).collect();
    let server_ids: BTreeSet<String> = server.keys().cloned().collect();
    let partition = SetPartition::compute(&local, &server_ids);

    let mut family = ChatroomFamily::default();
    family.report.synced = partition.to_sync.len();

    for id in &partition.to_create {
        let Some(raw) = server.get(id) else { continue };
        let mut savepoint = conn.begin().await?;
        let outcome = create_chatroom(&mut *savepoint, raw).await;
        match settle(savepoint, outcome).await? {
            Ok(()) => {
                tracing::debug!(chatroom_id = %id, "chatroom created");
                family.report.created += 1;
            }
            Err(violation) => skip_room(&mut family, violation),
        }
    }

    for id in &partition.to_sync {
        let Some(raw) = server.get(id) else { continue };
        let mut savepoint = conn.begin().await?;
        let outcome = sync_chatroom(&mut *savepoint, raw).await;
        match settle(savepoint, outcome).await? {
            Ok(sync) => {
                family.entries_appended += sync.appended;
                family.readers_added += sync.readers_added;
                if sync.changed || sync.appended > 0 || sync.readers_added > 0 {
                    family.report.updated += 1;
                }
            }
            Err(violation) => skip_room(&mut family, violation),
        }
    }

    for id in &partition.to_delete {
        if chatrooms::delete(conn, id).await? {
            tracing::debug!(chatroom_id = %id, "chatroom deleted");
            family.report.deleted += 1;
        }
    }

    Ok(family)
}

fn skip_room(family: &mut ChatroomFamily, violation: ConsistencyViolation) {
    tracing::warn!(
        chatroom_id = %violation.chatroom_id(),
        code = violation.code(),
        error = %violation,
        "chatroom sync rolled back"
    );
    family.violations.push(violation);
}

/// Commit or roll back a per-room savepoint
///
/// A consistency violation rolls back the savepoint and is returned as the
/// inner error; any other error propagates and aborts the enclosing transaction.
async fn settle<T>(
    savepoint: Transaction<'_, Sqlite>,
    outcome: Result<T, StoreError>,
) -> Result<Result<T, ConsistencyViolation>, StoreError> {
    match outcome {
        Ok(value) => {
            savepoint.commit().await?;
            Ok(Ok(value))
        }
        Err(StoreError::Consistency(violation)) => {
            savepoint.rollback().await?;
            Ok(Err(violation))
        }
        Err(other) => Err(other),
    }
}

async fn create_chatroom(conn: &mut SqliteConnection, raw: &SnapshotChatroom) -> Result<(), StoreError> {
    let room = raw.to_chatroom()?;
    chatrooms::insert(conn, &room).await
}

async fn sync_chatroom(conn: &mut SqliteConnection, raw: &SnapshotChatroom) -> Result<RoomSync, StoreError> {
    let server_log = raw.log_entries()?;

    let local_len = log_entries::count(conn, &raw.id).await?;
    if local_len > server_log.len() {
        return Err(ConsistencyViolation::ServerBehindLocal {
            chatroom_id: raw.id.clone(),
            local_len,
            server_len: server_log.len(),
        }
        .into());
    }

    let local_ids = log_entries::entry_ids(conn, &raw.id).await?;
    let server_ids: BTreeSet<&str> = server_log.iter().map(LogEntry::id).collect();
    let mut missing: Vec<&String> = local_ids
        .iter()
        .filter(|id| !server_ids.contains(id.as_str()))
        .collect();
    missing.sort();
    if let Some(entry_id) = missing.first() {
        return Err(ConsistencyViolation::LogEntryNotFoundOnServer {
            chatroom_id: raw.id.clone(),
            entry_id: entry_id.to_string(),
        }
        .into());
    }

    let mut sync = RoomSync::default();
    for entry in &server_log {
        if local_ids.contains(entry.id()) {
            if let LogEntry::User(message) = entry {
                sync.readers_added +=
                    log_entries::add_readers(conn, &raw.id, &message.id, &message.read_by).await?;
            }
        } else if log_entries::insert_entry(conn, &raw.id, entry).await? {
            sync.appended += 1;
        }
    }

    let audience_changed = chatrooms::set_audience(conn, &raw.id, &raw.audience()).await?;
    let attributes_changed =
        chatrooms::update_attributes(conn, &raw.id, raw.kind(), raw.muted).await?;
    sync.changed = audience_changed || attributes_changed;

    if sync.changed || sync.appended > 0 {
        tracing::debug!(
            chatroom_id = %raw.id,
            appended = sync.appended,
            readers_added = sync.readers_added,
            audience_changed,
            "chatroom synced"
        );
    }
    Ok(sync)
}

async fn reconcile_friends(
    conn: &mut SqliteConnection,
    server: Vec<Friend>,
) -> Result<FamilyReport, StoreError> {
    let local = friends::emails(conn).await?;
    let server: BTreeMap<String, Friend> = server
        .into_iter()
        .map(|friend| (friend.email.clone(), friend))
        .collect();
    let server_ids: BTreeSet<String> = server.keys().cloned().collect();
    let partition = SetPartition::compute(&local, &server_ids);

    let mut report = FamilyReport {
        synced: partition.to_sync.len(),
        ..Default::default()
    };
    for email in &partition.to_create {
        if let Some(friend) = server.get(email) {
            friends::upsert(conn, friend).await?;
            report.created += 1;
        }
    }
    for email in &partition.to_sync {
        if let Some(friend) = server.get(email) {
            if friends::upsert(conn, friend).await? {
                report.updated += 1;
            }
        }
    }
    for email in &partition.to_delete {
        if friends::delete(conn, email).await? {
            report.deleted += 1;
        }
    }
    Ok(report)
}

fn notification_order(a: &FriendNotification, b: &FriendNotification) -> std::cmp::Ordering {
    (&a.from_email, a.kind, a.timestamp).cmp(&(&b.from_email, b.kind, b.timestamp))
}

async fn reconcile_account(
    conn: &mut SqliteConnection,
    mut notifications: Vec<FriendNotification>,
    mut whisper_targets: Vec<WhisperTarget>,
    suspended: bool,
    record_pass: Option<String>,
) -> Result<AccountFamily, StoreError> {
    let mut family = AccountFamily::default();

    for notification in &mut notifications {
        notification.timestamp = log_entries::stored_precision(notification.timestamp);
    }
    notifications.sort_by(notification_order);
    notifications.dedup_by(|a, b| a.from_email == b.from_email && a.kind == b.kind);
    let mut current = friends::load_notifications(conn).await?;
    current.sort_by(notification_order);
    if current != notifications {
        friends::replace_notifications(conn, &notifications).await?;
        family.notifications_replaced = true;
    }

    whisper_targets.sort();
    whisper_targets.dedup();
    if log_entries::load_whisper_targets(conn).await? != whisper_targets {
        log_entries::replace_whisper_targets(conn, &whisper_targets).await?;
        family.whisper_targets_replaced = true;
    }

    if sync::account_suspended(conn).await? != suspended {
        sync::set_account_suspended(conn, suspended).await?;
        family.suspension_changed = true;
        tracing::info!(suspended, "account suspension changed");
    }

    let live = chatrooms::ids(conn).await?;
    family.bundle_members_pruned = bundles::prune(conn, &live).await?;

    if let Some(pass_id) = record_pass {
        sync::record_pass(conn, &pass_id, chrono::Utc::now()).await?;
    }
    Ok(family)
}
