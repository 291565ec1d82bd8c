//! Snapshot and push event fixtures

use chatmirror::shared::event::PushEvent;
use chatmirror::shared::snapshot::{
    Snapshot, SnapshotChatroom, SnapshotFriend, SnapshotMessageLog, SnapshotSystemLog,
};
use chrono::{DateTime, TimeZone, Utc};

/// Fixed base time so message order is deterministic
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_709_294_400 + secs, 0).unwrap()
}

/// A text message written by `a@x`, timestamped by its position
pub fn message(id: &str, position: i64, read_by: &str) -> SnapshotMessageLog {
    SnapshotMessageLog {
        id: id.to_string(),
        kind: "text".to_string(),
        writer: "a@x".to_string(),
        detail: format!("body of {}", id),
        timestamp: at(position),
        read_by: read_by.to_string(),
    }
}

pub fn system(id: &str, kind: &str, position: i64, detail: &str) -> SnapshotSystemLog {
    SnapshotSystemLog {
        id: id.to_string(),
        kind: kind.to_string(),
        timestamp: at(position),
        detail: detail.to_string(),
    }
}

pub fn room(id: &str, audience: &str, messages: Vec<SnapshotMessageLog>) -> SnapshotChatroom {
    SnapshotChatroom {
        id: id.to_string(),
        audience: audience.to_string(),
        kind: if audience.split_whitespace().count() == 2 { "pair" } else { "group" }.to_string(),
        muted: false,
        message_logs: messages,
        system_logs: Vec::new(),
    }
}

/// Builder for authoritative snapshots
#[derive(Default)]
pub struct SnapshotBuilder {
    snapshot: Snapshot,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chatroom(mut self, room: SnapshotChatroom) -> Self {
        self.snapshot.chatrooms.push(room);
        self
    }

    pub fn friend(mut self, email: &str, nickname: Option<&str>) -> Self {
        self.snapshot.friends.push(SnapshotFriend {
            email: email.to_string(),
            nickname: nickname.map(str::to_string),
        });
        self
    }

    pub fn suspended(mut self, suspended: bool) -> Self {
        self.snapshot.account_suspended = suspended;
        self
    }

    pub fn build(self) -> Snapshot {
        self.snapshot
    }
}

/// `message` push event; `audience` becomes `audiencelist` when given
pub fn message_event(room: &str, id: &str, position: i64, audience: Option<&str>) -> PushEvent {
    let mut raw = serde_json::json!({
        "eventKind": "message",
        "roomid": room,
        "chatid": id,
        "sender": "a@x",
        "detail": format!("body of {}", id),
        "kind": "text",
        "timestamp": at(position),
        "readusers": "a@x",
    });
    if let Some(audience) = audience {
        raw["audiencelist"] = serde_json::Value::from(audience);
    }
    serde_json::from_value(raw).expect("valid message event")
}

pub fn read_receipt(room: &str, ids: &[&str], who: &str) -> PushEvent {
    serde_json::from_value(serde_json::json!({
        "eventKind": "readReceipt",
        "chatroomid": room,
        "idlist": ids,
        "who": who,
    }))
    .expect("valid read receipt")
}

pub fn system_event(room: &str, kind: &str, sysid: &str, position: i64, detail: &str) -> PushEvent {
    serde_json::from_value(serde_json::json!({
        "eventKind": "systemLog",
        "roomid": room,
        "type": kind,
        "sysid": sysid,
        "timestamp": at(position),
        "detail": detail,
    }))
    .expect("valid system event")
}
