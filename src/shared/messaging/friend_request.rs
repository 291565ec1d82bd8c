//! Friend Notification Data Structure
//!
//! Pending friend-request lifecycle notifications shown to the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of friend notification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FriendNotificationKind {
    /// Someone asked to become friends
    Request,
    /// Someone accepted our request
    Accepted,
}

impl FriendNotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendNotificationKind::Request => "request",
            FriendNotificationKind::Accepted => "accepted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "request" => Some(FriendNotificationKind::Request),
            "accepted" | "accept" => Some(FriendNotificationKind::Accepted),
            _ => None,
        }
    }
}

/// A friend notification, keyed by `(from_email, kind)`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendNotification {
    /// User the notification is about
    pub from_email: String,
    /// Notification kind
    pub kind: FriendNotificationKind,
    /// When the server recorded it
    pub timestamp: DateTime<Utc>,
}

impl FriendNotification {
    /// Create a pending friend request notification
    pub fn request(from_email: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            from_email: from_email.into(),
            kind: FriendNotificationKind::Request,
            timestamp,
        }
    }

    /// Check if this is a pending request
    pub fn is_pending_request(&self) -> bool {
        self.kind == FriendNotificationKind::Request
    }
}
