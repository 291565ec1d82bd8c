//! Chatroom Bundle Data Structure
//!
//! A bundle groups chatrooms in the room list. It references chatrooms by id;
//! it does not own them. Keeping a chatroom in at most one bundle is the
//! caller's job.

use serde::{Deserialize, Serialize};

/// Where a bundle is pinned in the room list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BundlePosition {
    #[default]
    None,
    Top,
    Bottom,
}

impl BundlePosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundlePosition::None => "none",
            BundlePosition::Top => "top",
            BundlePosition::Bottom => "bottom",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "none" => Some(BundlePosition::None),
            "top" => Some(BundlePosition::Top),
            "bottom" => Some(BundlePosition::Bottom),
            _ => None,
        }
    }
}

/// A named group of chatrooms
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatroomBundle {
    pub id: String,
    pub name: String,
    pub icon_ref: Option<String>,
    #[serde(default)]
    pub position: BundlePosition,
    /// Member chatroom ids, in display order
    #[serde(default)]
    pub member_chatroom_ids: Vec<String>,
}

impl ChatroomBundle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon_ref: None,
            position: BundlePosition::None,
            member_chatroom_ids: Vec::new(),
        }
    }

    pub fn contains(&self, chatroom_id: &str) -> bool {
        self.member_chatroom_ids.iter().any(|id| id == chatroom_id)
    }

    /// Append a member if absent. Returns true if added.
    pub fn add_member(&mut self, chatroom_id: &str) -> bool {
        if self.contains(chatroom_id) {
            return false;
        }
        self.member_chatroom_ids.push(chatroom_id.to_string());
        true
    }

    /// Remove a member. Returns true if it was present.
    pub fn remove_member(&mut self, chatroom_id: &str) -> bool {
        let before = self.member_chatroom_ids.len();
        self.member_chatroom_ids.retain(|id| id != chatroom_id);
        before != self.member_chatroom_ids.len()
    }

    /// Keep only members accepted by `keep`, preserving order. Returns removed ids.
    pub fn retain_members(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let mut removed = Vec::new();
        self.member_chatroom_ids.retain(|id| {
            let kept = keep(id);
            if !kept {
                removed.push(id.clone());
            }
            kept
        });
        removed
    }
}
