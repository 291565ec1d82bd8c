//! Friend Data Structure
//!
//! Represents a confirmed friend of the current user.

use serde::{Deserialize, Serialize};

/// A friend, keyed by email
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Friend {
    /// Email address (unique key)
    pub email: String,
    /// Nickname chosen by the friend, controlled by the server
    pub nickname: Option<String>,
}

impl Friend {
    /// Create a new friend
    pub fn new(email: impl Into<String>, nickname: Option<String>) -> Self {
        Self {
            email: email.into(),
            nickname,
        }
    }

    /// Name to show in lists: nickname when set, otherwise the email
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.email)
    }
}
