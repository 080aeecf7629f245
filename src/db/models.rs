use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::moderation::domain::ReportStatus;

/// Collection paths in the document store.
pub mod collections {
    pub const USERS: &str = "users";
    pub const LIKES: &str = "likes";
    pub const MATCHES: &str = "matches";
    pub const CHATS: &str = "chats";
    pub const REPORTS: &str = "reports";
    pub const ADMIN_NOTIFICATIONS: &str = "admin_notifications";

    /// Message log of one chat room.
    pub fn messages(room_id: &str) -> String {
        format!("{}/{}/messages", CHATS, room_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub location: Option<String>,
    pub push_token: Option<String>,
    #[serde(default)]
    pub is_suspended: bool,
    pub ban_reason: Option<String>,
    pub ban_date: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub profile_set: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: String,
    pub from: String,
    pub to: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: String,
    pub user1: String,
    pub user2: String,
    pub matched_at: Option<DateTime<Utc>>,
}

impl Match {
    #[cfg(test)]
    pub fn involves(&self, uid: &str) -> bool {
        self.user1 == uid || self.user2 == uid
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: String,
    pub members: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_message: String,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ChatRoom {
    pub fn has_member(&self, uid: &str) -> bool {
        self.members.iter().any(|m| m == uid)
    }

    pub fn partner_of(&self, uid: &str) -> Option<&str> {
        self.members
            .iter()
            .map(String::as_str)
            .find(|member| *member != uid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_by: Vec<String>,
}

impl Message {
    pub fn is_read_by(&self, uid: &str) -> bool {
        self.read_by.iter().any(|r| r == uid)
    }

    /// Authored by someone else and not yet read by `viewer`.
    pub fn is_unread_for(&self, viewer: &str) -> bool {
        self.sender_id != viewer && !self.is_read_by(viewer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub reporter_id: String,
    pub reported_user_id: String,
    #[serde(default)]
    pub report_reason: String,
    pub reported_at: Option<DateTime<Utc>>,
    pub status: ReportStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminNotification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub reporter_id: String,
    pub reported_user_id: String,
    #[serde(default)]
    pub reason: String,
    pub notified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read: bool,
}
