// Report lifecycle and moderation policy - pure, no store access
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::db::models::{Report, User};
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportStatus {
    Pending,
    Approved,
    Rejected,
    Banned,
    AutoBanned,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Banned => "banned",
            Self::AutoBanned => "auto-banned",
        }
    }

    /// Reviews only move a pending report; auto-ban only relabels approved ones.
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Pending, Self::Banned)
                | (Self::Approved, Self::AutoBanned)
        )
    }

    #[cfg(test)]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Banned | Self::AutoBanned)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "banned" => Ok(Self::Banned),
            "auto-banned" => Ok(Self::AutoBanned),
            other => Err(ModerationError::UnknownStatus(other.to_string())),
        }
    }
}

/// Suspend a user once this many of their reports are approved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoBanPolicy {
    pub threshold: usize,
    pub reason: String,
}

impl AutoBanPolicy {
    pub fn triggers(&self, approved_reports: usize) -> bool {
        approved_reports >= self.threshold
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AutoBanOutcome {
    BelowThreshold { approved: usize },
    /// The user was suspended and these reports relabelled `auto-banned`.
    Suspended { report_ids: Vec<String> },
}

impl AutoBanOutcome {
    pub fn suspended(&self) -> bool {
        matches!(self, Self::Suspended { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetail {
    pub report: Report,
    pub reported_user: Option<User>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: usize,
    pub suspended_users: usize,
    pub total_reports: usize,
    pub approved_reports: usize,
    pub auto_banned_reports: usize,
}

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("A user cannot report themselves")]
    SelfReport,

    #[error("Report not found: {0}")]
    ReportNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Notification not found: {0}")]
    NotificationNotFound(String),

    #[error("Unknown report status: {0}")]
    UnknownStatus(String),

    #[error("Report {report} cannot move from {from} to {to}")]
    InvalidTransition {
        report: String,
        from: ReportStatus,
        to: ReportStatus,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
