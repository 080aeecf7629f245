// Matching domain types - pure, no store access
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::store::StoreError;

/// Joint key of an unordered pair: the two ids in natural string order,
/// joined by `_`. Either party computes the same key, which is what makes
/// match and room creation converge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PairKey(String);

impl PairKey {
    pub fn new(a: impl AsRef<str>, b: impl AsRef<str>) -> Self {
        let (a, b) = (a.as_ref(), b.as_ref());
        if a < b {
            Self(format!("{}_{}", a, b))
        } else {
            Self(format!("{}_{}", b, a))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of the directional edge `from` likes `to`.
pub fn like_key(from: impl AsRef<str>, to: impl AsRef<str>) -> String {
    format!("{}_{}", from.as_ref(), to.as_ref())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LikeOutcome {
    /// Only this direction exists so far.
    PendingLike,
    /// Both directions exist; the match and chat room live at `pair_key`.
    MutualMatch {
        pair_key: PairKey,
        /// Whether this call created the chat room.
        room_created: bool,
    },
}

impl LikeOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::MutualMatch { .. })
    }
}

/// A like as seen from one side, with the other party's display name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeProfile {
    pub user_id: String,
    pub name: String,
    pub liked_at: Option<DateTime<Utc>>,
    pub is_matched: bool,
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("A user cannot like themselves")]
    SelfLike,

    #[error(transparent)]
    Store(#[from] StoreError),
}
