// User profiles - created at profile setup, never deleted
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

use crate::db::models::{collections, User};
use crate::store::{fields, server_timestamp, DynDocumentStore, Query, StoreError, Write};

/// Shown when a profile cannot be read.
pub const UNKNOWN_USER_NAME: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid user id: {0:?}")]
pub struct InvalidUserId(pub String);

/// Validated user id. `_` joins ids into pair and like keys and `/` separates
/// collection paths, so neither may appear inside an id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn parse(id: impl Into<String>) -> Result<Self, InvalidUserId> {
        let id = id.into();
        if id.trim().is_empty() || id.contains('_') || id.contains('/') {
            return Err(InvalidUserId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum UserError {
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    pub name: String,
    pub email: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub location: Option<String>,
    pub push_token: Option<String>,
}

pub struct UserDirectory {
    store: DynDocumentStore,
}

impl UserDirectory {
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }

    /// Create or edit a profile. Moderation fields are never touched here, so
    /// editing a profile cannot lift a suspension.
    pub async fn save_profile(&self, uid: &UserId, input: ProfileInput) -> Result<User, UserError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(UserError::InvalidProfile("name is required".into()));
        }

        let mut profile = fields(json!({
            "name": name,
            "profileSet": true,
        }));
        let optional = [
            ("email", input.email.map(Value::from)),
            ("age", input.age.map(Value::from)),
            ("gender", input.gender.map(Value::from)),
            ("location", input.location.map(Value::from)),
            ("pushToken", input.push_token.map(Value::from)),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                profile.insert(key.to_string(), value);
            }
        }

        self.store
            .commit(vec![
                Write::create(
                    collections::USERS,
                    uid.as_str(),
                    fields(json!({
                        "isSuspended": false,
                        "createdAt": server_timestamp(),
                    })),
                ),
                Write::merge(collections::USERS, uid.as_str(), profile),
            ])
            .await?;

        tracing::info!(user = %uid, "Saved profile");

        self.get(uid.as_str())
            .await?
            .ok_or_else(|| UserError::Store(StoreError::NotFound {
                collection: collections::USERS.to_string(),
                id: uid.to_string(),
            }))
    }

    pub async fn get(&self, uid: &str) -> Result<Option<User>, StoreError> {
        match self.store.get(collections::USERS, uid).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Display name for lists. Missing or unreadable profiles get a placeholder.
    pub async fn display_name(&self, uid: &str) -> String {
        match self.get(uid).await {
            Ok(Some(user)) if !user.name.is_empty() => user.name,
            Ok(_) => UNKNOWN_USER_NAME.to_string(),
            Err(e) => {
                tracing::warn!(user = %uid, "Failed to load profile: {}", e);
                UNKNOWN_USER_NAME.to_string()
            }
        }
    }

    pub async fn all(&self) -> Result<Vec<User>, StoreError> {
        let docs = self.store.query(&Query::collection(collections::USERS)).await?;
        docs.iter().map(|d| d.decode()).collect()
    }

    pub async fn suspended(&self) -> Result<Vec<User>, StoreError> {
        let query = Query::collection(collections::USERS).where_eq("isSuspended", true);
        let docs = self.store.query(&query).await?;
        docs.iter().map(|d| d.decode()).collect()
    }
}
