// Admin notification feed - durable read/unread queue of moderation events
use serde_json::json;

use super::domain::ModerationError;
use crate::db::models::{collections, AdminNotification};
use crate::store::{fields, subscribe, Direction, DynDocumentStore, Query, StoreError, Subscription};

pub struct AdminNotificationFeed {
    store: DynDocumentStore,
}

impl AdminNotificationFeed {
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }

    /// Newest first.
    pub async fn list(&self) -> Result<Vec<AdminNotification>, ModerationError> {
        let docs = self.store.query(&feed_query()).await?;
        Ok(docs
            .iter()
            .map(|d| d.decode())
            .collect::<Result<Vec<AdminNotification>, _>>()?)
    }

    pub async fn unread_count(&self) -> Result<usize, ModerationError> {
        let query = Query::collection(collections::ADMIN_NOTIFICATIONS).where_eq("read", false);
        Ok(self.store.query(&query).await?.len())
    }

    /// Mark one notification read. There is no way back to unread.
    pub async fn mark_read(&self, id: &str) -> Result<(), ModerationError> {
        match self
            .store
            .update(
                collections::ADMIN_NOTIFICATIONS,
                id,
                fields(json!({ "read": true })),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound { id, .. }) => Err(ModerationError::NotificationNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Live view of the feed, newest first. Decode snapshots with
    /// `Snapshot::decode_all::<AdminNotification>()`.
    pub async fn subscribe(&self) -> Result<Subscription, ModerationError> {
        Ok(subscribe(self.store.clone(), feed_query()).await?)
    }
}

fn feed_query() -> Query {
    Query::collection(collections::ADMIN_NOTIFICATIONS)
        .order_by("notifiedAt", Direction::Descending)
}
