// Like/Match engine - directional likes, mutual detection, room materialization
use serde_json::json;

use super::domain::{like_key, LikeOutcome, LikeProfile, MatchError, PairKey};
use crate::db::models::{collections, Like};
use crate::notify::{deliver, DynNotifier, Notification};
use crate::store::{fields, server_timestamp, Direction, DynDocumentStore, Query, StoreError, Write};
use crate::users::{UserDirectory, UserId};

const MATCH_TITLE: &str = "It's a match!";
const FALLBACK_NAME: &str = "Someone";

pub struct MatchEngine {
    store: DynDocumentStore,
    users: UserDirectory,
    notifier: DynNotifier,
}

impl MatchEngine {
    pub fn new(store: DynDocumentStore, notifier: DynNotifier) -> Self {
        Self {
            users: UserDirectory::new(store.clone()),
            store,
            notifier,
        }
    }

    /// Record that `from` likes `to`. When `to` already likes `from`, the
    /// pair's chat room (first writer wins) and match record are written in
    /// one batch and `to` is notified.
    pub async fn like(
        &self,
        from: &UserId,
        to: &UserId,
        from_name: &str,
    ) -> Result<LikeOutcome, MatchError> {
        if from == to {
            return Err(MatchError::SelfLike);
        }

        // Same key every time, so repeats only refresh the timestamp
        self.store
            .set(
                collections::LIKES,
                &like_key(from, to),
                fields(json!({
                    "from": from.as_str(),
                    "to": to.as_str(),
                    "timestamp": server_timestamp(),
                })),
            )
            .await?;

        let reverse = self
            .store
            .get(collections::LIKES, &like_key(to, from))
            .await?;
        if reverse.is_none() {
            tracing::debug!(%from, %to, "One-way like recorded");
            return Ok(LikeOutcome::PendingLike);
        }

        let pair_key = PairKey::new(from, to);
        let applied = self
            .store
            .commit(vec![
                Write::create(
                    collections::CHATS,
                    pair_key.as_str(),
                    fields(json!({
                        "members": [from.as_str(), to.as_str()],
                        "createdAt": server_timestamp(),
                        "lastMessage": "",
                        "lastMessageAt": server_timestamp(),
                    })),
                ),
                Write::set(
                    collections::MATCHES,
                    pair_key.as_str(),
                    fields(json!({
                        "user1": from.as_str(),
                        "user2": to.as_str(),
                        "matchedAt": server_timestamp(),
                    })),
                ),
            ])
            .await?;
        let room_created = applied.first().copied().unwrap_or(false);

        tracing::info!(%from, %to, pair = %pair_key, room_created, "Mutual match");

        self.notify_match(to, from_name).await;

        Ok(LikeOutcome::MutualMatch {
            pair_key,
            room_created,
        })
    }

    /// Decline a received like: removes the edge `to` → `from`. Any existing
    /// match or chat room for the pair is left alone.
    pub async fn cancel_like(&self, from: &UserId, to: &UserId) -> Result<bool, MatchError> {
        let removed = self
            .store
            .delete(collections::LIKES, &like_key(to, from))
            .await?;

        tracing::info!(decliner = %from, liker = %to, removed, "Declined like");
        Ok(removed)
    }

    pub async fn is_matched(&self, a: &UserId, b: &UserId) -> Result<bool, MatchError> {
        let pair_key = PairKey::new(a, b);
        Ok(self
            .store
            .get(collections::MATCHES, pair_key.as_str())
            .await?
            .is_some())
    }

    /// Likes pointing at `uid`, newest first.
    pub async fn received_likes(&self, uid: &UserId) -> Result<Vec<LikeProfile>, MatchError> {
        let likes = self.likes_where("to", uid).await?;

        let mut profiles = Vec::with_capacity(likes.len());
        for like in likes {
            let is_matched = self.pair_has_match(uid.as_str(), &like.from).await?;
            profiles.push(LikeProfile {
                name: self.users.display_name(&like.from).await,
                user_id: like.from,
                liked_at: like.timestamp,
                is_matched,
            });
        }
        Ok(profiles)
    }

    /// Likes sent by `uid`, newest first.
    pub async fn sent_likes(&self, uid: &UserId) -> Result<Vec<LikeProfile>, MatchError> {
        let likes = self.likes_where("from", uid).await?;

        let mut profiles = Vec::with_capacity(likes.len());
        for like in likes {
            let is_matched = self.pair_has_match(uid.as_str(), &like.to).await?;
            profiles.push(LikeProfile {
                name: self.users.display_name(&like.to).await,
                user_id: like.to,
                liked_at: like.timestamp,
                is_matched,
            });
        }
        Ok(profiles)
    }

    async fn likes_where(&self, field: &str, uid: &UserId) -> Result<Vec<Like>, StoreError> {
        let query = Query::collection(collections::LIKES)
            .where_eq(field, uid.as_str())
            .order_by("timestamp", Direction::Descending);
        let docs = self.store.query(&query).await?;
        docs.iter().map(|d| d.decode()).collect()
    }

    async fn pair_has_match(&self, a: &str, b: &str) -> Result<bool, StoreError> {
        let pair_key = PairKey::new(a, b);
        Ok(self
            .store
            .get(collections::MATCHES, pair_key.as_str())
            .await?
            .is_some())
    }

    async fn notify_match(&self, to: &UserId, from_name: &str) {
        let token = match self.users.get(to.as_str()).await {
            Ok(Some(user)) => user.push_token,
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(user = %to, "Could not read push token: {}", e);
                None
            }
        };
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return;
        };

        let name = match from_name.trim() {
            "" => FALLBACK_NAME,
            name => name,
        };
        deliver(
            self.notifier.as_ref(),
            Notification::push(
                MATCH_TITLE,
                format!("You matched with {}! Start a conversation now.", name),
                token,
            ),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::models::{ChatRoom, Match};
    use crate::notify::testing::{FailingNotifier, RecordingNotifier};
    use crate::store::SqliteDocumentStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Harness {
        engine: MatchEngine,
        store: DynDocumentStore,
        notifier: Arc<RecordingNotifier>,
        _temp: TempDir,
    }

    fn create_harness() -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        let store: DynDocumentStore = Arc::new(SqliteDocumentStore::new(pool));
        let notifier = Arc::new(RecordingNotifier::default());

        Harness {
            engine: MatchEngine::new(store.clone(), notifier.clone()),
            store,
            notifier,
            _temp: temp_dir,
        }
    }

    fn uid(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    async fn count(store: &DynDocumentStore, collection: &str) -> usize {
        store
            .query(&Query::collection(collection))
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_one_way_like_is_pending() {
        let h = create_harness();

        let outcome = h.engine.like(&uid("alice"), &uid("bob"), "Alice").await.unwrap();

        assert_eq!(outcome, LikeOutcome::PendingLike);
        assert!(h.store.get(collections::LIKES, "alice_bob").await.unwrap().is_some());
        assert_eq!(count(&h.store, collections::CHATS).await, 0);
        assert_eq!(count(&h.store, collections::MATCHES).await, 0);
    }

    #[tokio::test]
    async fn test_repeat_like_keeps_single_edge() {
        let h = create_harness();

        h.engine.like(&uid("alice"), &uid("bob"), "Alice").await.unwrap();
        h.engine.like(&uid("alice"), &uid("bob"), "Alice").await.unwrap();

        assert_eq!(count(&h.store, collections::LIKES).await, 1);
    }

    #[tokio::test]
    async fn test_self_like_rejected() {
        let h = create_harness();
        let result = h.engine.like(&uid("alice"), &uid("alice"), "Alice").await;
        assert!(matches!(result, Err(MatchError::SelfLike)));
        assert_eq!(count(&h.store, collections::LIKES).await, 0);
    }

    #[tokio::test]
    async fn test_mutual_like_creates_room_and_match() {
        let h = create_harness();

        h.engine.like(&uid("bob"), &uid("alice"), "Bob").await.unwrap();
        let outcome = h.engine.like(&uid("alice"), &uid("bob"), "Alice").await.unwrap();

        assert_eq!(
            outcome,
            LikeOutcome::MutualMatch {
                pair_key: PairKey::new("alice", "bob"),
                room_created: true,
            }
        );

        let room: ChatRoom = h
            .store
            .get(collections::CHATS, "alice_bob")
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(room.members, vec!["alice", "bob"]);
        assert_eq!(room.last_message, "");

        let record: Match = h
            .store
            .get(collections::MATCHES, "alice_bob")
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap();
        assert!(record.involves("alice") && record.involves("bob"));
    }

    #[tokio::test]
    async fn test_rematching_does_not_recreate_room() {
        let h = create_harness();

        h.engine.like(&uid("bob"), &uid("alice"), "Bob").await.unwrap();
        h.engine.like(&uid("alice"), &uid("bob"), "Alice").await.unwrap();
        h.store
            .update(
                collections::CHATS,
                "alice_bob",
                fields(json!({ "lastMessage": "hi" })),
            )
            .await
            .unwrap();

        let again = h.engine.like(&uid("bob"), &uid("alice"), "Bob").await.unwrap();

        assert_eq!(
            again,
            LikeOutcome::MutualMatch {
                pair_key: PairKey::new("alice", "bob"),
                room_created: false,
            }
        );
        let room = h.store.get(collections::CHATS, "alice_bob").await.unwrap().unwrap();
        assert_eq!(room.get_str("lastMessage"), Some("hi"));
        assert_eq!(count(&h.store, collections::CHATS).await, 1);
        assert_eq!(count(&h.store, collections::MATCHES).await, 1);
    }

    #[tokio::test]
    async fn test_match_notifies_target_with_token() {
        let h = create_harness();
        h.store
            .set(
                collections::USERS,
                "bob",
                fields(json!({ "name": "Bob", "pushToken": "tok-bob" })),
            )
            .await
            .unwrap();

        h.engine.like(&uid("bob"), &uid("alice"), "Bob").await.unwrap();
        h.engine.like(&uid("alice"), &uid("bob"), "Alice").await.unwrap();

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target_token.as_deref(), Some("tok-bob"));
        assert!(sent[0].body.contains("Alice"));
    }

    #[tokio::test]
    async fn test_match_without_token_skips_notification() {
        let h = create_harness();

        h.engine.like(&uid("bob"), &uid("alice"), "Bob").await.unwrap();
        h.engine.like(&uid("alice"), &uid("bob"), "").await.unwrap();

        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_notification_failure_is_not_fatal() {
        let h = create_harness();
        let engine = MatchEngine::new(h.store.clone(), Arc::new(FailingNotifier));
        h.store
            .set(collections::USERS, "bob", fields(json!({ "pushToken": "tok" })))
            .await
            .unwrap();

        engine.like(&uid("bob"), &uid("alice"), "Bob").await.unwrap();
        let outcome = engine.like(&uid("alice"), &uid("bob"), "Alice").await.unwrap();

        assert!(outcome.is_match());
    }

    #[tokio::test]
    async fn test_cancel_removes_received_edge_only() {
        let h = create_harness();
        h.engine.like(&uid("bob"), &uid("alice"), "Bob").await.unwrap();
        h.engine.like(&uid("alice"), &uid("bob"), "Alice").await.unwrap();

        // alice declines bob's like
        let removed = h.engine.cancel_like(&uid("alice"), &uid("bob")).await.unwrap();

        assert!(removed);
        assert!(h.store.get(collections::LIKES, "bob_alice").await.unwrap().is_none());
        assert!(h.store.get(collections::LIKES, "alice_bob").await.unwrap().is_some());
        assert!(h.engine.is_matched(&uid("alice"), &uid("bob")).await.unwrap());
        assert!(h.store.get(collections::CHATS, "alice_bob").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_received_and_sent_likes() {
        let h = create_harness();
        h.store
            .set(collections::USERS, "bob", fields(json!({ "name": "Bob" })))
            .await
            .unwrap();

        h.engine.like(&uid("bob"), &uid("alice"), "Bob").await.unwrap();
        h.engine.like(&uid("carol"), &uid("alice"), "Carol").await.unwrap();
        h.engine.like(&uid("alice"), &uid("bob"), "Alice").await.unwrap();

        let received = h.engine.received_likes(&uid("alice")).await.unwrap();
        assert_eq!(received.len(), 2);
        // Newest first
        assert_eq!(received[0].user_id, "carol");
        assert_eq!(received[0].name, crate::users::UNKNOWN_USER_NAME);
        assert!(!received[0].is_matched);
        assert_eq!(received[1].user_id, "bob");
        assert_eq!(received[1].name, "Bob");
        assert!(received[1].is_matched);

        let sent = h.engine.sent_likes(&uid("alice")).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, "bob");
        assert!(sent[0].is_matched);
    }
}
