// Chat rooms - append-only message logs with read receipts
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use super::timeline::{self, TimelineItem};
use crate::db::models::{collections, ChatRoom, Message};
use crate::notify::{deliver, DynNotifier, Notification};
use crate::store::{
    fields, server_timestamp, subscribe, Direction, DynDocumentStore, Query, StoreError,
    Subscription, Write,
};
use crate::users::{UserDirectory, UserId};

const INCOMING_TITLE: &str = "New message!";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message text is empty")]
    EmptyMessage,

    #[error("Chat room not found: {0}")]
    RoomNotFound(String),

    #[error("{user} is not a member of {room}")]
    NotMember { room: String, user: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One row of a user's chat list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub partner_id: String,
    pub partner_name: String,
    pub last_message: String,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: usize,
}

/// A fresh view of a watched room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomUpdate {
    pub messages: Vec<Message>,
    /// Partner messages that arrived since the previous update. Always empty
    /// for the first update.
    pub incoming: Vec<Message>,
    pub unread_count: usize,
}

#[derive(Clone)]
pub struct ChatService {
    store: DynDocumentStore,
    notifier: DynNotifier,
}

impl ChatService {
    pub fn new(store: DynDocumentStore, notifier: DynNotifier) -> Self {
        Self { store, notifier }
    }

    /// Append a message and refresh the room's last-message cache. The two
    /// writes are separate; the cache may briefly lag the log.
    pub async fn send_message(
        &self,
        room_id: &str,
        sender: &UserId,
        text: &str,
    ) -> Result<Message, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        self.room_for_member(room_id, sender.as_str()).await?;

        let log = collections::messages(room_id);
        let id = self
            .store
            .add(
                &log,
                fields(json!({
                    "text": text,
                    "senderId": sender.as_str(),
                    "createdAt": server_timestamp(),
                    "readBy": [],
                })),
            )
            .await?;

        self.store
            .update(
                collections::CHATS,
                room_id,
                fields(json!({
                    "lastMessage": text,
                    "lastMessageAt": server_timestamp(),
                })),
            )
            .await?;

        tracing::debug!(room = %room_id, sender = %sender, message = %id, "Message sent");

        let doc = self.store.get(&log, &id).await?.ok_or_else(|| StoreError::NotFound {
            collection: log.clone(),
            id: id.clone(),
        })?;
        Ok(doc.decode()?)
    }

    /// Add `viewer` to the read set of every partner message it has not read.
    /// Returns how many messages changed.
    pub async fn mark_read(&self, room_id: &str, viewer: &UserId) -> Result<usize, ChatError> {
        self.room_for_member(room_id, viewer.as_str()).await?;

        let log = collections::messages(room_id);
        let writes: Vec<Write> = self
            .messages(room_id)
            .await?
            .iter()
            .filter(|m| m.is_unread_for(viewer.as_str()))
            .map(|m| {
                Write::array_union(
                    log.as_str(),
                    m.id.as_str(),
                    "readBy",
                    vec![Value::from(viewer.as_str())],
                )
            })
            .collect();

        if writes.is_empty() {
            return Ok(0);
        }

        let applied = self.store.commit(writes).await?;
        let marked = applied.into_iter().filter(|changed| *changed).count();
        tracing::debug!(room = %room_id, viewer = %viewer, marked, "Marked messages read");
        Ok(marked)
    }

    /// The room's messages, oldest first.
    pub async fn messages(&self, room_id: &str) -> Result<Vec<Message>, ChatError> {
        let docs = self.store.query(&messages_query(room_id)).await?;
        Ok(docs
            .iter()
            .map(|d| d.decode())
            .collect::<Result<Vec<Message>, _>>()?)
    }

    pub async fn timeline<Tz: TimeZone>(
        &self,
        room_id: &str,
        tz: &Tz,
    ) -> Result<Vec<TimelineItem>, ChatError> {
        let messages = self.messages(room_id).await?;
        Ok(timeline::group_by_date(&messages, tz))
    }

    pub async fn unread_count(&self, room_id: &str, viewer: &UserId) -> Result<usize, ChatError> {
        let messages = self.messages(room_id).await?;
        Ok(timeline::unread_count(&messages, viewer.as_str()))
    }

    /// Rooms the viewer belongs to, most recently active first.
    pub async fn list_rooms(&self, viewer: &UserId) -> Result<Vec<RoomSummary>, ChatError> {
        let query = Query::collection(collections::CHATS)
            .where_array_contains("members", viewer.as_str())
            .order_by("lastMessageAt", Direction::Descending);
        let rooms: Vec<ChatRoom> = self
            .store
            .query(&query)
            .await?
            .iter()
            .map(|d| d.decode())
            .collect::<Result<Vec<ChatRoom>, _>>()?;

        let users = UserDirectory::new(self.store.clone());
        let mut summaries = Vec::with_capacity(rooms.len());
        for room in rooms {
            let partner_id = room.partner_of(viewer.as_str()).unwrap_or_default().to_string();
            let messages = self.messages(&room.id).await?;

            // The log is authoritative; the room fields are only a cache
            let (last_message, last_message_at) = match messages.last() {
                Some(last) => (last.text.clone(), Some(last.created_at)),
                None => (room.last_message.clone(), room.last_message_at),
            };

            summaries.push(RoomSummary {
                partner_name: users.display_name(&partner_id).await,
                unread_count: timeline::unread_count(&messages, viewer.as_str()),
                room_id: room.id,
                partner_id,
                last_message,
                last_message_at,
            });
        }
        Ok(summaries)
    }

    /// Follow a room live on behalf of `viewer`. Partner messages arriving
    /// after the first update raise a local notification.
    pub async fn watch(&self, room_id: &str, viewer: &UserId) -> Result<RoomWatch, ChatError> {
        self.room_for_member(room_id, viewer.as_str()).await?;

        let subscription = subscribe(self.store.clone(), messages_query(room_id)).await?;
        Ok(RoomWatch {
            subscription,
            viewer: viewer.clone(),
            notifier: self.notifier.clone(),
            previous: None,
        })
    }

    /// The room, provided `uid` belongs to it.
    pub async fn room_for_member(&self, room_id: &str, uid: &str) -> Result<ChatRoom, ChatError> {
        let room: ChatRoom = self
            .store
            .get(collections::CHATS, room_id)
            .await?
            .ok_or_else(|| ChatError::RoomNotFound(room_id.to_string()))?
            .decode()?;

        if !room.has_member(uid) {
            return Err(ChatError::NotMember {
                room: room_id.to_string(),
                user: uid.to_string(),
            });
        }
        Ok(room)
    }
}

fn messages_query(room_id: &str) -> Query {
    Query::collection(collections::messages(room_id)).order_by("createdAt", Direction::Ascending)
}

/// Live handle over one room's message log. Dropping it stops the listener.
pub struct RoomWatch {
    subscription: Subscription,
    viewer: UserId,
    notifier: DynNotifier,
    previous: Option<Vec<Message>>,
}

impl RoomWatch {
    /// Wait for the next state of the room. `None` once the store goes away.
    pub async fn next(&mut self) -> Option<Result<RoomUpdate, ChatError>> {
        let snapshot = self.subscription.next().await?;
        let messages: Vec<Message> = match snapshot.decode_all() {
            Ok(messages) => messages,
            Err(e) => return Some(Err(e.into())),
        };

        let incoming: Vec<Message> = match &self.previous {
            Some(previous) => timeline::incoming(previous, &messages, self.viewer.as_str())
                .into_iter()
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        if let Some(latest) = incoming.last() {
            deliver(
                self.notifier.as_ref(),
                Notification::local(INCOMING_TITLE, latest.text.clone()),
            )
            .await;
        }

        let unread_count = timeline::unread_count(&messages, self.viewer.as_str());
        self.previous = Some(messages.clone());

        Some(Ok(RoomUpdate {
            messages,
            incoming,
            unread_count,
        }))
    }

    pub fn cancel(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::notify::testing::RecordingNotifier;
    use crate::store::SqliteDocumentStore;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        chat: ChatService,
        store: DynDocumentStore,
        notifier: Arc<RecordingNotifier>,
        _temp: TempDir,
    }

    async fn create_harness() -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        let store: DynDocumentStore = Arc::new(SqliteDocumentStore::new(pool));
        let notifier = Arc::new(RecordingNotifier::default());

        store
            .set(
                collections::CHATS,
                "alice_bob",
                fields(json!({
                    "members": ["alice", "bob"],
                    "createdAt": server_timestamp(),
                    "lastMessage": "",
                    "lastMessageAt": server_timestamp(),
                })),
            )
            .await
            .unwrap();

        Harness {
            chat: ChatService::new(store.clone(), notifier.clone()),
            store,
            notifier,
            _temp: temp_dir,
        }
    }

    fn uid(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn test_send_appends_and_updates_room() {
        let h = create_harness().await;

        let sent = h.chat.send_message("alice_bob", &uid("alice"), "hi bob").await.unwrap();

        assert_eq!(sent.text, "hi bob");
        assert_eq!(sent.sender_id, "alice");
        assert!(sent.read_by.is_empty());

        let room: ChatRoom = h
            .store
            .get(collections::CHATS, "alice_bob")
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(room.last_message, "hi bob");
        // Separate commit, so strictly later than the message itself
        assert!(room.last_message_at.unwrap() > sent.created_at);
    }

    #[tokio::test]
    async fn test_blank_message_rejected() {
        let h = create_harness().await;

        let result = h.chat.send_message("alice_bob", &uid("alice"), "  \n ").await;

        assert!(matches!(result, Err(ChatError::EmptyMessage)));
        assert!(h.chat.messages("alice_bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outsider_cannot_send() {
        let h = create_harness().await;

        let result = h.chat.send_message("alice_bob", &uid("carol"), "hello").await;
        assert!(matches!(result, Err(ChatError::NotMember { .. })));

        let missing = h.chat.send_message("alice_carol", &uid("alice"), "hello").await;
        assert!(matches!(missing, Err(ChatError::RoomNotFound(_))));
    }

    #[tokio::test]
    async fn test_messages_are_ordered() {
        let h = create_harness().await;
        for text in ["one", "two", "three"] {
            h.chat.send_message("alice_bob", &uid("alice"), text).await.unwrap();
        }

        let texts: Vec<String> = h
            .chat
            .messages("alice_bob")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_unread_count_after_partial_read() {
        let h = create_harness().await;
        let mut ids = Vec::new();
        for i in 0..5 {
            let m = h
                .chat
                .send_message("alice_bob", &uid("bob"), &format!("msg {}", i))
                .await
                .unwrap();
            ids.push(m.id);
        }

        let log = collections::messages("alice_bob");
        for id in &ids[..2] {
            h.store
                .array_union(&log, id, "readBy", vec![json!("alice")])
                .await
                .unwrap();
        }

        assert_eq!(h.chat.unread_count("alice_bob", &uid("alice")).await.unwrap(), 3);
        assert_eq!(h.chat.unread_count("alice_bob", &uid("bob")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_read_is_monotonic() {
        let h = create_harness().await;
        h.chat.send_message("alice_bob", &uid("bob"), "hey").await.unwrap();
        h.chat.send_message("alice_bob", &uid("bob"), "you there?").await.unwrap();
        h.chat.send_message("alice_bob", &uid("alice"), "yes").await.unwrap();

        assert_eq!(h.chat.mark_read("alice_bob", &uid("alice")).await.unwrap(), 2);
        assert_eq!(h.chat.mark_read("alice_bob", &uid("alice")).await.unwrap(), 0);

        let messages = h.chat.messages("alice_bob").await.unwrap();
        assert_eq!(messages[0].read_by, vec!["alice"]);
        assert_eq!(messages[1].read_by, vec!["alice"]);
        // Own messages are never marked by their author
        assert!(messages[2].read_by.is_empty());
    }

    #[tokio::test]
    async fn test_list_rooms_summaries() {
        let h = create_harness().await;
        h.store
            .set(collections::USERS, "bob", fields(json!({ "name": "Bob" })))
            .await
            .unwrap();
        h.store
            .set(
                collections::CHATS,
                "alice_carol",
                fields(json!({
                    "members": ["carol", "alice"],
                    "createdAt": server_timestamp(),
                    "lastMessage": "",
                    "lastMessageAt": server_timestamp(),
                })),
            )
            .await
            .unwrap();
        h.chat.send_message("alice_bob", &uid("bob"), "hi alice").await.unwrap();

        let rooms = h.chat.list_rooms(&uid("alice")).await.unwrap();

        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].room_id, "alice_bob");
        assert_eq!(rooms[0].partner_id, "bob");
        assert_eq!(rooms[0].partner_name, "Bob");
        assert_eq!(rooms[0].last_message, "hi alice");
        assert_eq!(rooms[0].unread_count, 1);
        assert_eq!(rooms[1].partner_id, "carol");
        assert_eq!(rooms[1].partner_name, crate::users::UNKNOWN_USER_NAME);
        assert_eq!(rooms[1].unread_count, 0);

        assert!(h.chat.list_rooms(&uid("dave")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_watch_flags_incoming_messages() {
        let h = create_harness().await;
        h.chat.send_message("alice_bob", &uid("bob"), "earlier").await.unwrap();

        let mut watch = h.chat.watch("alice_bob", &uid("alice")).await.unwrap();
        let first = watch.next().await.unwrap().unwrap();
        assert_eq!(first.messages.len(), 1);
        assert!(first.incoming.is_empty());
        assert_eq!(first.unread_count, 1);

        h.chat.send_message("alice_bob", &uid("bob"), "new one").await.unwrap();

        let update = loop {
            let update = tokio::time::timeout(Duration::from_secs(2), watch.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if !update.incoming.is_empty() {
                break update;
            }
        };
        assert_eq!(update.incoming[0].text, "new one");

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "new one");
        assert!(sent[0].target_token.is_none());

        watch.cancel();
    }

    #[tokio::test]
    async fn test_own_messages_do_not_notify() {
        let h = create_harness().await;
        let mut watch = h.chat.watch("alice_bob", &uid("alice")).await.unwrap();
        watch.next().await.unwrap().unwrap();

        h.chat.send_message("alice_bob", &uid("alice"), "mine").await.unwrap();

        let update = tokio::time::timeout(Duration::from_secs(2), watch.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(update.incoming.is_empty());
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_timeline_groups_by_day() {
        let h = create_harness().await;
        let log = collections::messages("alice_bob");
        for (id, at) in [("m1", "2024-01-01T10:00:00.000000Z"), ("m2", "2024-01-02T09:00:00.000000Z")] {
            h.store
                .set(
                    &log,
                    id,
                    fields(json!({ "text": id, "senderId": "bob", "createdAt": at, "readBy": [] })),
                )
                .await
                .unwrap();
        }

        let items = h.chat.timeline("alice_bob", &Utc).await.unwrap();

        assert_eq!(items.len(), 4);
        assert_eq!(items.iter().filter(|i| i.is_separator()).count(), 2);
    }
}
