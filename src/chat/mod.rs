pub mod service;
pub mod timeline;

pub use service::{ChatError, ChatService, RoomSummary, RoomUpdate, RoomWatch};
pub use timeline::{group_by_date, unread_count, TimelineItem};
