// Derived chat views: date grouping and unread counts. Nothing here is stored.
use chrono::{NaiveDate, TimeZone};
use serde::Serialize;

use crate::db::models::Message;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineItem {
    DateSeparator { key: String, date: NaiveDate },
    Message(Message),
}

impl TimelineItem {
    pub fn separator(date: NaiveDate) -> Self {
        Self::DateSeparator {
            key: format!("date-{}", date.format("%Y-%m-%d")),
            date,
        }
    }

    pub fn is_separator(&self) -> bool {
        matches!(self, Self::DateSeparator { .. })
    }
}

/// Interleave day separators into an ordered message list. A separator is
/// emitted before any message whose calendar date in `tz` differs from the
/// previous message's, including the first one.
pub fn group_by_date<Tz: TimeZone>(messages: &[Message], tz: &Tz) -> Vec<TimelineItem> {
    let mut items = Vec::with_capacity(messages.len() + 1);
    let mut last_date: Option<NaiveDate> = None;

    for message in messages {
        let date = message.created_at.with_timezone(tz).date_naive();
        if last_date != Some(date) {
            items.push(TimelineItem::separator(date));
            last_date = Some(date);
        }
        items.push(TimelineItem::Message(message.clone()));
    }

    items
}

pub fn unread_count(messages: &[Message], viewer: &str) -> usize {
    messages.iter().filter(|m| m.is_unread_for(viewer)).count()
}

/// Messages in `current` from someone other than `viewer` that were not in
/// `previous`. Used to raise incoming-message notifications.
pub fn incoming<'a>(previous: &[Message], current: &'a [Message], viewer: &str) -> Vec<&'a Message> {
    current
        .iter()
        .filter(|m| m.sender_id != viewer)
        .filter(|m| !previous.iter().any(|p| p.id == m.id))
        .collect()
}
