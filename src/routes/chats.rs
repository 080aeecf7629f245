use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::chat::{RoomSummary, TimelineItem};
use crate::db::models::Message;
use crate::error::{AppError, AppResult};
use crate::extractors::Viewer;
use crate::state::AppState;

#[derive(Deserialize)]
struct SendMessage {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimelineQuery {
    /// Viewer's UTC offset; days are split on local midnight.
    #[serde(default)]
    tz_offset_minutes: i32,
}

#[derive(Serialize)]
struct Marked {
    marked: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Unread {
    unread_count: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chats", get(list_rooms))
        .route("/chats/{room}/messages", get(messages).post(send_message))
        .route("/chats/{room}/timeline", get(timeline))
        .route("/chats/{room}/read", post(mark_read))
        .route("/chats/{room}/unread", get(unread))
}

async fn list_rooms(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
) -> AppResult<Json<Vec<RoomSummary>>> {
    Ok(Json(state.chat.list_rooms(&viewer).await?))
}

async fn messages(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(room): Path<String>,
) -> AppResult<Json<Vec<Message>>> {
    state.chat.room_for_member(&room, viewer.as_str()).await?;
    Ok(Json(state.chat.messages(&room).await?))
}

async fn send_message(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(room): Path<String>,
    Json(body): Json<SendMessage>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let message = state.chat.send_message(&room, &viewer, &body.text).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn timeline(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(room): Path<String>,
    Query(query): Query<TimelineQuery>,
) -> AppResult<Json<Vec<TimelineItem>>> {
    let tz = query
        .tz_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| AppError::BadRequest("tzOffsetMinutes out of range".into()))?;

    state.chat.room_for_member(&room, viewer.as_str()).await?;
    Ok(Json(state.chat.timeline(&room, &tz).await?))
}

async fn mark_read(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(room): Path<String>,
) -> AppResult<Json<Marked>> {
    let marked = state.chat.mark_read(&room, &viewer).await?;
    Ok(Json(Marked { marked }))
}

async fn unread(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(room): Path<String>,
) -> AppResult<Json<Unread>> {
    state.chat.room_for_member(&room, viewer.as_str()).await?;
    let unread_count = state.chat.unread_count(&room, &viewer).await?;
    Ok(Json(Unread { unread_count }))
}
