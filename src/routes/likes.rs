use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::error::AppResult;
use crate::extractors::Viewer;
use crate::matching::{LikeOutcome, LikeProfile};
use crate::state::AppState;
use crate::users::UserId;

#[derive(Serialize)]
struct Removed {
    removed: bool,
}

#[derive(Serialize)]
struct Matched {
    matched: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/likes/{to}", post(like))
        .route("/likes/received", get(received))
        .route("/likes/received/{from}", delete(decline))
        .route("/likes/sent", get(sent))
        .route("/matches/{other}", get(is_matched))
}

async fn like(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(to): Path<String>,
) -> AppResult<Json<LikeOutcome>> {
    let to = UserId::parse(to)?;
    // The engine falls back to a generic name when this is empty
    let from_name = state
        .users
        .get(viewer.as_str())
        .await?
        .map(|u| u.name)
        .unwrap_or_default();

    Ok(Json(state.matching.like(&viewer, &to, &from_name).await?))
}

/// Decline a like the viewer received from `from`.
async fn decline(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(from): Path<String>,
) -> AppResult<Json<Removed>> {
    let from = UserId::parse(from)?;
    let removed = state.matching.cancel_like(&viewer, &from).await?;
    Ok(Json(Removed { removed }))
}

async fn received(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
) -> AppResult<Json<Vec<LikeProfile>>> {
    Ok(Json(state.matching.received_likes(&viewer).await?))
}

async fn sent(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
) -> AppResult<Json<Vec<LikeProfile>>> {
    Ok(Json(state.matching.sent_likes(&viewer).await?))
}

async fn is_matched(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(other): Path<String>,
) -> AppResult<Json<Matched>> {
    let other = UserId::parse(other)?;
    let matched = state.matching.is_matched(&viewer, &other).await?;
    Ok(Json(Matched { matched }))
}
