use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};

use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::Viewer;
use crate::state::AppState;
use crate::users::ProfileInput;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/me", put(save_profile))
        .route("/users/{id}", get(get_user))
}

async fn save_profile(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Json(input): Json<ProfileInput>,
) -> AppResult<Json<User>> {
    Ok(Json(state.users.save_profile(&viewer, input).await?))
}

async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<User>> {
    let user = state
        .users
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User not found: {}", id)))?;
    Ok(Json(user))
}
