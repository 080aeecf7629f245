use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;
use crate::users::UserId;

/// Header carrying the acting user's id. Session handling happens upstream.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The user on whose behalf a request acts.
/// Returns 400 when the header is missing or not a valid id.
#[derive(Debug, Clone)]
pub struct Viewer(pub UserId);

impl FromRequestParts<AppState> for Viewer {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AppError::BadRequest(format!("Missing {} header", USER_ID_HEADER)))?;

        Ok(Viewer(UserId::parse(raw.trim())?))
    }
}
