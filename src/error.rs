use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::chat::ChatError;
use crate::matching::MatchError;
use crate::moderation::ModerationError;
use crate::store::StoreError;
use crate::users::{InvalidUserId, UserError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => AppError::NotFound(e.to_string()),
            other => AppError::Store(other),
        }
    }
}

impl From<InvalidUserId> for AppError {
    fn from(e: InvalidUserId) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<UserError> for AppError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::InvalidProfile(_) => AppError::BadRequest(e.to_string()),
            UserError::Store(e) => e.into(),
        }
    }
}

impl From<MatchError> for AppError {
    fn from(e: MatchError) -> Self {
        match e {
            MatchError::SelfLike => AppError::BadRequest(e.to_string()),
            MatchError::Store(e) => e.into(),
        }
    }
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::EmptyMessage => AppError::BadRequest(e.to_string()),
            ChatError::RoomNotFound(_) => AppError::NotFound(e.to_string()),
            ChatError::NotMember { .. } => AppError::Forbidden(e.to_string()),
            ChatError::Store(e) => e.into(),
        }
    }
}

impl From<ModerationError> for AppError {
    fn from(e: ModerationError) -> Self {
        match e {
            ModerationError::SelfReport | ModerationError::UnknownStatus(_) => {
                AppError::BadRequest(e.to_string())
            }
            ModerationError::ReportNotFound(_)
            | ModerationError::UserNotFound(_)
            | ModerationError::NotificationNotFound(_) => AppError::NotFound(e.to_string()),
            ModerationError::InvalidTransition { .. } => AppError::Conflict(e.to_string()),
            ModerationError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Store(e) => {
                tracing::error!("Store error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, message).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
