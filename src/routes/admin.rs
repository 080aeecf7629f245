use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::db::models::{AdminNotification, Report, User};
use crate::error::AppResult;
use crate::extractors::Viewer;
use crate::moderation::{AutoBanOutcome, DashboardStats, ReportDetail, ReportStatus};
use crate::state::AppState;
use crate::users::UserId;

// --- Request / response bodies ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileReport {
    reported_user_id: String,
    #[serde(default)]
    reason: String,
}

#[derive(Deserialize)]
struct SuspendRequest {
    #[serde(default)]
    reason: String,
}

#[derive(Deserialize)]
struct ReportFilter {
    status: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Feed {
    unread_count: usize,
    items: Vec<AdminNotification>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reports", post(file_report))
        .route("/admin/dashboard", get(dashboard))
        .route("/admin/reports", get(list_reports))
        .route("/admin/reports/{id}", get(report_detail))
        .route("/admin/reports/{id}/approve", post(approve))
        .route("/admin/reports/{id}/reject", post(reject))
        .route("/admin/reports/{id}/ban", post(ban))
        .route("/admin/users/suspended", get(suspended_users))
        .route("/admin/users/{id}/suspend", post(report_and_suspend))
        .route("/admin/users/{id}/unsuspend", post(unsuspend))
        .route("/admin/notifications", get(notifications))
        .route("/admin/notifications/{id}/read", post(mark_notification_read))
        .route("/admin/alerts", get(alerts))
}

// --- Reporting (any user) ---

async fn file_report(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Json(body): Json<FileReport>,
) -> AppResult<(StatusCode, Json<Report>)> {
    let reported = UserId::parse(body.reported_user_id)?;
    let report = state
        .moderation
        .file_report(&viewer, &reported, &body.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

// --- Review ---

async fn dashboard(State(state): State<AppState>) -> AppResult<Json<DashboardStats>> {
    Ok(Json(state.moderation.dashboard().await?))
}

async fn list_reports(
    State(state): State<AppState>,
    Query(filter): Query<ReportFilter>,
) -> AppResult<Json<Vec<Report>>> {
    let status = filter
        .status
        .as_deref()
        .map(str::parse::<ReportStatus>)
        .transpose()?;
    Ok(Json(state.moderation.list_reports(status).await?))
}

async fn report_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ReportDetail>> {
    Ok(Json(state.moderation.report_detail(&id).await?))
}

async fn approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<AutoBanOutcome>> {
    Ok(Json(state.moderation.approve_report(&id).await?))
}

async fn reject(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Report>> {
    Ok(Json(state.moderation.reject_report(&id).await?))
}

async fn ban(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Report>> {
    Ok(Json(state.moderation.ban_user(&id).await?))
}

// --- Suspensions ---

async fn suspended_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.moderation.suspended_users().await?))
}

async fn report_and_suspend(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
    Json(body): Json<SuspendRequest>,
) -> AppResult<(StatusCode, Json<Report>)> {
    let user_id = UserId::parse(id)?;
    let report = state
        .moderation
        .report_and_suspend(&viewer, &user_id, &body.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn unsuspend(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<User>> {
    let user_id = UserId::parse(id)?;
    Ok(Json(state.moderation.unsuspend(&user_id).await?))
}

// --- Notification feed ---

async fn notifications(State(state): State<AppState>) -> AppResult<Json<Feed>> {
    let items = state.feed.list().await?;
    let unread_count = items.iter().filter(|n| !n.read).count();
    Ok(Json(Feed {
        unread_count,
        items,
    }))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.feed.mark_read(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// SSE stream of new reports for admin sessions that are online.
async fn alerts(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.alerts.subscribe()).filter_map(|alert| match alert {
        Ok(alert) => Event::default()
            .event("report")
            .json_data(alert)
            .ok()
            .map(Ok::<_, Infallible>),
        Err(e) => {
            tracing::debug!("Admin alert stream lagged: {}", e);
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
