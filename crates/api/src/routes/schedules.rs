//! Scheduling routes for deferred notifications.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use courier_common::error::CourierError;
use courier_common::types::{NotificationType, ScheduledNotification};

use crate::middleware::auth::AdminUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/schedules", post(create_schedule))
        .route("/api/schedules/nurture", post(schedule_nurture))
        .route("/api/schedules/meeting-reminder", post(schedule_meeting_reminder))
}

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub run_after: DateTime<Utc>,
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct NurtureRequest {
    pub user_id: Uuid,
    /// Defaults to now.
    pub signup_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct MeetingReminderRequest {
    pub user_id: Uuid,
    pub meeting_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub location: Option<String>,
}

/// POST /api/schedules: Persist one future-dated notification.
async fn create_schedule(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduledNotification>), CourierError> {
    let scheduled = state
        .services
        .scheduler
        .schedule(
            req.user_id,
            req.notification_type,
            req.run_after,
            req.payload.unwrap_or_else(|| serde_json::json!({})),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(scheduled)))
}

/// POST /api/schedules/nurture: Queue the post-signup nurture sequence.
async fn schedule_nurture(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<NurtureRequest>,
) -> Result<(StatusCode, Json<Vec<ScheduledNotification>>), CourierError> {
    let signup_at = req.signup_at.unwrap_or_else(Utc::now);
    let steps = state
        .services
        .scheduler
        .schedule_nurture(req.user_id, signup_at)
        .await?;
    Ok((StatusCode::CREATED, Json(steps)))
}

/// POST /api/schedules/meeting-reminder: Remind a rider the day before a meetup.
async fn schedule_meeting_reminder(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<MeetingReminderRequest>,
) -> Result<(StatusCode, Json<ScheduledNotification>), CourierError> {
    let reminder = state
        .services
        .scheduler
        .schedule_meeting_reminder(
            req.user_id,
            req.meeting_id,
            req.starts_at,
            req.location.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(reminder)))
}
