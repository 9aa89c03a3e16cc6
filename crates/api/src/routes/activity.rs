//! Activity recording. Logins posted here drive the re-engagement policy.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use courier_common::error::CourierError;
use courier_common::types::ActivityRecord;
use courier_engine::activity::ActivityLog;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/activity", post(record_activity))
}

#[derive(Debug, Deserialize)]
pub struct RecordActivityRequest {
    pub event: String,
    /// Admins may record on behalf of another user.
    pub user_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
}

/// POST /api/activity: Append one activity event for the caller.
async fn record_activity(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<RecordActivityRequest>,
) -> Result<StatusCode, CourierError> {
    let event = req.event.trim();
    if event.is_empty() {
        return Err(CourierError::Validation("event is required".to_string()));
    }

    let user_id = match req.user_id {
        Some(other) if other != auth.user_id && !auth.is_admin() => {
            return Err(CourierError::Forbidden(
                "Cannot record activity for another user".to_string(),
            ));
        }
        Some(other) => other,
        None => auth.user_id,
    };

    state
        .services
        .stores
        .activity
        .record(&ActivityRecord {
            user_id,
            event: event.to_string(),
            metadata: req.metadata.unwrap_or_else(|| serde_json::json!({})),
            occurred_at: Utc::now(),
        })
        .await?;

    tracing::debug!(user_id = %user_id, event, "Activity recorded");

    Ok(StatusCode::NO_CONTENT)
}
