//! Admin send and per-user audit routes.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use courier_common::error::CourierError;
use courier_common::types::{NotificationEvent, NotificationType};
use courier_engine::ledger::EventLedger;
use courier_engine::pipeline::SendRequest;
use courier_engine::recipients::RecipientDirectory;
use courier_notifier::RenderedContent;

use crate::middleware::auth::AdminUser;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", post(send_notification))
        .route("/api/notifications/{user_id}", get(list_notifications))
}

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    /// Defaults to the user's address on file.
    pub recipient_address: Option<String>,
    pub payload: Option<serde_json::Value>,
    /// Pre-rendered content; skips the template catalogue.
    pub content: Option<RenderedContent>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// POST /api/notifications: Send one notification through the pipeline.
async fn send_notification(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<SendNotificationRequest>,
) -> Result<Json<NotificationEvent>, CourierError> {
    let recipient = state.services.stores.recipients.find(req.user_id).await?;

    let recipient_address = match req.recipient_address {
        Some(address) => address,
        None => recipient
            .as_ref()
            .map(|r| r.email.clone())
            .ok_or_else(|| {
                CourierError::NotFound(format!("No addressable recipient for user {}", req.user_id))
            })?,
    };

    let mut payload = req.payload.unwrap_or_else(|| serde_json::json!({}));
    if let Some(fields) = payload.as_object_mut()
        && !fields.contains_key("first_name")
        && let Some(first_name) = recipient.as_ref().and_then(|r| r.first_name.clone())
    {
        fields.insert("first_name".to_string(), first_name.into());
    }

    tracing::info!(
        admin_id = %admin.user_id,
        user_id = %req.user_id,
        notification_type = %req.notification_type,
        "Admin send requested"
    );

    let event = state
        .services
        .pipeline
        .send(SendRequest {
            user_id: req.user_id,
            recipient_address,
            notification_type: req.notification_type,
            content: req.content,
            payload,
        })
        .await?;

    Ok(Json(event))
}

/// GET /api/notifications/:user_id: Most recent ledger rows for a user.
async fn list_notifications(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<NotificationEvent>>, CourierError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(CourierError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_HISTORY_LIMIT
        )));
    }

    let events = state
        .services
        .stores
        .ledger
        .list_for_user(user_id, limit)
        .await?;
    Ok(Json(events))
}
