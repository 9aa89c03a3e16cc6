//! Admin bulk campaign route.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use courier_common::error::CourierError;
use courier_engine::bulk::{BulkContent, BulkOptions, BulkResult, DEFAULT_BATCH_SIZE, DEFAULT_DELAY_MS};
use courier_engine::recipients::RecipientDirectory;

use crate::middleware::auth::AdminUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/admin/bulk-email", post(send_bulk_email))
}

/// Missing `subject` or `html` reaches the dispatcher as empty and is rejected there.
#[derive(Debug, Deserialize)]
pub struct BulkEmailRequest {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    pub text: Option<String>,
    pub batch_size: Option<usize>,
    pub delay_ms: Option<u64>,
}

/// POST /api/admin/bulk-email: Send one campaign to every addressable user.
async fn send_bulk_email(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<BulkEmailRequest>,
) -> Result<Json<BulkResult>, CourierError> {
    let options = BulkOptions {
        batch_size: req.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        delay_ms: req.delay_ms.unwrap_or(DEFAULT_DELAY_MS),
    };
    let content = BulkContent {
        subject: req.subject.unwrap_or_default(),
        html: req.html.unwrap_or_default(),
        text: req.text,
    };

    // Reject bad input before touching the user table.
    options.validate()?;

    let recipients = state.services.stores.recipients.list_addressable().await?;

    tracing::info!(
        admin_id = %admin.user_id,
        recipients = recipients.len(),
        "Bulk email requested"
    );

    let result = state
        .services
        .bulk
        .dispatch(content, recipients, options)
        .await?;
    Ok(Json(result))
}
