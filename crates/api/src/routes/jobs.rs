//! Cron-triggered job endpoints. Both are safe to call while a previous invocation
//! is still running.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use courier_common::error::CourierError;
use courier_engine::reengage::ReengagementSummary;
use courier_engine::scheduler::ProcessSummary;

use crate::middleware::auth::CronAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/jobs/process-due", post(process_due))
        .route("/api/jobs/reengagement", post(run_reengagement))
}

/// POST /api/jobs/process-due: One scheduler poll.
async fn process_due(
    State(state): State<AppState>,
    _cron: CronAuth,
) -> Result<Json<ProcessSummary>, CourierError> {
    let summary = state.services.scheduler.process_due().await?;
    Ok(Json(summary))
}

/// POST /api/jobs/reengagement: One re-engagement run.
async fn run_reengagement(
    State(state): State<AppState>,
    _cron: CronAuth,
) -> Result<Json<ReengagementSummary>, CourierError> {
    let summary = state.services.reengagement.run().await?;
    Ok(Json(summary))
}
