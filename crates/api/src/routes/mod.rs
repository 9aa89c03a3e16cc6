pub mod activity;
pub mod bulk;
pub mod health;
pub mod jobs;
pub mod notifications;
pub mod schedules;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(notifications::router())
        .merge(schedules::router())
        .merge(activity::router())
        .merge(jobs::router())
        .merge(bulk::router())
        .with_state(state)
}
