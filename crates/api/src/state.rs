//! Shared application state for the Axum API server.

use courier_common::config::AppConfig;
use courier_engine::services::NotificationServices;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub services: NotificationServices,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(services: NotificationServices, config: AppConfig) -> Self {
        Self { services, config }
    }
}
