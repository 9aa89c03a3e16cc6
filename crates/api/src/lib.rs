//! HTTP surface for the notification subsystem: admin sends and audit, scheduling,
//! activity recording, cron-triggered jobs and bulk campaigns.

pub mod middleware;
pub mod routes;
pub mod state;
