//! Notification delivery engine: ledger, send pipeline, scheduler, re-engagement
//! policy and bulk dispatch, plus the stores they run on.

pub mod activity;
pub mod bulk;
pub mod cooldown;
pub mod ledger;
pub mod memory;
pub mod pipeline;
pub mod recipients;
pub mod reengage;
pub mod scheduler;
pub mod services;
