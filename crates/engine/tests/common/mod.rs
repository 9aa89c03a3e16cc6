//! Shared fixtures for the engine's behavioural tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use courier_common::types::{
    ActivityRecord, DeliveryStatus, LOGIN_EVENT, NotificationEvent, NotificationType, Recipient,
};
use courier_engine::bulk::{BulkDispatcher, Pacer};
use courier_engine::memory::{MemoryCooldown, MemoryStore};
use courier_engine::reengage::ReengagementPolicy;
use courier_engine::services::{NotificationServices, Stores};
use courier_notifier::{BuiltinTemplates, DeliveryReceipt, OutboundEmail, Transport, TransportError};

/// Transport that records every call and fails on demand.
#[derive(Default)]
pub struct ScriptedTransport {
    calls: Mutex<Vec<OutboundEmail>>,
    always_fail: Mutex<HashSet<String>>,
    fail_next: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every delivery to `address` fails.
    pub fn fail_address(&self, address: &str) {
        self.always_fail.lock().unwrap().insert(address.to_string());
    }

    /// The next `n` deliveries fail, whatever the address.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<OutboundEmail> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, address: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.to == address)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn deliver(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, TransportError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(email.clone());
            calls.len()
        };

        // Yield so concurrent callers interleave the way they would on a real network.
        tokio::task::yield_now().await;

        if self.always_fail.lock().unwrap().contains(&email.to) {
            return Err(TransportError::Other(format!("mailbox unavailable: {}", email.to)));
        }

        let take_failure = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if take_failure {
            return Err(TransportError::Rejected {
                status: 503,
                message: "provider unavailable".to_string(),
            });
        }

        Ok(DeliveryReceipt {
            external_id: format!("msg-{}", n),
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Pacer that records requested pauses without sleeping.
#[derive(Default)]
pub struct RecordingPacer {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingPacer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }

    pub fn count_of(&self, duration: Duration) -> usize {
        self.pauses().into_iter().filter(|d| *d == duration).count()
    }
}

#[async_trait]
impl Pacer for RecordingPacer {
    async fn pause(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub transport: Arc<ScriptedTransport>,
    pub pacer: Arc<RecordingPacer>,
    pub services: NotificationServices,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let transport = ScriptedTransport::new();
    let pacer = RecordingPacer::new();

    let stores = Stores {
        ledger: store.clone(),
        schedules: store.clone(),
        activity: store.clone(),
        recipients: store.clone(),
        cooldown: Arc::new(MemoryCooldown::new()),
    };

    let services = NotificationServices::new(
        stores,
        Arc::new(BuiltinTemplates::new("https://rides.example.com").unwrap()),
        transport.clone(),
        BulkDispatcher::with_pacer(transport.clone(), pacer.clone()),
        ReengagementPolicy::default(),
    );

    Harness {
        store,
        transport,
        pacer,
        services,
    }
}

pub fn recipient(n: usize) -> Recipient {
    Recipient {
        user_id: Uuid::new_v4(),
        email: format!("rider{}@example.com", n),
        first_name: Some(format!("Rider{}", n)),
        last_name: Some("Test".to_string()),
    }
}

pub fn login(user_id: Uuid, at: DateTime<Utc>) -> ActivityRecord {
    ActivityRecord {
        user_id,
        event: LOGIN_EVENT.to_string(),
        metadata: serde_json::json!({}),
        occurred_at: at,
    }
}

/// A ledger row already in a terminal or queued state.
pub fn past_event(
    user_id: Uuid,
    notification_type: NotificationType,
    status: DeliveryStatus,
    created_at: DateTime<Utc>,
) -> NotificationEvent {
    NotificationEvent {
        id: Uuid::new_v4(),
        user_id,
        notification_type,
        status,
        recipient_address: "old@example.com".to_string(),
        subject: "Earlier".to_string(),
        payload: serde_json::json!({}),
        external_message_id: None,
        error: None,
        created_at,
    }
}
