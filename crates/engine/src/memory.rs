//! In-process implementations of the store traits.
//!
//! Backs the behavioural tests of the engine, the API and the worker without
//! Postgres/Redis.
//! A single mutex guards everything, which makes each trait call atomic the same way
//! a single-row statement is atomic in the database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use courier_common::error::{CourierError, CourierResult};
use courier_common::types::{
    ActivityRecord, DeliveryStatus, NewNotificationEvent, NotificationEvent, NotificationType,
    Recipient, ScheduledNotification,
};

use crate::activity::ActivityLog;
use crate::cooldown::CooldownGuard;
use crate::ledger::{EventLedger, Insertion};
use crate::recipients::RecipientDirectory;
use crate::scheduler::ScheduleStore;

#[derive(Debug, Clone)]
struct ScheduleRow {
    scheduled: ScheduledNotification,
    claimed_by: Option<Uuid>,
    claimed_until: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    events: Vec<NotificationEvent>,
    schedules: Vec<ScheduleRow>,
    activity: Vec<ActivityRecord>,
    recipients: HashMap<Uuid, Recipient>,
    suppressed: Vec<Uuid>,
}

impl Inner {
    fn active_event(&self, user_id: Uuid, t: NotificationType) -> Option<&NotificationEvent> {
        self.events.iter().find(|e| {
            e.user_id == user_id && e.notification_type == t && e.status != DeliveryStatus::Failed
        })
    }

    fn transition(
        &mut self,
        id: Uuid,
        to: DeliveryStatus,
        external_message_id: Option<&str>,
        error: Option<&str>,
    ) -> CourierResult<()> {
        let event = self
            .events
            .iter_mut()
            .find(|e| e.id == id && e.status == DeliveryStatus::Queued)
            .ok_or_else(|| CourierError::NotFound(format!("No queued notification event {}", id)))?;

        event.status = to;
        event.external_message_id = external_message_id.map(String::from);
        event.error = error.map(String::from);
        Ok(())
    }
}

/// Ledger, schedule store, activity log and recipient directory in one place.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_recipient(&self, recipient: Recipient) {
        self.inner
            .lock()
            .await
            .recipients
            .insert(recipient.user_id, recipient);
    }

    /// Keep the user but stop treating them as addressable.
    pub async fn suppress(&self, user_id: Uuid) {
        self.inner.lock().await.suppressed.push(user_id);
    }

    /// Seed a ledger row as-is, e.g. a past send.
    pub async fn insert_event(&self, event: NotificationEvent) {
        self.inner.lock().await.events.push(event);
    }

    /// Seed a schedule row without the future-date check.
    pub async fn insert_schedule(&self, scheduled: ScheduledNotification) {
        self.inner.lock().await.schedules.push(ScheduleRow {
            scheduled,
            claimed_by: None,
            claimed_until: None,
        });
    }

    pub async fn events(&self) -> Vec<NotificationEvent> {
        self.inner.lock().await.events.clone()
    }

    pub async fn schedules(&self) -> Vec<ScheduledNotification> {
        self.inner
            .lock()
            .await
            .schedules
            .iter()
            .map(|r| r.scheduled.clone())
            .collect()
    }
}

#[async_trait]
impl EventLedger for MemoryStore {
    async fn find_active_event(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
    ) -> CourierResult<Option<NotificationEvent>> {
        Ok(self
            .inner
            .lock()
            .await
            .active_event(user_id, notification_type)
            .cloned())
    }

    async fn create(&self, event: NewNotificationEvent) -> CourierResult<Insertion> {
        let mut inner = self.inner.lock().await;

        if event.notification_type.is_single_shot()
            && let Some(existing) = inner.active_event(event.user_id, event.notification_type)
        {
            return Ok(Insertion::Existing(existing.clone()));
        }

        let row = event.into_queued(Utc::now());
        inner.events.push(row.clone());
        Ok(Insertion::Created(row))
    }

    async fn mark_sent(&self, id: Uuid, external_message_id: &str) -> CourierResult<()> {
        self.inner
            .lock()
            .await
            .transition(id, DeliveryStatus::Sent, Some(external_message_id), None)
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> CourierResult<()> {
        self.inner
            .lock()
            .await
            .transition(id, DeliveryStatus::Failed, None, Some(error))
    }

    async fn last_sent_at(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
    ) -> CourierResult<Option<DateTime<Utc>>> {
        Ok(self
            .inner
            .lock()
            .await
            .events
            .iter()
            .filter(|e| {
                e.user_id == user_id
                    && e.notification_type == notification_type
                    && e.status == DeliveryStatus::Sent
            })
            .map(|e| e.created_at)
            .max())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> CourierResult<Vec<NotificationEvent>> {
        let inner = self.inner.lock().await;
        let mut events: Vec<NotificationEvent> = inner
            .events
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(limit.max(0) as usize);
        Ok(events)
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn insert(&self, scheduled: &ScheduledNotification) -> CourierResult<()> {
        self.insert_schedule(scheduled.clone()).await;
        Ok(())
    }

    async fn claim_due(
        &self,
        claim_id: Uuid,
        now: DateTime<Utc>,
        lease: Duration,
        limit: usize,
    ) -> CourierResult<Vec<ScheduledNotification>> {
        let mut inner = self.inner.lock().await;
        let mut due: Vec<&mut ScheduleRow> = inner
            .schedules
            .iter_mut()
            .filter(|r| r.scheduled.run_after <= now && r.claimed_until.is_none_or(|c| c < now))
            .collect();
        due.sort_by_key(|r| r.scheduled.run_after);

        Ok(due
            .into_iter()
            .take(limit)
            .map(|r| {
                r.claimed_by = Some(claim_id);
                r.claimed_until = Some(now + lease);
                r.scheduled.clone()
            })
            .collect())
    }

    async fn renew(&self, id: Uuid, claim_id: Uuid, until: DateTime<Utc>) -> CourierResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner
            .schedules
            .iter_mut()
            .find(|r| r.scheduled.id == id && r.claimed_by == Some(claim_id))
        {
            Some(row) => {
                row.claimed_until = Some(until);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release(&self, id: Uuid) -> CourierResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(row) = inner.schedules.iter_mut().find(|r| r.scheduled.id == id) {
            row.claimed_by = None;
            row.claimed_until = None;
        }
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> CourierResult<()> {
        self.inner
            .lock()
            .await
            .schedules
            .retain(|r| r.scheduled.id != id);
        Ok(())
    }
}

#[async_trait]
impl ActivityLog for MemoryStore {
    async fn record(&self, record: &ActivityRecord) -> CourierResult<()> {
        self.inner.lock().await.activity.push(record.clone());
        Ok(())
    }

    async fn last_seen_before(
        &self,
        event: &str,
        cutoff: DateTime<Utc>,
    ) -> CourierResult<Vec<(Uuid, DateTime<Utc>)>> {
        let inner = self.inner.lock().await;
        let mut latest: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        for record in inner.activity.iter().filter(|r| r.event == event) {
            latest
                .entry(record.user_id)
                .and_modify(|at| *at = (*at).max(record.occurred_at))
                .or_insert(record.occurred_at);
        }

        let mut rows: Vec<(Uuid, DateTime<Utc>)> =
            latest.into_iter().filter(|(_, at)| *at <= cutoff).collect();
        rows.sort_by_key(|(_, at)| *at);
        Ok(rows)
    }
}

#[async_trait]
impl RecipientDirectory for MemoryStore {
    async fn find(&self, user_id: Uuid) -> CourierResult<Option<Recipient>> {
        let inner = self.inner.lock().await;
        if inner.suppressed.contains(&user_id) {
            return Ok(None);
        }
        Ok(inner
            .recipients
            .get(&user_id)
            .filter(|r| !r.email.trim().is_empty())
            .cloned())
    }

    async fn list_addressable(&self) -> CourierResult<Vec<Recipient>> {
        let inner = self.inner.lock().await;
        let mut recipients: Vec<Recipient> = inner
            .recipients
            .values()
            .filter(|r| !r.email.trim().is_empty() && !inner.suppressed.contains(&r.user_id))
            .cloned()
            .collect();
        recipients.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(recipients)
    }
}

/// Process-local cooldown claims with expiry.
#[derive(Default)]
pub struct MemoryCooldown {
    claims: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryCooldown {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CooldownGuard for MemoryCooldown {
    async fn try_claim(
        &self,
        notification_type: NotificationType,
        user_id: Uuid,
        ttl: Duration,
    ) -> CourierResult<bool> {
        let now = Utc::now();
        let key = format!("{}:{}", notification_type, user_id);
        let mut claims = self.claims.lock().await;

        if claims.get(&key).is_some_and(|expires| *expires > now) {
            return Ok(false);
        }

        claims.insert(key, now + ttl);
        Ok(true)
    }

    async fn clear(
        &self,
        notification_type: NotificationType,
        user_id: Uuid,
    ) -> CourierResult<()> {
        self.claims
            .lock()
            .await
            .remove(&format!("{}:{}", notification_type, user_id));
        Ok(())
    }
}
