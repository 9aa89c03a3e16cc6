//! Scheduler: stores future-dated notification intents and promotes due ones.
//!
//! A poll claims a bounded batch of due rows under a short lease tagged with its own
//! claim id. Before each send the lease is renewed under that id; a row another poll
//! has since taken over is skipped. The row is deleted only after a successful send.
//! Failures release the lease and leave the row for the next poll, so nothing is
//! dropped (at-least-once).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::{CourierError, CourierResult};
use courier_common::types::{NotificationType, ScheduledNotification};

use crate::pipeline::{SendPipeline, SendRequest};
use crate::recipients::RecipientDirectory;

/// How long a claimed or renewed row stays owned by its poll.
const CLAIM_LEASE_SECONDS: i64 = 300;

/// Rows claimed per poll. The rest wait for the next tick.
pub const CLAIM_BATCH_SIZE: usize = 25;

/// Days after signup for each nurture step.
const NURTURE_INTRO_DELAY_DAYS: i64 = 1;
const NURTURE_FOLLOWUP_DELAY_DAYS: i64 = 3;

/// How long before a meeting the reminder goes out.
const MEETING_REMINDER_LEAD_HOURS: i64 = 24;

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn insert(&self, scheduled: &ScheduledNotification) -> CourierResult<()>;

    /// Atomically lease up to `limit` unclaimed rows with `run_after <= now`, oldest
    /// first, to `claim_id` until `now + lease`.
    async fn claim_due(
        &self,
        claim_id: Uuid,
        now: DateTime<Utc>,
        lease: Duration,
        limit: usize,
    ) -> CourierResult<Vec<ScheduledNotification>>;

    /// Extend the lease to `until` if `claim_id` still holds the row.
    /// Returns false when the row is gone or another claim took it over.
    async fn renew(&self, id: Uuid, claim_id: Uuid, until: DateTime<Utc>) -> CourierResult<bool>;

    /// Give a claimed row back for the next poll.
    async fn release(&self, id: Uuid) -> CourierResult<()>;

    async fn remove(&self, id: Uuid) -> CourierResult<()>;
}

#[derive(Clone)]
pub struct PgScheduleStore {
    pool: PgPool,
}

impl PgScheduleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleStore for PgScheduleStore {
    async fn insert(&self, scheduled: &ScheduledNotification) -> CourierResult<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_notifications (id, user_id, notification_type, run_after, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(scheduled.id)
        .bind(scheduled.user_id)
        .bind(scheduled.notification_type.to_string())
        .bind(scheduled.run_after)
        .bind(&scheduled.payload)
        .bind(scheduled.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim_due(
        &self,
        claim_id: Uuid,
        now: DateTime<Utc>,
        lease: Duration,
        limit: usize,
    ) -> CourierResult<Vec<ScheduledNotification>> {
        let mut rows: Vec<ScheduledNotification> = sqlx::query_as(
            r#"
            UPDATE scheduled_notifications
            SET claimed_by = $1, claimed_until = $3
            WHERE id IN (
                SELECT id FROM scheduled_notifications
                WHERE run_after <= $2
                  AND (claimed_until IS NULL OR claimed_until < $2)
                ORDER BY run_after ASC
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, user_id, notification_type, run_after, payload, created_at
            "#,
        )
        .bind(claim_id)
        .bind(now)
        .bind(now + lease)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.sort_by_key(|r| r.run_after);
        Ok(rows)
    }

    async fn renew(&self, id: Uuid, claim_id: Uuid, until: DateTime<Utc>) -> CourierResult<bool> {
        let result = sqlx::query(
            "UPDATE scheduled_notifications SET claimed_until = $3 WHERE id = $1 AND claimed_by = $2",
        )
        .bind(id)
        .bind(claim_id)
        .bind(until)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, id: Uuid) -> CourierResult<()> {
        sqlx::query(
            "UPDATE scheduled_notifications SET claimed_by = NULL, claimed_until = NULL WHERE id = $1",
        )
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> CourierResult<()> {
        sqlx::query("DELETE FROM scheduled_notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Per-row failure inside a poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleFailure {
    pub id: Uuid,
    pub message: String,
}

/// Result of one `process_due` poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessSummary {
    pub processed: usize,
    pub errors: Vec<ScheduleFailure>,
}

pub struct Scheduler {
    store: Arc<dyn ScheduleStore>,
    recipients: Arc<dyn RecipientDirectory>,
    pipeline: Arc<SendPipeline>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        recipients: Arc<dyn RecipientDirectory>,
        pipeline: Arc<SendPipeline>,
    ) -> Self {
        Self {
            store,
            recipients,
            pipeline,
        }
    }

    /// Persist a deferred notification. `run_after` must be strictly in the future and
    /// the type must have a template, since a due row is sent without explicit content.
    pub async fn schedule(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
        run_after: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> CourierResult<ScheduledNotification> {
        let now = Utc::now();
        if run_after <= now {
            return Err(CourierError::Validation(format!(
                "run_after {} must be in the future",
                run_after.to_rfc3339()
            )));
        }

        if !self.pipeline.has_template(notification_type) {
            return Err(CourierError::Validation(format!(
                "{} has no template and cannot be scheduled",
                notification_type
            )));
        }

        if !payload.is_object() {
            return Err(CourierError::Validation(
                "payload must be a JSON object".to_string(),
            ));
        }

        let scheduled = ScheduledNotification {
            id: Uuid::new_v4(),
            user_id,
            notification_type,
            run_after,
            payload,
            created_at: now,
        };

        self.store.insert(&scheduled).await?;

        tracing::info!(
            schedule_id = %scheduled.id,
            user_id = %user_id,
            notification_type = %notification_type,
            run_after = %run_after.to_rfc3339(),
            "Notification scheduled"
        );

        Ok(scheduled)
    }

    /// Queue both nurture steps relative to the signup time.
    pub async fn schedule_nurture(
        &self,
        user_id: Uuid,
        signup_at: DateTime<Utc>,
    ) -> CourierResult<Vec<ScheduledNotification>> {
        let steps = [
            (
                NotificationType::NurtureIntro,
                Duration::days(NURTURE_INTRO_DELAY_DAYS),
            ),
            (
                NotificationType::NurtureFollowup,
                Duration::days(NURTURE_FOLLOWUP_DELAY_DAYS),
            ),
        ];

        let mut scheduled = Vec::with_capacity(steps.len());
        for (notification_type, delay) in steps {
            scheduled.push(
                self.schedule(
                    user_id,
                    notification_type,
                    signup_at + delay,
                    serde_json::json!({}),
                )
                .await?,
            );
        }

        Ok(scheduled)
    }

    /// Remind a rider one day before a meetup. The caller creates this once per
    /// (meeting, user); reminders are not single-shot.
    pub async fn schedule_meeting_reminder(
        &self,
        user_id: Uuid,
        meeting_id: Uuid,
        starts_at: DateTime<Utc>,
        location: Option<&str>,
    ) -> CourierResult<ScheduledNotification> {
        let payload = serde_json::json!({
            "meeting_id": meeting_id,
            "starts_at": starts_at.format("%A %B %-d, %H:%M UTC").to_string(),
            "location": location,
        });

        self.schedule(
            user_id,
            NotificationType::MeetingReminder,
            starts_at - Duration::hours(MEETING_REMINDER_LEAD_HOURS),
            payload,
        )
        .await
    }

    /// One poll cycle over at most `CLAIM_BATCH_SIZE` due rows.
    /// Only a failure to claim rows aborts the poll.
    pub async fn process_due(&self) -> CourierResult<ProcessSummary> {
        let claim_id = Uuid::new_v4();
        let lease = Duration::seconds(CLAIM_LEASE_SECONDS);
        let due = self
            .store
            .claim_due(claim_id, Utc::now(), lease, CLAIM_BATCH_SIZE)
            .await?;

        let mut summary = ProcessSummary::default();
        if due.is_empty() {
            return Ok(summary);
        }

        tracing::info!(count = due.len(), "Processing due scheduled notifications");

        for row in due {
            match self.store.renew(row.id, claim_id, Utc::now() + lease).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(
                        schedule_id = %row.id,
                        "Lease lost to another poll, skipping"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::warn!(schedule_id = %row.id, error = %e, "Failed to renew lease, skipping");
                    continue;
                }
            }

            match self.deliver(&row).await {
                Ok(()) => {
                    summary.processed += 1;
                    if let Err(e) = self.store.remove(row.id).await {
                        tracing::error!(
                            schedule_id = %row.id,
                            error = %e,
                            "Delivered but failed to remove schedule row"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        schedule_id = %row.id,
                        user_id = %row.user_id,
                        error = %e,
                        "Scheduled notification failed, will retry next poll"
                    );
                    if let Err(release_err) = self.store.release(row.id).await {
                        tracing::error!(
                            schedule_id = %row.id,
                            error = %release_err,
                            "Failed to release schedule claim"
                        );
                    }
                    summary.errors.push(ScheduleFailure {
                        id: row.id,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(summary)
    }

    async fn deliver(&self, row: &ScheduledNotification) -> CourierResult<()> {
        let recipient = self.recipients.find(row.user_id).await?.ok_or_else(|| {
            CourierError::NotFound(format!("No addressable recipient for user {}", row.user_id))
        })?;

        let mut payload = row.payload.clone();
        if let Some(map) = payload.as_object_mut()
            && let Some(first_name) = &recipient.first_name
        {
            map.entry("first_name")
                .or_insert_with(|| serde_json::Value::String(first_name.clone()));
        }

        self.pipeline
            .send(SendRequest {
                user_id: row.user_id,
                recipient_address: recipient.email,
                notification_type: row.notification_type,
                content: None,
                payload,
            })
            .await?;

        Ok(())
    }
}
