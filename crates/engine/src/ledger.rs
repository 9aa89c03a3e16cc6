//! Event ledger: durable record of every notification attempt.
//!
//! Every send goes `queued` → `sent` | `failed`, and terminal rows never move again.
//! For single-shot types the store enforces at most one non-failed row per
//! (user, type) through a partial unique index, so two racing inserts resolve to one
//! `Created` and one `Existing`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::{CourierError, CourierResult};
use courier_common::types::{
    DeliveryStatus, NewNotificationEvent, NotificationEvent, NotificationType,
};

/// Outcome of inserting a queued event.
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion {
    /// The row was written and the caller owns the delivery.
    Created(NotificationEvent),
    /// A non-failed single-shot event already exists for this (user, type).
    Existing(NotificationEvent),
}

#[async_trait]
pub trait EventLedger: Send + Sync {
    /// Any non-failed event for the pair. Used as the idempotency gate.
    async fn find_active_event(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
    ) -> CourierResult<Option<NotificationEvent>>;

    async fn create(&self, event: NewNotificationEvent) -> CourierResult<Insertion>;

    /// `queued` → `sent`. Fails with `NotFound` when the row is not queued.
    async fn mark_sent(&self, id: Uuid, external_message_id: &str) -> CourierResult<()>;

    /// `queued` → `failed`. Fails with `NotFound` when the row is not queued.
    async fn mark_failed(&self, id: Uuid, error: &str) -> CourierResult<()>;

    /// Creation time of the latest `sent` event for the pair.
    async fn last_sent_at(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
    ) -> CourierResult<Option<DateTime<Utc>>>;

    /// Most recent events for a user, newest first.
    async fn list_for_user(&self, user_id: Uuid, limit: i64)
    -> CourierResult<Vec<NotificationEvent>>;
}

/// PostgreSQL-backed ledger over `notification_events`.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn transition(
        &self,
        id: Uuid,
        to: DeliveryStatus,
        external_message_id: Option<&str>,
        error: Option<&str>,
    ) -> CourierResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE notification_events
            SET status = $2, external_message_id = $3, error = $4
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(id)
        .bind(to.to_string())
        .bind(external_message_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CourierError::NotFound(format!(
                "No queued notification event {}",
                id
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl EventLedger for PgLedger {
    async fn find_active_event(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
    ) -> CourierResult<Option<NotificationEvent>> {
        let event: Option<NotificationEvent> = sqlx::query_as(
            r#"
            SELECT * FROM notification_events
            WHERE user_id = $1 AND notification_type = $2 AND status <> 'failed'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(notification_type.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    async fn create(&self, event: NewNotificationEvent) -> CourierResult<Insertion> {
        let user_id = event.user_id;
        let notification_type = event.notification_type;
        let row = event.into_queued(Utc::now());

        // A conflict can only come from the single-shot index. The competing row may
        // flip to failed between our insert and lookup, so try twice.
        for _ in 0..2 {
            let inserted: Option<NotificationEvent> = sqlx::query_as(
                r#"
                INSERT INTO notification_events
                    (id, user_id, notification_type, status, recipient_address, subject, payload, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT DO NOTHING
                RETURNING *
                "#,
            )
            .bind(row.id)
            .bind(row.user_id)
            .bind(row.notification_type.to_string())
            .bind(row.status.to_string())
            .bind(&row.recipient_address)
            .bind(&row.subject)
            .bind(&row.payload)
            .bind(row.created_at)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(created) = inserted {
                return Ok(Insertion::Created(created));
            }

            if let Some(existing) = self.find_active_event(user_id, notification_type).await? {
                return Ok(Insertion::Existing(existing));
            }
        }

        Err(CourierError::Persistence(format!(
            "Could not insert {} event for user {}",
            notification_type, user_id
        )))
    }

    async fn mark_sent(&self, id: Uuid, external_message_id: &str) -> CourierResult<()> {
        self.transition(id, DeliveryStatus::Sent, Some(external_message_id), None)
            .await
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> CourierResult<()> {
        self.transition(id, DeliveryStatus::Failed, None, Some(error))
            .await
    }

    async fn last_sent_at(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
    ) -> CourierResult<Option<DateTime<Utc>>> {
        let row: Option<(Option<DateTime<Utc>>,)> = sqlx::query_as(
            r#"
            SELECT MAX(created_at) FROM notification_events
            WHERE user_id = $1 AND notification_type = $2 AND status = 'sent'
            "#,
        )
        .bind(user_id)
        .bind(notification_type.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|(at,)| at))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> CourierResult<Vec<NotificationEvent>> {
        let events: Vec<NotificationEvent> = sqlx::query_as(
            "SELECT * FROM notification_events WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}
