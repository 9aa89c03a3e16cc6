//! Append-only activity log (logins and other lifecycle events).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::CourierResult;
use courier_common::types::ActivityRecord;

#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn record(&self, record: &ActivityRecord) -> CourierResult<()>;

    /// Users whose most recent `event` happened at or before `cutoff`, with that time.
    /// Users with no such event are not returned.
    async fn last_seen_before(
        &self,
        event: &str,
        cutoff: DateTime<Utc>,
    ) -> CourierResult<Vec<(Uuid, DateTime<Utc>)>>;
}

#[derive(Clone)]
pub struct PgActivityLog {
    pool: PgPool,
}

impl PgActivityLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityLog for PgActivityLog {
    async fn record(&self, record: &ActivityRecord) -> CourierResult<()> {
        sqlx::query(
            "INSERT INTO activity_log (user_id, event, metadata, occurred_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(record.user_id)
        .bind(&record.event)
        .bind(&record.metadata)
        .bind(record.occurred_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn last_seen_before(
        &self,
        event: &str,
        cutoff: DateTime<Utc>,
    ) -> CourierResult<Vec<(Uuid, DateTime<Utc>)>> {
        let rows: Vec<(Uuid, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT user_id, MAX(occurred_at) AS last_at
            FROM activity_log
            WHERE event = $1
            GROUP BY user_id
            HAVING MAX(occurred_at) <= $2
            ORDER BY last_at ASC
            "#,
        )
        .bind(event)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
