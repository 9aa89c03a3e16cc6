//! Recipient lookup over the application's users table.
//!
//! Only addressable users come back: a non-empty email and not suppressed.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::CourierResult;
use courier_common::types::Recipient;

#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn find(&self, user_id: Uuid) -> CourierResult<Option<Recipient>>;

    /// Every addressable user, for bulk campaigns.
    async fn list_addressable(&self) -> CourierResult<Vec<Recipient>>;
}

#[derive(Clone)]
pub struct PgRecipients {
    pool: PgPool,
}

impl PgRecipients {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipientDirectory for PgRecipients {
    async fn find(&self, user_id: Uuid) -> CourierResult<Option<Recipient>> {
        let recipient: Option<Recipient> = sqlx::query_as(
            r#"
            SELECT id AS user_id, email, first_name, last_name
            FROM users
            WHERE id = $1
              AND email IS NOT NULL AND email <> ''
              AND email_suppressed = false
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(recipient)
    }

    async fn list_addressable(&self) -> CourierResult<Vec<Recipient>> {
        let recipients: Vec<Recipient> = sqlx::query_as(
            r#"
            SELECT id AS user_id, email, first_name, last_name
            FROM users
            WHERE email IS NOT NULL AND email <> ''
              AND email_suppressed = false
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(recipients)
    }
}
