//! Cooldown guard: Redis-backed per-user claim for recurring campaigns.
//!
//! The ledger decides whether a user is out of cooldown. Two overlapping runs can both
//! read the ledger before either records a send, so the run also has to win a claim
//! here before sending. The claim outlives the run for the full cooldown window and is
//! cleared if the send fails.
//!
//! Uses Redis `SET NX EX` for atomic check-and-set with automatic TTL expiry.

use async_trait::async_trait;
use chrono::Duration;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use courier_common::error::CourierResult;
use courier_common::types::NotificationType;

#[async_trait]
pub trait CooldownGuard: Send + Sync {
    /// Returns `true` when the claim was taken (send may proceed),
    /// `false` when another claim is live.
    async fn try_claim(
        &self,
        notification_type: NotificationType,
        user_id: Uuid,
        ttl: Duration,
    ) -> CourierResult<bool>;

    async fn clear(&self, notification_type: NotificationType, user_id: Uuid)
    -> CourierResult<()>;
}

pub struct RedisCooldown {
    redis: ConnectionManager,
}

impl RedisCooldown {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn key(notification_type: NotificationType, user_id: Uuid) -> String {
        format!("cooldown:{}:{}", notification_type, user_id)
    }

    /// Redis rejects a zero TTL.
    fn ttl_seconds(ttl: Duration) -> u64 {
        ttl.num_seconds().max(1) as u64
    }
}

#[async_trait]
impl CooldownGuard for RedisCooldown {
    async fn try_claim(
        &self,
        notification_type: NotificationType,
        user_id: Uuid,
        ttl: Duration,
    ) -> CourierResult<bool> {
        let key = Self::key(notification_type, user_id);
        let ttl_secs = Self::ttl_seconds(ttl);
        let mut conn = self.redis.clone();

        // SET key "1" NX EX ttl
        // Some("OK") → claimed, None → key already exists
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;

        let claimed = result.is_some();

        if !claimed {
            tracing::debug!(
                user_id = %user_id,
                notification_type = %notification_type,
                ttl_secs,
                "Send suppressed: cooldown claim held elsewhere"
            );
        }

        Ok(claimed)
    }

    async fn clear(
        &self,
        notification_type: NotificationType,
        user_id: Uuid,
    ) -> CourierResult<()> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(Self::key(notification_type, user_id))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let user_id = Uuid::nil();
        assert_eq!(
            RedisCooldown::key(NotificationType::Reengage, user_id),
            "cooldown:reengage:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_ttl_seconds() {
        assert_eq!(RedisCooldown::ttl_seconds(Duration::days(21)), 1_814_400);
        assert_eq!(RedisCooldown::ttl_seconds(Duration::zero()), 1);
    }
}
