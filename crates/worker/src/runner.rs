use std::time::Duration;

use tokio::time::MissedTickBehavior;

use courier_common::config::AppConfig;
use courier_engine::reengage::ReengagementSummary;
use courier_engine::scheduler::ProcessSummary;
use courier_engine::services::NotificationServices;

/// Drives the scheduler poll and the re-engagement run on fixed intervals.
///
/// The two loops run side by side so a long re-engagement run never delays the
/// scheduler. A failed cycle is logged and the next tick tries again.
pub struct PeriodicRunner {
    services: NotificationServices,
    poll_interval: Duration,
    reengage_interval: Duration,
}

impl PeriodicRunner {
    pub fn new(
        services: NotificationServices,
        poll_interval: Duration,
        reengage_interval: Duration,
    ) -> anyhow::Result<Self> {
        if poll_interval.is_zero() || reengage_interval.is_zero() {
            anyhow::bail!("Worker intervals must be greater than zero");
        }

        Ok(Self {
            services,
            poll_interval,
            reengage_interval,
        })
    }

    pub fn from_config(services: NotificationServices, config: &AppConfig) -> anyhow::Result<Self> {
        Self::new(
            services,
            Duration::from_millis(config.scheduler_poll_interval_ms),
            Duration::from_secs(config.reengage_interval_secs),
        )
    }

    /// Run both loops until the task is cancelled.
    pub async fn run(&self) {
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            reengage_interval_secs = self.reengage_interval.as_secs(),
            "Periodic runner started"
        );

        tokio::join!(self.poll_loop(), self.reengage_loop());
    }

    async fn poll_loop(&self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    async fn reengage_loop(&self) {
        let mut ticker = tokio::time::interval(self.reengage_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.reengage_once().await;
        }
    }

    /// One scheduler poll. `None` when the poll could not start.
    pub async fn poll_once(&self) -> Option<ProcessSummary> {
        match self.services.scheduler.process_due().await {
            Ok(summary) => {
                if summary.processed > 0 || !summary.errors.is_empty() {
                    tracing::info!(
                        processed = summary.processed,
                        errors = summary.errors.len(),
                        "Scheduler poll finished"
                    );
                }
                for failure in &summary.errors {
                    tracing::warn!(schedule_id = %failure.id, error = %failure.message, "Scheduled send failed");
                }
                Some(summary)
            }
            Err(e) => {
                tracing::error!(error = %e, "Scheduler poll failed");
                None
            }
        }
    }

    /// One re-engagement run. `None` when the run could not start.
    pub async fn reengage_once(&self) -> Option<ReengagementSummary> {
        match self.services.reengagement.run().await {
            Ok(summary) => {
                tracing::info!(
                    processed = summary.processed,
                    sent = summary.sent,
                    skipped = summary.skipped,
                    errors = summary.errors.len(),
                    "Re-engagement run finished"
                );
                Some(summary)
            }
            Err(e) => {
                tracing::error!(error = %e, "Re-engagement run failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use courier_common::types::{
        ActivityRecord, LOGIN_EVENT, NotificationType, Recipient, ScheduledNotification,
    };
    use courier_engine::activity::ActivityLog;
    use courier_engine::bulk::BulkDispatcher;
    use courier_engine::memory::{MemoryCooldown, MemoryStore};
    use courier_engine::reengage::ReengagementPolicy;
    use courier_engine::services::Stores;
    use courier_notifier::{
        BuiltinTemplates, DeliveryReceipt, OutboundEmail, Transport, TransportError,
    };

    use super::*;

    #[derive(Default)]
    struct CountingTransport {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn deliver(&self, _email: &OutboundEmail) -> Result<DeliveryReceipt, TransportError> {
            let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(DeliveryReceipt {
                external_id: format!("worker-{}", n),
            })
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn services() -> (Arc<MemoryStore>, Arc<CountingTransport>, NotificationServices) {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(CountingTransport::default());
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
            BulkDispatcher::new(transport.clone()),
            ReengagementPolicy::default(),
        );
        (store, transport, services)
    }

    async fn rider(store: &MemoryStore) -> Recipient {
        let rider = Recipient {
            user_id: Uuid::new_v4(),
            email: "rider@example.com".to_string(),
            first_name: Some("Sam".to_string()),
            last_name: None,
        };
        store.add_recipient(rider.clone()).await;
        rider
    }

    #[test]
    fn test_zero_interval_rejected() {
        let (_, _, services) = services();
        assert!(PeriodicRunner::new(services.clone(), Duration::ZERO, Duration::from_secs(1)).is_err());
        assert!(PeriodicRunner::new(services, Duration::from_secs(1), Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn test_poll_once_delivers_due_rows() {
        let (store, transport, services) = services();
        let rider = rider(&store).await;
        store
            .insert_schedule(ScheduledNotification {
                id: Uuid::new_v4(),
                user_id: rider.user_id,
                notification_type: NotificationType::NurtureFollowup,
                run_after: Utc::now() - chrono::Duration::minutes(1),
                payload: serde_json::json!({}),
                created_at: Utc::now() - chrono::Duration::days(3),
            })
            .await;

        let runner =
            PeriodicRunner::new(services, Duration::from_secs(60), Duration::from_secs(3600)).unwrap();
        let summary = runner.poll_once().await.unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(transport.sent.load(Ordering::SeqCst), 1);
        assert!(store.schedules().await.is_empty());
    }

    #[tokio::test]
    async fn test_reengage_once_reports_summary() {
        let (store, transport, services) = services();
        let rider = rider(&store).await;
        store
            .record(&ActivityRecord {
                user_id: rider.user_id,
                event: LOGIN_EVENT.to_string(),
                metadata: serde_json::json!({}),
                occurred_at: Utc::now() - chrono::Duration::days(30),
            })
            .await
            .unwrap();

        let runner =
            PeriodicRunner::new(services, Duration::from_secs(60), Duration::from_secs(3600)).unwrap();
        let summary = runner.reengage_once().await.unwrap();

        assert_eq!(summary.sent, 1);
        assert_eq!(transport.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_on_first_tick() {
        let (store, transport, services) = services();
        let rider = rider(&store).await;
        store
            .insert_schedule(ScheduledNotification {
                id: Uuid::new_v4(),
                user_id: rider.user_id,
                notification_type: NotificationType::MeetingReminder,
                run_after: Utc::now() - chrono::Duration::seconds(1),
                payload: serde_json::json!({ "location": "Depot" }),
                created_at: Utc::now(),
            })
            .await;

        let runner = Arc::new(
            PeriodicRunner::new(services, Duration::from_secs(60), Duration::from_secs(86_400))
                .unwrap(),
        );
        let handle = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run().await }
        });

        // The first tick of each interval fires immediately.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.sent.load(Ordering::SeqCst), 1);
        assert!(store.schedules().await.is_empty());

        handle.abort();
    }
}
