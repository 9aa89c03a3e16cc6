//! Wiring for the full set of notification components.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use courier_common::config::AppConfig;
use courier_notifier::{BuiltinTemplates, ResendConfig, ResendTransport, TemplateResolver, Transport};

use crate::activity::{ActivityLog, PgActivityLog};
use crate::bulk::BulkDispatcher;
use crate::cooldown::{CooldownGuard, RedisCooldown};
use crate::ledger::{EventLedger, PgLedger};
use crate::pipeline::SendPipeline;
use crate::recipients::{PgRecipients, RecipientDirectory};
use crate::reengage::{ReengagementEngine, ReengagementPolicy};
use crate::scheduler::{PgScheduleStore, ScheduleStore, Scheduler};

/// Backing stores the components run against.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn EventLedger>,
    pub schedules: Arc<dyn ScheduleStore>,
    pub activity: Arc<dyn ActivityLog>,
    pub recipients: Arc<dyn RecipientDirectory>,
    pub cooldown: Arc<dyn CooldownGuard>,
}

/// Every component, sharing one ledger and one transport.
#[derive(Clone)]
pub struct NotificationServices {
    pub stores: Stores,
    pub pipeline: Arc<SendPipeline>,
    pub scheduler: Arc<Scheduler>,
    pub reengagement: Arc<ReengagementEngine>,
    pub bulk: Arc<BulkDispatcher>,
}

impl NotificationServices {
    pub fn new(
        stores: Stores,
        templates: Arc<dyn TemplateResolver>,
        transport: Arc<dyn Transport>,
        bulk: BulkDispatcher,
        policy: ReengagementPolicy,
    ) -> Self {
        let pipeline = Arc::new(SendPipeline::new(
            stores.ledger.clone(),
            templates,
            transport,
        ));
        let scheduler = Arc::new(Scheduler::new(
            stores.schedules.clone(),
            stores.recipients.clone(),
            pipeline.clone(),
        ));
        let reengagement = Arc::new(ReengagementEngine::new(
            stores.activity.clone(),
            stores.ledger.clone(),
            stores.recipients.clone(),
            stores.cooldown.clone(),
            pipeline.clone(),
            policy,
        ));

        Self {
            stores,
            pipeline,
            scheduler,
            reengagement,
            bulk: Arc::new(bulk),
        }
    }

    /// Production wiring: Postgres stores, Redis cooldown claims, Resend transport.
    pub fn postgres(
        pool: PgPool,
        redis: ConnectionManager,
        config: &AppConfig,
    ) -> anyhow::Result<Self> {
        let stores = Stores {
            ledger: Arc::new(PgLedger::new(pool.clone())),
            schedules: Arc::new(PgScheduleStore::new(pool.clone())),
            activity: Arc::new(PgActivityLog::new(pool.clone())),
            recipients: Arc::new(PgRecipients::new(pool)),
            cooldown: Arc::new(RedisCooldown::new(redis)),
        };

        let transport: Arc<dyn Transport> =
            Arc::new(ResendTransport::new(ResendConfig::from_app_config(config))?);
        let templates = Arc::new(BuiltinTemplates::new(config.app_base_url.clone())?);
        let policy = ReengagementPolicy::from_config(config)?;

        Ok(Self::new(
            stores,
            templates,
            transport.clone(),
            BulkDispatcher::new(transport),
            policy,
        ))
    }
}
