//! Re-engagement policy: win-back emails for users who stopped logging in.
//!
//! A user is a candidate once their latest `login` is at least `inactivity` old. Users
//! who never logged in are never candidates. A candidate with a `reengage` email sent
//! within `cooldown` is skipped.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use courier_common::config::AppConfig;
use courier_common::error::{CourierError, CourierResult};
use courier_common::types::{LOGIN_EVENT, NotificationType};

use crate::activity::ActivityLog;
use crate::cooldown::CooldownGuard;
use crate::ledger::EventLedger;
use crate::pipeline::{SendPipeline, SendRequest};
use crate::recipients::RecipientDirectory;

const DEFAULT_INACTIVITY_DAYS: i64 = 7;
const DEFAULT_COOLDOWN_DAYS: i64 = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReengagementPolicy {
    pub inactivity: Duration,
    pub cooldown: Duration,
}

impl Default for ReengagementPolicy {
    fn default() -> Self {
        Self {
            inactivity: Duration::days(DEFAULT_INACTIVITY_DAYS),
            cooldown: Duration::days(DEFAULT_COOLDOWN_DAYS),
        }
    }
}

impl ReengagementPolicy {
    pub fn from_config(config: &AppConfig) -> CourierResult<Self> {
        if config.reengage_inactivity_days < 1 || config.reengage_cooldown_days < 1 {
            return Err(CourierError::Config(
                "Re-engagement inactivity and cooldown must be at least one day".to_string(),
            ));
        }

        Ok(Self {
            inactivity: Duration::days(config.reengage_inactivity_days),
            cooldown: Duration::days(config.reengage_cooldown_days),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateFailure {
    pub user_id: Uuid,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReengagementSummary {
    pub processed: usize,
    pub sent: usize,
    pub skipped: usize,
    pub errors: Vec<CandidateFailure>,
}

/// What happened to one candidate.
enum Outcome {
    Sent,
    Skipped(&'static str),
}

pub struct ReengagementEngine {
    activity: Arc<dyn ActivityLog>,
    ledger: Arc<dyn EventLedger>,
    recipients: Arc<dyn RecipientDirectory>,
    cooldown_guard: Arc<dyn CooldownGuard>,
    pipeline: Arc<SendPipeline>,
    policy: ReengagementPolicy,
}

impl ReengagementEngine {
    pub fn new(
        activity: Arc<dyn ActivityLog>,
        ledger: Arc<dyn EventLedger>,
        recipients: Arc<dyn RecipientDirectory>,
        cooldown_guard: Arc<dyn CooldownGuard>,
        pipeline: Arc<SendPipeline>,
        policy: ReengagementPolicy,
    ) -> Self {
        Self {
            activity,
            ledger,
            recipients,
            cooldown_guard,
            pipeline,
            policy,
        }
    }

    pub fn policy(&self) -> ReengagementPolicy {
        self.policy
    }

    /// Users whose last login is at least the inactivity threshold old.
    pub async fn select_candidates(&self) -> CourierResult<Vec<Uuid>> {
        let cutoff = Utc::now() - self.policy.inactivity;
        let inactive = self.activity.last_seen_before(LOGIN_EVENT, cutoff).await?;
        Ok(inactive.into_iter().map(|(user_id, _)| user_id).collect())
    }

    /// Evaluate and message every candidate. Only candidate selection can fail the run.
    pub async fn run(&self) -> CourierResult<ReengagementSummary> {
        let candidates = self.select_candidates().await?;
        let mut summary = ReengagementSummary::default();

        tracing::info!(candidates = candidates.len(), "Re-engagement run started");

        for user_id in candidates {
            summary.processed += 1;
            match self.process_candidate(user_id).await {
                Ok(Outcome::Sent) => summary.sent += 1,
                Ok(Outcome::Skipped(reason)) => {
                    tracing::debug!(user_id = %user_id, reason, "Re-engagement skipped");
                    summary.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Re-engagement failed");
                    summary.errors.push(CandidateFailure {
                        user_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            processed = summary.processed,
            sent = summary.sent,
            skipped = summary.skipped,
            errors = summary.errors.len(),
            "Re-engagement run finished"
        );

        Ok(summary)
    }

    async fn process_candidate(&self, user_id: Uuid) -> CourierResult<Outcome> {
        let now = Utc::now();

        if let Some(last_sent) = self
            .ledger
            .last_sent_at(user_id, NotificationType::Reengage)
            .await?
            && now - last_sent < self.policy.cooldown
        {
            return Ok(Outcome::Skipped("cooldown"));
        }

        let Some(recipient) = self.recipients.find(user_id).await? else {
            return Ok(Outcome::Skipped("not addressable"));
        };

        if !self
            .cooldown_guard
            .try_claim(NotificationType::Reengage, user_id, self.policy.cooldown)
            .await?
        {
            return Ok(Outcome::Skipped("claimed by concurrent run"));
        }

        let result = self
            .pipeline
            .send(SendRequest {
                user_id,
                recipient_address: recipient.email,
                notification_type: NotificationType::Reengage,
                content: None,
                payload: serde_json::json!({ "first_name": recipient.first_name }),
            })
            .await;

        if let Err(e) = result {
            if let Err(clear_err) = self
                .cooldown_guard
                .clear(NotificationType::Reengage, user_id)
                .await
            {
                tracing::error!(user_id = %user_id, error = %clear_err, "Failed to clear cooldown claim");
            }
            return Err(e);
        }

        Ok(Outcome::Sent)
    }
}
